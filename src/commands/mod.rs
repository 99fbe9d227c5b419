//! Application Commands
//!
//! UI/CLI 에서 호출하는 명령 모음. 모든 명령은 `CommandResult<T>` 를 반환합니다.

pub mod access;
pub mod lessons;
pub mod storage;
pub mod sync;

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::access::{device_fingerprint, AuthorizationStore, DeviceAccessGate, PostgrestAuthorizations};
use crate::config::VaultConfig;
use crate::content::ContentModel;
use crate::curriculum::Curriculum;
use crate::db::Database;
use crate::error::{CommandError, VaultError};
use crate::host::{BlobHost, TelegramHost};
use crate::pointer::{PointerPublisher, PointerTable, PostgrestPointerTable};
use crate::progress::StatusProgress;
use crate::restore::RestorePipeline;
use crate::upload::SyncPipeline;

/// 원격 협력자 묶음
pub struct Services {
    pub host: Arc<dyn BlobHost>,
    pub pointer_table: Arc<dyn PointerTable>,
    pub authorizations: Arc<dyn AuthorizationStore>,
}

struct Remote {
    sync: SyncPipeline,
    restore: RestorePipeline,
    gate: Arc<DeviceAccessGate>,
}

/// 앱 상태 (Tauri 의 managed state 에 해당)
pub struct VaultApp {
    config: VaultConfig,
    db: Arc<Database>,
    content: Arc<ContentModel>,
    curriculum: Arc<Curriculum>,
    status: Arc<StatusProgress>,
    last_error: Mutex<Option<CommandError>>,
    remote: Option<Remote>,
}

impl VaultApp {
    /// 설정으로부터 DB/커리큘럼/원격 클라이언트를 구성
    pub fn open(config: VaultConfig) -> Result<Self, VaultError> {
        let db = Arc::new(Database::new(&config.database_path())?);
        db.initialize()?;
        let curriculum = load_curriculum(&config.curriculum_path)?;

        let services = match (&config.host, &config.pointer) {
            (Some(host), Some(pointer)) => Some(Services {
                host: Arc::new(TelegramHost::new(host.clone())),
                pointer_table: Arc::new(PostgrestPointerTable::new(pointer.clone())),
                authorizations: Arc::new(PostgrestAuthorizations::new(pointer.clone())),
            }),
            _ => None,
        };

        Self::assemble(config, db, curriculum, services, device_fingerprint())
    }

    pub fn assemble(
        config: VaultConfig,
        db: Arc<Database>,
        curriculum: Curriculum,
        services: Option<Services>,
        fingerprint: String,
    ) -> Result<Self, VaultError> {
        let content = Arc::new(ContentModel::new(db.clone()));
        let curriculum = Arc::new(curriculum);
        let status = Arc::new(StatusProgress::default());

        let remote = match services {
            Some(services) => {
                let publisher = Arc::new(PointerPublisher::new(services.pointer_table));
                let gate = Arc::new(DeviceAccessGate::new(db.clone(), services.authorizations, fingerprint)?);
                Some(Remote {
                    sync: SyncPipeline::new(
                        content.clone(),
                        curriculum.clone(),
                        services.host.clone(),
                        publisher.clone(),
                        config.sync.clone(),
                        status.clone(),
                    ),
                    restore: RestorePipeline::new(
                        content.clone(),
                        curriculum.clone(),
                        services.host,
                        publisher,
                        config.sync.clone(),
                        status.clone(),
                    ),
                    gate,
                })
            }
            None => {
                info!("[App] Remote services not configured; sync and restore are unavailable");
                None
            }
        };

        Ok(Self {
            config,
            db,
            content,
            curriculum,
            status,
            last_error: Mutex::new(None),
            remote,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn content(&self) -> &Arc<ContentModel> {
        &self.content
    }

    pub fn curriculum(&self) -> &Curriculum {
        &self.curriculum
    }

    fn remote(&self) -> Result<&Remote, VaultError> {
        match &self.remote {
            Some(remote) => Ok(remote),
            None => {
                self.config.require_host()?;
                self.config.require_pointer()?;
                Err(VaultError::Config("Remote services are not available".to_string()))
            }
        }
    }

    fn record_error(&self, error: Option<CommandError>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = error;
        }
    }
}

/// 커리큘럼 파일 로드 (없으면 빈 커리큘럼)
fn load_curriculum(path: &Path) -> Result<Curriculum, VaultError> {
    if !path.exists() {
        warn!("[App] Curriculum file not found at {}; no grade has chapters", path.display());
        return Ok(Curriculum::default());
    }
    Curriculum::load(path)
}
