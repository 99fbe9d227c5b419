//! Configuration
//!
//! 환경 변수(.env.local / .env 포함)에서 설정을 읽습니다.
//! 호스트 자격 증명은 동기화/복원 시점에만 필수입니다 (없으면 Configuration error).

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::VaultError;
use crate::logging::LoggingConfig;

const DEFAULT_HOST_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_POINTER_TABLE: &str = "grade_archives";
const DEFAULT_ACTIVATIONS_TABLE: &str = "activations";

/// 압축 전 파트 크기 상한 기본값 (MB, 호스트 한도 20MB 보다 여유 있게)
const DEFAULT_PACK_CEILING_MB: usize = 18;
/// 429 재시도 최대 횟수
pub const UPLOAD_MAX_ATTEMPTS: u32 = 5;
/// 429 대기 시간에 더하는 여유
pub const RATE_LIMIT_BUFFER: Duration = Duration::from_secs(1);
/// 복원 파트 다운로드 최대 시도 횟수
pub const FETCH_MAX_ATTEMPTS: u32 = 3;
/// 복원 파트 다운로드 재시도 기본 대기
pub const FETCH_BASE_DELAY: Duration = Duration::from_secs(1);
/// 원격 확인 실패 시 권한 유지 기간 (24시간)
pub const ACCESS_GRACE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// 백그라운드 권한 확인 주기 (30분)
pub const VERIFY_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// 블롭 호스트 접속 정보
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
    /// 읽기 프록시 (없으면 직접 다운로드)
    pub proxy_url: Option<String>,
}

/// 포인터 테이블(PostgREST) 접속 정보
#[derive(Debug, Clone)]
pub struct PointerConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    pub activations_table: String,
}

/// 동기화 튜닝 값
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub pack_ceiling: usize,
    pub upload_max_attempts: u32,
    pub rate_limit_buffer: Duration,
    pub fetch_max_attempts: u32,
    pub fetch_base_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pack_ceiling: DEFAULT_PACK_CEILING_MB * 1024 * 1024,
            upload_max_attempts: UPLOAD_MAX_ATTEMPTS,
            rate_limit_buffer: RATE_LIMIT_BUFFER,
            fetch_max_attempts: FETCH_MAX_ATTEMPTS,
            fetch_base_delay: FETCH_BASE_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub host: Option<HostConfig>,
    pub pointer: Option<PointerConfig>,
    pub data_dir: PathBuf,
    pub curriculum_path: PathBuf,
    pub sync: SyncSettings,
    pub logging: LoggingConfig,
}

impl VaultConfig {
    /// `.env.local` → `.env` 순으로 로드한 뒤 환경 변수에서 설정 구성
    pub fn from_env() -> Result<Self, VaultError> {
        load_env_files();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로부터 설정 구성 (빈 값은 미설정으로 취급)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VaultError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = match (get("VAULT_BOT_TOKEN"), get("VAULT_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(HostConfig {
                api_base: get("VAULT_HOST_API_BASE").unwrap_or_else(|| DEFAULT_HOST_API_BASE.to_string()),
                bot_token,
                chat_id,
                proxy_url: get("VAULT_PROXY_URL"),
            }),
            _ => None,
        };

        let pointer = match (get("VAULT_POINTER_URL"), get("VAULT_POINTER_KEY")) {
            (Some(base_url), Some(api_key)) => Some(PointerConfig {
                base_url,
                api_key,
                table: get("VAULT_POINTER_TABLE").unwrap_or_else(|| DEFAULT_POINTER_TABLE.to_string()),
                activations_table: get("VAULT_ACTIVATIONS_TABLE")
                    .unwrap_or_else(|| DEFAULT_ACTIVATIONS_TABLE.to_string()),
            }),
            _ => None,
        };

        if let Some(host) = &host {
            require_http_url("VAULT_HOST_API_BASE", &host.api_base)?;
            if let Some(proxy) = &host.proxy_url {
                require_http_url("VAULT_PROXY_URL", proxy)?;
            }
        }
        if let Some(pointer) = &pointer {
            require_http_url("VAULT_POINTER_URL", &pointer.base_url)?;
        }

        let data_dir = match get("VAULT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };
        let curriculum_path = get("VAULT_CURRICULUM")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("curriculum.json"));

        let mut sync = SyncSettings::default();
        if let Some(raw) = get("VAULT_PACK_CEILING_MB") {
            let mb: usize = raw
                .parse()
                .map_err(|_| VaultError::Config(format!("VAULT_PACK_CEILING_MB is not a number: {}", raw)))?;
            if mb == 0 {
                return Err(VaultError::Config("VAULT_PACK_CEILING_MB must be positive".to_string()));
            }
            sync.pack_ceiling = mb * 1024 * 1024;
        }

        let mut logging = LoggingConfig::default();
        if let Some(level) = get("VAULT_LOG_LEVEL") {
            logging.level = level;
        }
        if let Some(format) = get("VAULT_LOG_FORMAT") {
            logging.json = format.eq_ignore_ascii_case("json");
        }

        Ok(Self {
            host,
            pointer,
            data_dir,
            curriculum_path,
            sync,
            logging,
        })
    }

    pub fn require_host(&self) -> Result<&HostConfig, VaultError> {
        self.host.as_ref().ok_or_else(|| {
            VaultError::Config("Blob host credentials are missing. Set VAULT_BOT_TOKEN and VAULT_CHAT_ID".to_string())
        })
    }

    pub fn require_pointer(&self) -> Result<&PointerConfig, VaultError> {
        self.pointer.as_ref().ok_or_else(|| {
            VaultError::Config("Pointer table is not configured. Set VAULT_POINTER_URL and VAULT_POINTER_KEY".to_string())
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("vault.db")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

fn require_http_url(key: &str, value: &str) -> Result<(), VaultError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| VaultError::Config(format!("{} is not a valid URL ({}): {}", key, e, value)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(VaultError::Config(format!("{} must be http(s), got {}", key, other))),
    }
}

fn default_data_dir() -> Result<PathBuf, VaultError> {
    directories::ProjectDirs::from("ai", "oddeyes", "lesson-vault")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| VaultError::Config("Could not determine platform data directory".to_string()))
}

fn is_valid_env_key(key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// strict 파싱에 실패한 파일에서 읽히는 KEY=VALUE 줄만 반영 (주석/코드펜스/설명 줄은 건너뜀)
fn load_env_lenient(path: &Path) -> Result<usize, dotenvy::Error> {
    let mut loaded = 0usize;
    for item in dotenvy::from_path_iter(path)? {
        let Ok((key, value)) = item else {
            continue;
        };
        if !is_valid_env_key(&key) {
            continue;
        }
        // 이미 비어있지 않은 값이 설정되어 있으면 덮어쓰지 않음
        if std::env::var(&key).is_ok_and(|existing| !existing.trim().is_empty()) {
            continue;
        }
        std::env::set_var(&key, value);
        loaded += 1;
    }
    Ok(loaded)
}

fn load_env_files() {
    for name in [".env.local", ".env"] {
        let path = Path::new(name);
        if !path.exists() {
            continue;
        }
        // strict 파서 우선, 실패하면 lenient 로더로 보강
        if let Err(strict) = dotenvy::from_path(path) {
            match load_env_lenient(path) {
                Ok(loaded) => debug!("[Config] {} parsed leniently ({}): {} keys", name, strict, loaded),
                Err(e) => warn!("[Config] Could not read {}: {}", name, e),
            }
        }
    }
}
