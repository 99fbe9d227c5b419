//! Restore Pipeline
//!
//! 포인터 → 인덱스 → 파트 다운로드 → 압축 해제/파싱 → 병합 → 커밋.
//! 모든 파트의 파싱이 끝나기 전에는 로컬 상태를 건드리지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::codec::deobfuscate;
use crate::config::SyncSettings;
use crate::content::{upsert_lesson, ContentModel};
use crate::curriculum::Curriculum;
use crate::db::last_index_key;
use crate::error::VaultError;
use crate::host::BlobHost;
use crate::models::{FileMap, IndexRecord, LessonRecord, PayloadUnit};
use crate::packer::unpack_archive;
use crate::pointer::PointerPublisher;
use crate::progress::{ProgressSink, ProgressTracker, SyncPhase, DOWNLOAD_SHARE, PARSE_SHARE};
use crate::retry::{with_retry, RetryPolicy};

/// 다운로드 재시도 최대 대기
const FETCH_MAX_DELAY: Duration = Duration::from_secs(10);

/// 인덱스 locator 를 어디서 얻었는지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LocatorSource {
    PointerTable,
    LocalCache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub grade: i64,
    pub index_locator: String,
    pub source: LocatorSource,
    pub part_count: usize,
    pub lessons_restored: usize,
    pub files_restored: usize,
}

/// 복원 결과. 원격에 데이터가 없는 것은 오류가 아닙니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RestoreOutcome {
    Restored(RestoreReport),
    NoData,
}

/// 파싱된 유닛들을 병합
///
/// 레슨은 id 기준 마지막 값이 이기고(첫 등장 위치 유지),
/// 파일 목록은 대상 id 단위로 통째로 교체됩니다.
pub fn merge_units(units: Vec<PayloadUnit>) -> (Vec<LessonRecord>, FileMap) {
    let mut lessons = Vec::new();
    let mut files = FileMap::new();
    for unit in units {
        for lesson in unit.lessons {
            upsert_lesson(&mut lessons, lesson);
        }
        for (target, list) in unit.files {
            files.insert(target, list);
        }
    }
    (lessons, files)
}

pub struct RestorePipeline {
    content: Arc<ContentModel>,
    curriculum: Arc<Curriculum>,
    host: Arc<dyn BlobHost>,
    publisher: Arc<PointerPublisher>,
    settings: SyncSettings,
    progress: Arc<dyn ProgressSink>,
}

impl RestorePipeline {
    pub fn new(
        content: Arc<ContentModel>,
        curriculum: Arc<Curriculum>,
        host: Arc<dyn BlobHost>,
        publisher: Arc<PointerPublisher>,
        settings: SyncSettings,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            content,
            curriculum,
            host,
            publisher,
            settings,
            progress,
        }
    }

    pub async fn restore_grade(&self, grade: i64) -> Result<RestoreOutcome, VaultError> {
        let tracker = ProgressTracker::new(self.progress.clone());
        tracker.phase(SyncPhase::Idle);

        match self.run(grade, &tracker).await {
            Ok(outcome) => {
                tracker.advance(1.0);
                tracker.phase(SyncPhase::Done);
                Ok(outcome)
            }
            Err(e) => {
                error!("[Restore] Grade {} failed: {}", grade, e);
                tracker.reset();
                Err(e)
            }
        }
    }

    fn fetch_policy(&self) -> RetryPolicy {
        RetryPolicy::Transient {
            max_attempts: self.settings.fetch_max_attempts,
            base_delay: self.settings.fetch_base_delay,
            max_delay: FETCH_MAX_DELAY,
        }
    }

    /// 포인터 테이블 → 로컬 캐시 순으로 인덱스 locator 확인
    async fn resolve_index(&self, grade: i64) -> Result<Option<(String, LocatorSource)>, VaultError> {
        match self.publisher.resolve(grade).await {
            Ok(Some(locator)) => return Ok(Some((locator, LocatorSource::PointerTable))),
            Ok(None) => debug!("[Restore] No pointer row for grade {}", grade),
            Err(e) => warn!("[Restore] Pointer lookup failed, trying local cache: {}", e),
        }

        let cached = self.content.store().get(&last_index_key(grade))?;
        Ok(cached
            .and_then(|raw| String::from_utf8(raw).ok())
            .filter(|locator| !locator.is_empty())
            .map(|locator| (locator, LocatorSource::LocalCache)))
    }

    /// locator → 직접 URL → 프록시 다운로드 (일시적 장애 재시도)
    async fn download(&self, label: &str, locator: &str) -> Result<Vec<u8>, VaultError> {
        with_retry(label, &self.fetch_policy(), |_| {
            let host = self.host.clone();
            let locator = locator.to_string();
            async move {
                let direct_url = host.resolve(&locator).await?;
                host.fetch(&direct_url).await
            }
        })
        .await
    }

    async fn run(&self, grade: i64, tracker: &ProgressTracker) -> Result<RestoreOutcome, VaultError> {
        // 1) 포인터 확인
        tracker.phase(SyncPhase::ResolvingPointer);
        let Some((index_locator, source)) = self.resolve_index(grade).await? else {
            info!("[Restore] No data available for grade {}", grade);
            return Ok(RestoreOutcome::NoData);
        };

        let index_raw = self.download("fetch index", &index_locator).await?;
        let index = parse_index(&index_raw)?;
        if index.grade != grade {
            return Err(VaultError::Format(format!(
                "index {} belongs to grade {}, expected {}",
                index_locator, index.grade, grade
            )));
        }
        let part_count = index.part_locators.len();
        info!(
            "[Restore] Grade {}: index {} ({:?}) lists {} parts",
            grade, index_locator, source, part_count
        );

        // 2) 파트 다운로드 (순차, 파트 수 기준 진행률)
        let mut archives = Vec::with_capacity(part_count);
        for (i, locator) in index.part_locators.iter().enumerate() {
            tracker.phase(SyncPhase::Downloading { part: i + 1, total: part_count });
            let label = format!("fetch part {}/{}", i + 1, part_count);
            let bytes = self.download(&label, locator).await?;
            debug!("[Restore] Part {}/{} downloaded ({} bytes)", i + 1, part_count, bytes.len());
            archives.push(bytes);
            tracker.advance_within(0.0, DOWNLOAD_SHARE, (i + 1) as f64 / part_count as f64);
        }
        tracker.advance(DOWNLOAD_SHARE);

        // 3) 압축 해제/파싱. 하나라도 실패하면 커밋하지 않음
        let mut units = Vec::new();
        for (i, archive) in archives.into_iter().enumerate() {
            let parsed = tokio::task::spawn_blocking(move || unpack_archive(&archive))
                .await
                .map_err(|e| VaultError::InvalidOperation(format!("decompression task failed: {}", e)))??;
            units.extend(parsed);
            tracker.advance_within(DOWNLOAD_SHARE, PARSE_SHARE, (i + 1) as f64 / part_count as f64);
        }
        tracker.advance(DOWNLOAD_SHARE + PARSE_SHARE);

        // 4) 병합 → 5) 커밋
        tracker.phase(SyncPhase::Merging);
        let (lessons, files) = merge_units(units);
        let lessons_restored = lessons.len();
        let files_restored = files.values().map(Vec::len).sum();
        self.content
            .replace_grade_scope(&self.curriculum, grade, lessons, files)
            .await?;

        info!(
            "[Restore] Grade {} restored: {} lessons, {} files",
            grade, lessons_restored, files_restored
        );
        Ok(RestoreOutcome::Restored(RestoreReport {
            grade,
            index_locator,
            source,
            part_count,
            lessons_restored,
            files_restored,
        }))
    }
}

/// 인덱스 문서 해석 (난독화되지 않은 문서도 허용)
fn parse_index(raw: &[u8]) -> Result<IndexRecord, VaultError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| VaultError::Format("index document is not UTF-8".to_string()))?;
    serde_json::from_str(&deobfuscate(text))
        .map_err(|e| VaultError::Format(format!("invalid index document: {}", e)))
}
