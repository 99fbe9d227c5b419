//! Upload Pipeline
//!
//! 학년 하나의 레슨/파일을 파트로 묶어 순차 업로드하고, 인덱스를 게시한 뒤 포인터를 교체합니다.
//!
//! 상태: idle → compressing → uploading(i/N) → publishing-index → done (어디서든 failed)
//!
//! - 파트는 패킹 순서대로 하나씩 업로드 (진행률 단조 증가, 레이트 리밋 예측 가능)
//! - 429 만 재시도, 그 외 오류는 즉시 실패 (큰 블롭을 조용히 다시 올리지 않음)
//! - 포인터 기록까지 성공해야 완료. 실패 시 이미 올린 블롭은 고아로 남음 (보상 삭제 없음)

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::codec::obfuscate;
use crate::config::SyncSettings;
use crate::content::ContentModel;
use crate::curriculum::{Curriculum, EXAM_INDEX_GRADE};
use crate::db::last_index_key;
use crate::error::VaultError;
use crate::host::{BlobHost, Document, TransferCallback};
use crate::models::IndexRecord;
use crate::packer::{compress_batch, pack_units};
use crate::pointer::PointerPublisher;
use crate::progress::{ProgressSink, ProgressTracker, SyncPhase, COMPRESS_SHARE, INDEX_SHARE, UPLOAD_SHARE};
use crate::retry::{with_retry, RetryPolicy};

/// 동기화 결과
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub grade: i64,
    pub part_locators: Vec<String>,
    pub index_locator: String,
    pub total_lessons: usize,
    pub total_files: usize,
}

pub struct SyncPipeline {
    content: Arc<ContentModel>,
    curriculum: Arc<Curriculum>,
    host: Arc<dyn BlobHost>,
    publisher: Arc<PointerPublisher>,
    settings: SyncSettings,
    progress: Arc<dyn ProgressSink>,
}

impl SyncPipeline {
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

    /// 학년 동기화 실행. 실패 시 진행률은 0으로 초기화됩니다.
    pub async fn sync_grade(&self, grade: i64) -> Result<SyncReport, VaultError> {
        let tracker = Arc::new(ProgressTracker::new(self.progress.clone()));
        tracker.phase(SyncPhase::Idle);

        match self.run(grade, &tracker).await {
            Ok(report) => {
                tracker.advance(1.0);
                tracker.phase(SyncPhase::Done);
                Ok(report)
            }
            Err(e) => {
                error!("[Sync] Grade {} failed: {}", grade, e);
                tracker.reset();
                Err(e)
            }
        }
    }

    fn upload_policy(&self) -> RetryPolicy {
        RetryPolicy::RateLimit {
            max_attempts: self.settings.upload_max_attempts,
            buffer: self.settings.rate_limit_buffer,
        }
    }

    async fn run(&self, grade: i64, tracker: &Arc<ProgressTracker>) -> Result<SyncReport, VaultError> {
        if grade == EXAM_INDEX_GRADE {
            return Err(VaultError::InvalidOperation(format!(
                "grade {} is reserved for the exam index",
                grade
            )));
        }

        let units = self.content.units_for_grade(&self.curriculum, grade)?;
        if units.is_empty() {
            return Err(VaultError::NothingToSync { grade });
        }
        let total_lessons: usize = units.iter().map(|u| u.lessons.len()).sum();
        let total_files: usize = units.iter().map(|u| u.file_count()).sum();

        // 1) 압축
        tracker.phase(SyncPhase::Compressing);
        let batches = pack_units(&units, self.settings.pack_ceiling)?;
        drop(units);
        let part_count = batches.len();
        info!(
            "[Sync] Grade {}: {} lessons, {} files → {} parts",
            grade, total_lessons, total_files, part_count
        );

        let mut blobs = Vec::with_capacity(part_count);
        for (i, batch) in batches.into_iter().enumerate() {
            let blob = tokio::task::spawn_blocking(move || compress_batch(&batch))
                .await
                .map_err(|e| VaultError::InvalidOperation(format!("compression task failed: {}", e)))??;
            debug!("[Sync] Part {}/{} compressed to {} bytes", i + 1, part_count, blob.len());
            blobs.push(blob);
            tracker.advance_within(0.0, COMPRESS_SHARE, (i + 1) as f64 / part_count as f64);
        }

        // 2) 파트 업로드 (순차)
        let total_bytes = blobs.iter().map(Vec::len).sum::<usize>().max(1) as f64;
        let policy = self.upload_policy();
        let mut part_locators = Vec::with_capacity(part_count);
        let mut bytes_before = 0usize;

        for (i, blob) in blobs.into_iter().enumerate() {
            tracker.phase(SyncPhase::Uploading { part: i + 1, total: part_count });

            let blob_len = blob.len();
            let on_progress: TransferCallback = {
                let tracker = tracker.clone();
                let before = bytes_before as f64;
                Arc::new(move |sent: u64| {
                    let sent = (sent as f64).min(blob_len as f64);
                    tracker.advance_within(COMPRESS_SHARE, UPLOAD_SHARE, (before + sent) / total_bytes);
                })
            };

            let label = format!("upload part {}/{}", i + 1, part_count);
            let document = Document {
                file_name: format!("grade_{}_part_{}.zip", grade, i + 1),
                mime_type: "application/zip".to_string(),
                caption: format!("grade {} part {}/{}", grade, i + 1, part_count),
                bytes: blob,
            };

            let locator = with_retry(&label, &policy, |_| {
                let host = self.host.clone();
                let document = document.clone();
                let on_progress = on_progress.clone();
                async move { host.upload(document, on_progress).await }
            })
            .await?;

            debug!("[Sync] Part {}/{} stored as {}", i + 1, part_count, locator);
            part_locators.push(locator);
            bytes_before += blob_len;
            tracker.advance_within(COMPRESS_SHARE, UPLOAD_SHARE, bytes_before as f64 / total_bytes);
        }

        // 3) 인덱스 게시 → 포인터 교체
        tracker.phase(SyncPhase::PublishingIndex);
        let index = IndexRecord {
            grade,
            part_locators: part_locators.clone(),
            total_lessons,
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        let index_document = Document {
            file_name: format!("index_grade_{}.json", grade),
            mime_type: "application/json".to_string(),
            caption: format!("grade {} index ({} parts)", grade, part_count),
            bytes: obfuscate(&serde_json::to_string(&index)?).into_bytes(),
        };
        let no_progress: TransferCallback = Arc::new(|_| {});
        let index_locator = with_retry("upload index", &policy, |_| {
            let host = self.host.clone();
            let document = index_document.clone();
            let on_progress = no_progress.clone();
            async move { host.upload(document, on_progress).await }
        })
        .await?;
        tracker.advance(COMPRESS_SHARE + UPLOAD_SHARE + INDEX_SHARE / 2.0);

        self.publisher.publish(grade, &index_locator).await?;

        // 포인터 조회가 안 될 때를 위한 로컬 fallback
        if let Err(e) = self
            .content
            .store()
            .put(&last_index_key(grade), index_locator.as_bytes())
        {
            warn!("[Sync] Failed to cache index locator for grade {}: {}", grade, e);
        }

        info!("[Sync] Grade {} synced: {} parts, index {}", grade, part_count, index_locator);
        Ok(SyncReport {
            grade,
            part_locators,
            index_locator,
            total_lessons,
            total_files,
        })
    }
}
