//! Progress Reporting
//!
//! 파이프라인은 `ProgressSink` 에 0..1 범위의 전체 진행률만 보고합니다.
//! 단계별 비중은 아래 상수로 고정되어 있습니다.

use std::sync::{Arc, Mutex};

use serde::Serialize;

/// 업로드: 압축 단계 비중
pub const COMPRESS_SHARE: f64 = 0.20;
/// 업로드: 파트 전송 단계 비중
pub const UPLOAD_SHARE: f64 = 0.75;
/// 업로드: 인덱스 게시 단계 비중
pub const INDEX_SHARE: f64 = 0.05;

/// 복원: 다운로드 단계 비중
pub const DOWNLOAD_SHARE: f64 = 0.80;
/// 복원: 압축 해제/파싱 단계 비중
pub const PARSE_SHARE: f64 = 0.10;
/// 복원: 병합/커밋 단계 비중
pub const MERGE_SHARE: f64 = 0.10;

/// 동기화/복원 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SyncPhase {
    Idle,
    Compressing,
    Uploading { part: usize, total: usize },
    PublishingIndex,
    ResolvingPointer,
    Downloading { part: usize, total: usize },
    Merging,
    Done,
    Failed,
}

/// 진행률 수신자
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64);

    fn phase(&self, _phase: &SyncPhase) {}
}

/// 한 번의 실행 동안 진행률을 단조 증가로 유지
///
/// 재시도로 파트 전송이 처음부터 다시 시작되어도 보고 값은 내려가지 않습니다.
/// 실패 시 `reset()` 만 0으로 되돌립니다.
pub struct ProgressTracker {
    sink: Arc<dyn ProgressSink>,
    current: Mutex<f64>,
}

impl ProgressTracker {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            current: Mutex::new(0.0),
        }
    }

    pub fn advance(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if fraction > *current {
            *current = fraction;
            self.sink.report(fraction);
        }
    }

    /// 구간 [start, start + share] 안에서의 로컬 진행률
    pub fn advance_within(&self, start: f64, share: f64, local: f64) {
        self.advance(start + share * local.clamp(0.0, 1.0));
    }

    pub fn phase(&self, phase: SyncPhase) {
        self.sink.phase(&phase);
    }

    pub fn reset(&self) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = 0.0;
        self.sink.report(0.0);
        self.sink.phase(&SyncPhase::Failed);
    }
}

/// 마지막 보고 값을 보관하는 수신자 (상태 조회용)
#[derive(Default)]
pub struct StatusProgress {
    inner: Mutex<(f64, Option<SyncPhase>)>,
}

impl StatusProgress {
    pub fn snapshot(&self) -> (f64, SyncPhase) {
        match self.inner.lock() {
            Ok(guard) => (guard.0, guard.1.clone().unwrap_or(SyncPhase::Idle)),
            Err(_) => (0.0, SyncPhase::Idle),
        }
    }
}

impl ProgressSink for StatusProgress {
    fn report(&self, fraction: f64) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.0 = fraction;
        }
    }

    fn phase(&self, phase: &SyncPhase) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.1 = Some(phase.clone());
        }
    }
}
