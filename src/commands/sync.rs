//! Sync Commands
//!
//! 동기화/복원 실행 전 접근 게이트를 확인합니다.

use serde::Serialize;

use super::VaultApp;
use crate::access::{AccessGate, Verification};
use crate::error::{CommandError, CommandResult, VaultError};
use crate::progress::SyncPhase;
use crate::restore::RestoreOutcome;
use crate::upload::SyncReport;

/// 현재 진행 상태 스냅샷
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub progress: f64,
    pub error: Option<CommandError>,
}

impl VaultApp {
    /// 마지막 확인이 유예 기간을 넘겼으면 원격 확인 후 다시 판단
    async fn ensure_authorized(&self) -> Result<(), VaultError> {
        let gate = &self.remote()?.gate;
        if gate.is_authorized() {
            return Ok(());
        }
        match gate.verify().await {
            Verification::Verified => Ok(()),
            Verification::Revoked | Verification::Unverifiable => Err(VaultError::AccessRevoked),
        }
    }

    async fn run_sync(&self, grade: i64) -> Result<SyncReport, VaultError> {
        self.ensure_authorized().await?;
        self.remote()?.sync.sync_grade(grade).await
    }

    async fn run_restore(&self, grade: i64) -> Result<RestoreOutcome, VaultError> {
        self.ensure_authorized().await?;
        self.remote()?.restore.restore_grade(grade).await
    }

    /// 학년 동기화
    pub async fn sync_grade(&self, grade: i64) -> CommandResult<SyncReport> {
        let result = self.run_sync(grade).await.map_err(CommandError::from);

        self.record_error(result.as_ref().err().cloned());
        result
    }

    /// 학년 복원
    pub async fn restore_grade(&self, grade: i64) -> CommandResult<RestoreOutcome> {
        let result = self.run_restore(grade).await.map_err(CommandError::from);

        self.record_error(result.as_ref().err().cloned());
        result
    }

    pub fn status(&self) -> SyncStatus {
        let (progress, phase) = self.status.snapshot();
        let error = self.last_error.lock().ok().and_then(|guard| guard.clone());
        SyncStatus { phase, progress, error }
    }
}
