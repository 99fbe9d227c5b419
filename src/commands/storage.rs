//! Storage Commands (JSON Import/Export)

use std::path::Path;

use serde::Serialize;
use tracing::info;

use super::VaultApp;
use crate::error::{CommandError, CommandResult};
use crate::export::{export_to_file, import_from_file, validate_path, ExportSummary, ImportSummary};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    #[serde(flatten)]
    pub summary: ImportSummary,
    pub backup_path: String,
}

impl VaultApp {
    /// 현재 레슨/파일을 평문 JSON 으로 내보내기
    pub fn export_lessons(&self, path: &Path) -> CommandResult<ExportSummary> {
        export_to_file(&self.content, path).map_err(CommandError::from)
    }

    /// JSON 가져오기 (안전 버전)
    /// - 가져오기 전 현재 DB를 backups/ 아래에 자동 백업
    /// - 이후 id 합집합 병합
    pub async fn import_lessons(&self, path: &Path) -> CommandResult<ImportResult> {
        let in_path = validate_path(path).map_err(CommandError::from)?;

        let ts = chrono::Utc::now().timestamp_millis();
        let backup_path = self
            .config
            .backup_dir()
            .join(format!("backup-before-import-{}.db", ts));
        self.db.backup_to_file(&backup_path).map_err(CommandError::from)?;
        info!("[Import] Backup written to {}", backup_path.display());

        let summary = import_from_file(&self.content, &in_path)
            .await
            .map_err(CommandError::from)?;
        Ok(ImportResult {
            summary,
            backup_path: backup_path.to_string_lossy().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::test_support::test_app;
    use crate::db::{ContentStore, Database, LESSONS_KEY};

    #[tokio::test]
    async fn test_import_backs_up_current_database_first() {
        let t = test_app().await;
        let dir = tempfile::tempdir().unwrap();
        let export_path = dir.path().join("share.json");

        let before = t.app.add_lesson("g3-math-1", "기존").await.unwrap();
        t.app.export_lessons(&export_path).unwrap();
        t.app.add_lesson("g3-math-2", "나중").await.unwrap();

        let result = t.app.import_lessons(&export_path).await.unwrap();
        assert_eq!(result.summary.lessons_merged, 1);
        assert_eq!(t.app.content().lessons().unwrap().len(), 2);

        let backup = Database::new(std::path::Path::new(&result.backup_path)).unwrap();
        let raw = backup.get(LESSONS_KEY).unwrap().unwrap();
        let backed_up: Vec<crate::models::LessonRecord> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(backed_up.len(), 2);
        assert!(backed_up.contains(&before));
    }

    #[tokio::test]
    async fn test_import_missing_file_fails_without_backup() {
        let t = test_app().await;
        let err = t.app.import_lessons(std::path::Path::new("/nonexistent/dir/x.json")).await.unwrap_err();
        assert_eq!(err.code, "INVALID_OPERATION");
        assert!(!t.app.config().backup_dir().exists());
    }
}
