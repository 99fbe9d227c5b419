//! CLI
//!
//! 데스크톱 셸 대신 사용하는 명령줄 인터페이스. 결과는 JSON 으로 출력합니다.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::commands::VaultApp;
use crate::error::{CommandError, VaultError};
use crate::models::FileCategory;

/// Lesson Vault - 레슨 자료 클라우드 동기화/복원
#[derive(Parser, Debug)]
#[command(name = "lesson-vault")]
#[command(about = "Chunked cloud sync and restore for lesson materials")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (overrides VAULT_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Curriculum file (overrides VAULT_CURRICULUM)
    #[arg(long)]
    pub curriculum: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload one grade's lessons and files, then publish its pointer
    Sync { grade: i64 },
    /// Download the latest archive for a grade and merge it locally
    Restore { grade: i64 },
    /// Export all lessons and files to a plaintext JSON file
    Export { path: PathBuf },
    /// Merge a JSON export into local state (backs up the database first)
    Import { path: PathBuf },
    /// Register this device with an activation key
    Activate { key: String },
    /// Check authorization against the remote activation record
    Verify,
    /// Show the last sync/restore phase, progress and error
    Status,
    /// List lessons, optionally for one grade
    Lessons {
        #[arg(long)]
        grade: Option<i64>,
    },
    /// Create a lesson under a chapter
    AddLesson { chapter_id: String, name: String },
    /// Delete a lesson and its attached files
    DeleteLesson { lesson_id: String },
    /// Attach a local file to a lesson or chapter
    Attach {
        target_id: String,
        path: PathBuf,
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CategoryArg {
    Summary,
    Exercise,
    Exam,
    Video,
    Other,
}

impl From<CategoryArg> for FileCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Summary => FileCategory::Summary,
            CategoryArg::Exercise => FileCategory::Exercise,
            CategoryArg::Exam => FileCategory::Exam,
            CategoryArg::Video => FileCategory::Video,
            CategoryArg::Other => FileCategory::Other,
        }
    }
}

fn render<T: Serialize>(value: &T) -> Result<String, CommandError> {
    serde_json::to_string_pretty(value).map_err(|e| CommandError::from(VaultError::Serialization(e)))
}

/// 명령 실행 후 출력 문자열 반환
pub async fn execute(app: &VaultApp, command: &Commands) -> Result<String, CommandError> {
    match command {
        Commands::Sync { grade } => render(&app.sync_grade(*grade).await?),
        Commands::Restore { grade } => render(&app.restore_grade(*grade).await?),
        Commands::Export { path } => render(&app.export_lessons(path)?),
        Commands::Import { path } => render(&app.import_lessons(path).await?),
        Commands::Activate { key } => render(&app.activate(key).await?),
        Commands::Verify => render(&app.verify_access().await),
        Commands::Status => render(&app.status()),
        Commands::Lessons { grade } => render(&app.list_lessons(*grade)?),
        Commands::AddLesson { chapter_id, name } => render(&app.add_lesson(chapter_id, name).await?),
        Commands::DeleteLesson { lesson_id } => {
            app.delete_lesson(lesson_id).await?;
            Ok(format!("deleted {}", lesson_id))
        }
        Commands::Attach { target_id, path, category } => {
            let file = app
                .attach_path(target_id, path, category.map(FileCategory::from))
                .await?;
            Ok(format!("attached {} ({} bytes) as {}", file.name, file.size_bytes, file.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::test_app;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::parse_from(["lesson-vault", "--data-dir", "/tmp/v", "sync", "3"]);
        assert!(matches!(cli.command, Commands::Sync { grade: 3 }));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/v")));

        let cli = Cli::parse_from(["lesson-vault", "attach", "l1", "a.pdf", "--category", "exam"]);
        assert!(matches!(
            cli.command,
            Commands::Attach { category: Some(CategoryArg::Exam), .. }
        ));
        assert!(Cli::try_parse_from(["lesson-vault", "sync", "three"]).is_err());
    }

    #[tokio::test]
    async fn test_execute_renders_json() {
        let t = test_app().await;
        let out = execute(
            &t.app,
            &Commands::AddLesson {
                chapter_id: "g3-math-1".to_string(),
                name: "분수".to_string(),
            },
        )
        .await
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["chapterId"], "g3-math-1");

        let status: serde_json::Value =
            serde_json::from_str(&execute(&t.app, &Commands::Status).await.unwrap()).unwrap();
        assert_eq!(status["phase"]["state"], "idle");

        let err = execute(&t.app, &Commands::Sync { grade: 4 }).await.unwrap_err();
        assert_eq!(err.code, "NOTHING_TO_SYNC");
    }
}
