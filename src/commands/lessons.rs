//! Lesson / Attachment Commands

use std::path::Path;

use serde::Serialize;
use tracing::warn;

use super::VaultApp;
use crate::error::{CommandError, CommandResult, VaultError};
use crate::models::{AttachedFile, FileCategory, LessonRecord};

/// 목록 조회용 레슨 요약
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub lesson: LessonRecord,
    /// 커리큘럼에 없는 챕터면 None
    pub grade: Option<i64>,
    pub file_count: usize,
}

/// 확장자로 MIME 추정
fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

impl VaultApp {
    pub async fn add_lesson(&self, chapter_id: &str, name: &str) -> CommandResult<LessonRecord> {
        if self.curriculum.grade_of(chapter_id).is_none() {
            warn!("[App] Chapter {} is not in the curriculum", chapter_id);
        }
        self.content.add_lesson(chapter_id, name).await.map_err(CommandError::from)
    }

    pub async fn delete_lesson(&self, lesson_id: &str) -> CommandResult<()> {
        self.content.delete_lesson(lesson_id).await.map_err(CommandError::from)
    }

    /// 레슨 목록 (학년 지정 시 해당 학년만)
    pub fn list_lessons(&self, grade: Option<i64>) -> CommandResult<Vec<LessonSummary>> {
        let state = self.content.load().map_err(CommandError::from)?;
        let summaries = state
            .lessons
            .into_iter()
            .map(|lesson| LessonSummary {
                grade: self.curriculum.grade_of(&lesson.chapter_id),
                file_count: state.files.get(&lesson.id).map_or(0, Vec::len),
                lesson,
            })
            .filter(|s| grade.is_none() || s.grade == grade)
            .collect();
        Ok(summaries)
    }

    /// 로컬 파일을 레슨/챕터에 첨부
    pub async fn attach_path(
        &self,
        target_id: &str,
        path: &Path,
        category: Option<FileCategory>,
    ) -> CommandResult<AttachedFile> {
        let bytes = std::fs::read(path).map_err(|e| CommandError::from(VaultError::Io(e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CommandError::from(VaultError::InvalidOperation(format!("Invalid file path: {}", path.display()))))?;

        self.content
            .attach_file(target_id, &name, guess_mime_type(path), &bytes, category)
            .await
            .map_err(CommandError::from)
    }

    pub async fn delete_file(&self, target_id: &str, file_id: &str) -> CommandResult<()> {
        self.content.delete_file(target_id, file_id).await.map_err(CommandError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::test_app;

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type(Path::new("a/Worksheet.PDF")), "application/pdf");
        assert_eq!(guess_mime_type(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(guess_mime_type(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_list_lessons_by_grade_with_file_counts() {
        let t = test_app().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "메모").unwrap();

        let g3 = t.app.add_lesson("g3-math-1", "덧셈").await.unwrap();
        t.app.add_lesson("g4-math-1", "큰 수").await.unwrap();
        t.app.add_lesson("unknown-chapter", "떠돌이").await.unwrap();
        let attached = t.app.attach_path(&g3.id, &file, Some(FileCategory::Summary)).await.unwrap();
        assert_eq!(attached.mime_type, "text/plain");
        assert_eq!(attached.size_bytes, "메모".len() as u64);

        let grade3 = t.app.list_lessons(Some(3)).unwrap();
        assert_eq!(grade3.len(), 1);
        assert_eq!(grade3[0].file_count, 1);
        assert_eq!(t.app.list_lessons(None).unwrap().len(), 3);

        t.app.delete_file(&g3.id, &attached.id).await.unwrap();
        assert_eq!(t.app.list_lessons(Some(3)).unwrap()[0].file_count, 0);
        assert_eq!(t.app.delete_lesson("nope").await.unwrap_err().code, "NOT_FOUND");
    }
}
