//! Lesson Vault Data Models
//!
//! 프론트엔드 TypeScript 타입과 매핑되는 Rust 데이터 모델.
//! 동기화 아카이브/내보내기 파일의 JSON 형식도 이 구조체들이 결정합니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 대상 ID(lesson 또는 chapter) → 첨부 파일 목록 (삽입 순서 = 표시 순서)
pub type FileMap = BTreeMap<String, Vec<AttachedFile>>;

/// 수업(레슨) 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonRecord {
    pub id: String,
    #[serde(rename = "chapterId")]
    pub chapter_id: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// 첨부 파일 (내용은 data URL 문자열)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FileCategory>,
}

/// 첨부 파일 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Summary,
    Exercise,
    Exam,
    Video,
    #[serde(other)]
    Other,
}

/// 동기화 시점에만 존재하는 묶음 단위
///
/// 레슨 1개당 1개, 그리고 소유 레슨이 없는 챕터 파일 버킷 1개당 1개가 생성됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadUnit {
    #[serde(rename = "chapterId")]
    pub chapter_id: String,
    #[serde(default)]
    pub lessons: Vec<LessonRecord>,
    #[serde(default)]
    pub files: FileMap,
}

impl PayloadUnit {
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// 학년별 최신 아카이브 파트 목록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub grade: i64,
    #[serde(rename = "partLocators")]
    pub part_locators: Vec<String>,
    #[serde(rename = "totalLessons")]
    pub total_lessons: usize,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

/// 포인터 테이블 행 (grade 가 기본키)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerRow {
    pub grade: i64,
    pub telegram_file_id: String,
    pub updated_at: i64,
}

/// 관리자 간 수동 전달용 내보내기 파일 (평문 JSON)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: u32,
    #[serde(rename = "exportedAt")]
    pub exported_at: i64,
    pub lessons: Vec<LessonRecord>,
    pub files: FileMap,
}
