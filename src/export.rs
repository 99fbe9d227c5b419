//! Export / Import
//!
//! 관리자 간 수동 전달용 평문 JSON 파일. 가져오기는 id 합집합 병합이며 기존 레코드를 지우지 않습니다.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::content::ContentModel;
use crate::error::VaultError;
use crate::models::ExportDocument;

/// 현재 내보내기 형식 버전
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub path: String,
    pub lessons: usize,
    pub files: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub lessons_merged: usize,
    pub files_merged: usize,
}

/// 경로 정규화
///
/// 존재하는 파일은 canonicalize, 새 파일은 부모 디렉토리를 canonicalize 해서 파일명을 붙입니다.
pub fn validate_path(path: &Path) -> Result<PathBuf, VaultError> {
    if path.exists() {
        return Ok(path.canonicalize()?);
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| VaultError::InvalidOperation(format!("Invalid path: {}", path.display())))?;
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) if parent.exists() => Ok(parent.canonicalize()?.join(file_name)),
        Some(_) => Err(VaultError::InvalidOperation("Parent directory does not exist".to_string())),
        None => Ok(PathBuf::from(file_name)),
    }
}

pub fn export_to_file(content: &ContentModel, path: &Path) -> Result<ExportSummary, VaultError> {
    let out_path = validate_path(path)?;
    let state = content.load()?;

    let document = ExportDocument {
        version: EXPORT_VERSION,
        exported_at: chrono::Utc::now().timestamp_millis(),
        lessons: state.lessons,
        files: state.files,
    };
    std::fs::write(&out_path, serde_json::to_vec_pretty(&document)?)?;

    let summary = ExportSummary {
        path: out_path.to_string_lossy().to_string(),
        lessons: document.lessons.len(),
        files: document.files.values().map(Vec::len).sum(),
    };
    info!("[Export] {} lessons, {} files → {}", summary.lessons, summary.files, summary.path);
    Ok(summary)
}

pub async fn import_from_file(content: &ContentModel, path: &Path) -> Result<ImportSummary, VaultError> {
    let in_path = validate_path(path)?;
    let text = std::fs::read_to_string(&in_path)?;
    let document: ExportDocument = serde_json::from_str(&text)
        .map_err(|e| VaultError::Format(format!("invalid export file: {}", e)))?;

    if document.version > EXPORT_VERSION {
        return Err(VaultError::Format(format!(
            "export version {} is newer than supported version {}",
            document.version, EXPORT_VERSION
        )));
    }

    let (lessons_merged, files_merged) = content.merge_union(document.lessons, document.files).await?;
    info!("[Import] merged {} lessons, {} files", lessons_merged, files_merged);
    Ok(ImportSummary {
        lessons_merged,
        files_merged,
    })
}
