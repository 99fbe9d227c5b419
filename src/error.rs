//! Lesson Vault Error Types
//!
//! 동기화/복원 전역 에러 타입 정의

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Lesson Vault 에러
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Nothing to sync for grade {grade}")]
    NothingToSync { grade: i64 },

    #[error("Rate limited by host (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<VaultError>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Host API error {status}: {description}")]
    HostApi { status: u16, description: String },

    #[error("Read proxy returned status {status}")]
    Proxy { status: u16 },

    #[error("Invalid archive format: {0}")]
    Format(String),

    #[error("Pointer table error: {0}")]
    Pointer(String),

    #[error("Device authorization revoked")]
    AccessRevoked,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl VaultError {
    /// 호스트가 지정한 재시도 대기 시간 (429 응답에만 존재)
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            VaultError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }

    /// 일시적 장애 여부 (복원 단계의 파트 다운로드만 재시도 대상)
    pub fn is_transient(&self) -> bool {
        match self {
            VaultError::Network(_) | VaultError::Proxy { .. } | VaultError::RateLimited { .. } => true,
            VaultError::HostApi { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            VaultError::Config(_) => "CONFIG_ERROR",
            VaultError::NothingToSync { .. } => "NOTHING_TO_SYNC",
            VaultError::RateLimited { .. } => "RATE_LIMITED",
            VaultError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            VaultError::Network(_) => "NETWORK_ERROR",
            VaultError::HostApi { .. } => "HOST_API_ERROR",
            VaultError::Proxy { .. } => "PROXY_ERROR",
            VaultError::Format(_) => "FORMAT_ERROR",
            VaultError::Pointer(_) => "POINTER_ERROR",
            VaultError::AccessRevoked => "ACCESS_REVOKED",
            VaultError::Database(_) => "DB_ERROR",
            VaultError::Io(_) => "IO_ERROR",
            VaultError::Serialization(_) => "SERIALIZATION_ERROR",
            VaultError::Archive(_) => "ARCHIVE_ERROR",
            VaultError::NotFound(_) => "NOT_FOUND",
            VaultError::InvalidOperation(_) => "INVALID_OPERATION",
        }
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(error: reqwest::Error) -> Self {
        VaultError::Network(error.to_string())
    }
}

/// 호출자(UI/CLI)에게 전달되는 직렬화 가능한 에러
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<VaultError> for CommandError {
    fn from(error: VaultError) -> Self {
        let details = match &error {
            VaultError::RetriesExhausted { last, .. } => Some(last.to_string()),
            _ => None,
        };

        CommandError {
            code: error.code().to_string(),
            message: user_message(&error),
            details,
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

fn user_message(error: &VaultError) -> String {
    match error {
        VaultError::NothingToSync { grade } => {
            format!("동기화할 수업이나 파일이 없습니다 (학년 {})", grade)
        }
        VaultError::AccessRevoked => "이 기기의 사용 권한이 해제되었습니다".to_string(),
        other => other.to_string(),
    }
}

/// 명령 결과 타입
pub type CommandResult<T> = Result<T, CommandError>;
