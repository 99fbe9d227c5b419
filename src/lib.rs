//! Lesson Vault - 청크 분할 클라우드 동기화/복원 엔진
//!
//! 레슨/첨부 파일을 학년 단위로 묶어 크기 제한이 있는 블롭 호스트에 파트로 올리고,
//! 포인터 테이블을 통해 최신 인덱스를 찾아 다시 복원합니다.

pub mod access;
pub mod cli;
pub mod codec;
pub mod commands;
pub mod config;
pub mod content;
pub mod curriculum;
pub mod db;
pub mod error;
pub mod export;
pub mod host;
pub mod logging;
pub mod models;
pub mod packer;
pub mod pointer;
pub mod progress;
pub mod restore;
pub mod retry;
pub mod upload;

#[cfg(test)]
mod testing;

pub use commands::VaultApp;
pub use error::{CommandError, CommandResult, VaultError};
pub use restore::{RestoreOutcome, RestoreReport};
pub use upload::SyncReport;
