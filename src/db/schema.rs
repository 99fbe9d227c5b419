//! Database Schema
//!
//! 로컬 키-값 저장소 테이블 스키마 정의

/// 데이터베이스 스키마 생성 SQL
pub const CREATE_SCHEMA: &str = r#"
-- 키-값 테이블 (lessons, files, 동기화 fallback 슬롯, 접근 권한 상태)
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;
