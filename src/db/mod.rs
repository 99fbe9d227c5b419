//! Database Module
//!
//! 로컬 영구 저장소. 파이프라인은 `ContentStore` 트레이트만 알고,
//! 실제 구현(SQLite 파일 또는 메모리)은 주입받습니다.

mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::backup::Backup;
use rusqlite::{Connection, OptionalExtension};

use crate::error::VaultError;

/// 레슨 목록 키
pub const LESSONS_KEY: &str = "lessons";
/// 파일 맵 키
pub const FILES_KEY: &str = "files";
/// 접근 게이트 상태 키
pub const ACCESS_STATE_KEY: &str = "access.state";

/// 학년별 마지막 인덱스 locator 키 (포인터 조회 실패 시 fallback)
pub fn last_index_key(grade: i64) -> String {
    format!("sync.lastIndex.{}", grade)
}

/// 키-값 저장소 인터페이스
pub trait ContentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), VaultError>;

    /// 여러 키를 한 번에 기록 (구현체가 지원하면 원자적으로)
    fn put_many(&self, entries: &[(&str, Vec<u8>)]) -> Result<(), VaultError> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }
}

fn lock_error() -> VaultError {
    VaultError::InvalidOperation("Failed to acquire database lock".to_string())
}

/// SQLite 데이터베이스 래퍼
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// 새 데이터베이스 연결 생성
    pub fn new(path: &Path) -> Result<Self, VaultError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, VaultError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// 데이터베이스 스키마 초기화
    pub fn initialize(&self) -> Result<(), VaultError> {
        let conn = self.conn.lock().map_err(|_| lock_error())?;
        conn.execute_batch(schema::CREATE_SCHEMA)?;
        Ok(())
    }

    /// 현재 DB를 파일로 백업 (가져오기 전 안전장치)
    pub fn backup_to_file(&self, out_path: &Path) -> Result<(), VaultError> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = self.conn.lock().map_err(|_| lock_error())?;
        let mut out_conn = Connection::open(out_path)?;
        out_conn.execute_batch(schema::CREATE_SCHEMA)?;

        let backup = Backup::new(&conn, &mut out_conn)?;
        backup.run_to_completion(5, std::time::Duration::from_millis(10), None)?;
        Ok(())
    }
}

impl ContentStore for Database {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let conn = self.conn.lock().map_err(|_| lock_error())?;
        let value = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), VaultError> {
        self.put_many(&[(key, value.to_vec())])
    }

    fn put_many(&self, entries: &[(&str, Vec<u8>)]) -> Result<(), VaultError> {
        let conn = self.conn.lock().map_err(|_| lock_error())?;
        let tx = conn.unchecked_transaction()?;
        let now = chrono::Utc::now().timestamp_millis();

        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
                (key, value, now),
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

/// 메모리 저장소 (테스트 및 임시 세션용)
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let entries = self.entries.lock().map_err(|_| lock_error())?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), VaultError> {
        let mut entries = self.entries.lock().map_err(|_| lock_error())?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
