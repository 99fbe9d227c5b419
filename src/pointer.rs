//! Pointer Table
//!
//! 학년 → 최신 인덱스 locator 를 담는 작은 테이블 (`grade` 기본키).
//! 게시 시 같은 학년의 이전 행은 완전히 대체되며 이력은 남기지 않습니다.
//!
//! 동시 게시에 대한 CAS/버전 검사는 없습니다. 마지막으로 게시한 쪽이 이깁니다.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::PointerConfig;
use crate::error::VaultError;
use crate::models::PointerRow;

#[async_trait]
pub trait PointerTable: Send + Sync {
    /// 학년 한 행 조회
    async fn fetch(&self, grade: i64) -> Result<Option<PointerRow>, VaultError>;

    /// grade 충돌 시 대체(upsert)
    async fn upsert(&self, row: &PointerRow) -> Result<(), VaultError>;
}

/// PostgREST(Supabase) 기반 포인터 테이블
pub struct PostgrestPointerTable {
    http: reqwest::Client,
    config: PointerConfig,
}

impl PostgrestPointerTable {
    pub fn new(config: PointerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
    }
}

#[async_trait]
impl PointerTable for PostgrestPointerTable {
    async fn fetch(&self, grade: i64) -> Result<Option<PointerRow>, VaultError> {
        let grade_filter = format!("eq.{}", grade);
        let response = self
            .authorized(self.http.get(self.table_url()))
            .query(&[("grade", grade_filter.as_str()), ("select", "*"), ("limit", "1")])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| VaultError::Pointer(format!("select failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VaultError::Pointer(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(VaultError::Pointer(format!("select returned {}: {}", status, body)));
        }

        let rows: Vec<PointerRow> = serde_json::from_str(&body)
            .map_err(|e| VaultError::Pointer(format!("Failed to parse rows: {} - {}", e, body)))?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, row: &PointerRow) -> Result<(), VaultError> {
        let response = self
            .authorized(self.http.post(self.table_url()))
            .query(&[("on_conflict", "grade")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await
            .map_err(|e| VaultError::Pointer(format!("upsert failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::Pointer(format!("upsert returned {}: {}", status, body)));
        }
        Ok(())
    }
}

/// 인덱스 게시 후 포인터를 교체
pub struct PointerPublisher {
    table: Arc<dyn PointerTable>,
}

impl PointerPublisher {
    pub fn new(table: Arc<dyn PointerTable>) -> Self {
        Self { table }
    }

    pub async fn publish(&self, grade: i64, index_locator: &str) -> Result<PointerRow, VaultError> {
        let row = PointerRow {
            grade,
            telegram_file_id: index_locator.to_string(),
            updated_at: chrono::Utc::now().timestamp_millis(),
        };
        self.table.upsert(&row).await?;
        info!("[Pointer] Grade {} now points at {}", grade, index_locator);
        Ok(row)
    }

    pub async fn resolve(&self, grade: i64) -> Result<Option<String>, VaultError> {
        let row = self.table.fetch(grade).await?;
        debug!("[Pointer] Grade {} resolved: {:?}", grade, row.as_ref().map(|r| &r.telegram_file_id));
        Ok(row.map(|r| r.telegram_file_id))
    }
}
