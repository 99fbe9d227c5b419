//! Blob Host Client
//!
//! 파일 호스팅 API(Telegram Bot API)를 단순 블롭 저장소로 사용합니다.
//! - 쓰기: `POST /bot<token>/sendDocument` (multipart) → `result.document.file_id`
//! - 메타데이터: `GET /bot<token>/getFile?file_id=` → `result.file_path`
//! - 읽기: 직접 다운로드 URL 을 읽기 프록시(`GET <proxy>?quest=<url>`)로 중계
//!
//! 업로드/다운로드 모두 파일당 20MB 제한이 있습니다.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::HostConfig;
use crate::error::VaultError;

/// 호스트의 파일당 전송 한도 (20MB)
pub const HOST_TRANSFER_LIMIT: usize = 20 * 1024 * 1024;

/// 429 응답에 retry_after 가 없을 때의 기본 대기 (초)
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// 업로드 스트림 청크 크기 (진행률 보고 단위)
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// 누적 전송 바이트 콜백
pub type TransferCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// 업로드할 문서
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub mime_type: String,
    pub caption: String,
    pub bytes: Vec<u8>,
}

/// 블롭 저장소 인터페이스
#[async_trait]
pub trait BlobHost: Send + Sync {
    /// 문서를 올리고 불투명 locator(file_id)를 반환
    async fn upload(&self, document: Document, on_progress: TransferCallback) -> Result<String, VaultError>;

    /// locator → 직접 다운로드 URL
    async fn resolve(&self, locator: &str) -> Result<String, VaultError>;

    /// 직접 다운로드 URL 의 바이트를 읽기 프록시를 통해 가져옴
    async fn fetch(&self, direct_url: &str) -> Result<Vec<u8>, VaultError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    document: Option<SentDocument>,
}

#[derive(Debug, Deserialize)]
struct SentDocument {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

/// 호스트 응답 공통 해석 (ok=false / 429 / 비 2xx 처리)
fn interpret<T: for<'de> Deserialize<'de>>(status: u16, body: &str) -> Result<T, VaultError> {
    let parsed: Option<ApiResponse<T>> = serde_json::from_str(body).ok();

    let Some(response) = parsed else {
        if status == 429 {
            return Err(VaultError::RateLimited { retry_after_secs: DEFAULT_RETRY_AFTER_SECS });
        }
        if !(200..300).contains(&status) {
            return Err(VaultError::HostApi {
                status,
                description: body.chars().take(200).collect(),
            });
        }
        return Err(VaultError::Format(format!("unexpected host response: {}", body.chars().take(200).collect::<String>())));
    };

    let code = response.error_code.unwrap_or(status);
    if status == 429 || code == 429 {
        let retry_after_secs = response
            .parameters
            .and_then(|p| p.retry_after)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(VaultError::RateLimited { retry_after_secs });
    }

    if !response.ok || !(200..300).contains(&status) {
        return Err(VaultError::HostApi {
            status: code,
            description: response.description.unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    response
        .result
        .ok_or_else(|| VaultError::Format("host response has no result".to_string()))
}

pub(crate) fn parse_send_response(status: u16, body: &str) -> Result<String, VaultError> {
    let message: SentMessage = interpret(status, body)?;
    message
        .document
        .map(|d| d.file_id)
        .ok_or_else(|| VaultError::Format("sendDocument response has no document".to_string()))
}

pub(crate) fn parse_get_file_response(status: u16, body: &str) -> Result<String, VaultError> {
    let info: FileInfo = interpret(status, body)?;
    info.file_path
        .ok_or_else(|| VaultError::Format("getFile response has no file_path".to_string()))
}

/// 직접 다운로드 URL → 프록시 URL
pub(crate) fn proxied_url(proxy_base: &str, direct_url: &str) -> String {
    let sep = if proxy_base.contains('?') { '&' } else { '?' };
    format!("{}{}quest={}", proxy_base, sep, urlencoding::encode(direct_url))
}

/// Telegram Bot API 기반 블롭 저장소
pub struct TelegramHost {
    http: reqwest::Client,
    config: HostConfig,
}

impl TelegramHost {
    pub fn new(config: HostConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            file_path.trim_start_matches('/')
        )
    }
}

/// 바이트를 청크 스트림으로 감싸 전송량을 보고
fn progress_body(bytes: Vec<u8>, on_progress: TransferCallback) -> reqwest::Body {
    let data = Bytes::from(bytes);
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len())))
        .collect();

    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        on_progress(sent);
        Ok::<Bytes, std::io::Error>(chunk)
    }));
    reqwest::Body::wrap_stream(stream)
}

#[async_trait]
impl BlobHost for TelegramHost {
    async fn upload(&self, document: Document, on_progress: TransferCallback) -> Result<String, VaultError> {
        let total = document.bytes.len() as u64;
        if document.bytes.len() > HOST_TRANSFER_LIMIT {
            warn!(
                "[Host] {} is {} bytes, above the host transfer limit",
                document.file_name, total
            );
        }

        let part = Part::stream_with_length(progress_body(document.bytes, on_progress), total)
            .file_name(document.file_name.clone())
            .mime_str(&document.mime_type)?;
        let form = Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .text("caption", document.caption.clone())
            .part("document", part);

        debug!("[Host] sendDocument {} ({} bytes)", document.file_name, total);

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_send_response(status, &body)
    }

    async fn resolve(&self, locator: &str) -> Result<String, VaultError> {
        let response = self
            .http
            .get(self.method_url("getFile"))
            .query(&[("file_id", locator)])
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        let file_path = parse_get_file_response(status, &body)?;
        Ok(self.file_url(&file_path))
    }

    async fn fetch(&self, direct_url: &str) -> Result<Vec<u8>, VaultError> {
        let url = match &self.config.proxy_url {
            Some(proxy) => proxied_url(proxy, direct_url),
            None => direct_url.to_string(),
        };

        let response = self.http.get(&url).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(VaultError::Proxy { status });
        }

        let bytes = response.bytes().await?;
        debug!("[Host] fetched {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_success_yields_file_id() {
        let body = r#"{"ok":true,"result":{"message_id":7,"document":{"file_id":"BQACAgQAAx","file_unique_id":"u1"}}}"#;
        assert_eq!(parse_send_response(200, body).unwrap(), "BQACAgQAAx");
    }

    #[test]
    fn test_rate_limit_parses_retry_after() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5","parameters":{"retry_after":5}}"#;
        match parse_send_response(429, body) {
            Err(VaultError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 5),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            parse_send_response(429, "Too Many Requests"),
            Err(VaultError::RateLimited { retry_after_secs: DEFAULT_RETRY_AFTER_SECS })
        ));
    }

    #[test]
    fn test_other_failures_are_host_errors() {
        let body = r#"{"ok":false,"error_code":413,"description":"Request Entity Too Large"}"#;
        match parse_send_response(413, body) {
            Err(VaultError::HostApi { status, description }) => {
                assert_eq!(status, 413);
                assert!(description.contains("Too Large"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(parse_send_response(502, "<html>bad gateway</html>"), Err(VaultError::HostApi { status: 502, .. })));
        assert!(matches!(parse_send_response(200, r#"{"ok":true,"result":{}}"#), Err(VaultError::Format(_))));
    }

    #[test]
    fn test_get_file_response() {
        let body = r#"{"ok":true,"result":{"file_id":"x","file_path":"documents/file_12.zip"}}"#;
        assert_eq!(parse_get_file_response(200, body).unwrap(), "documents/file_12.zip");
        let missing = r#"{"ok":false,"error_code":400,"description":"Bad Request: invalid file_id"}"#;
        assert!(matches!(parse_get_file_response(400, missing), Err(VaultError::HostApi { status: 400, .. })));
    }

    #[test]
    fn test_proxied_url_encodes_target() {
        let url = proxied_url("https://proxy.example.com/proxy", "https://api.telegram.org/file/bot1:AB/documents/a b.zip");
        assert_eq!(
            url,
            "https://proxy.example.com/proxy?quest=https%3A%2F%2Fapi.telegram.org%2Ffile%2Fbot1%3AAB%2Fdocuments%2Fa%20b.zip"
        );
        assert!(proxied_url("https://p.example.com/?v=1", "x").ends_with("?v=1&quest=x"));
    }

    #[test]
    fn test_method_and_file_urls() {
        let host = TelegramHost::new(HostConfig {
            api_base: "https://api.telegram.org/".to_string(),
            bot_token: "123:ABC".to_string(),
            chat_id: "-100".to_string(),
            proxy_url: None,
        });
        assert_eq!(host.method_url("getFile"), "https://api.telegram.org/bot123:ABC/getFile");
        assert_eq!(host.file_url("/documents/f.zip"), "https://api.telegram.org/file/bot123:ABC/documents/f.zip");
    }
}
