//! Retry Helper
//!
//! 업로드(429 전용)와 복원(일시적 장애 전반)이 공유하는 재시도 루프.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::VaultError;

/// 어떤 오류를 재시도할지와 대기 시간 계산 방식
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// 429 만 재시도. 호스트가 지정한 retry_after + buffer 만큼 대기
    RateLimit { max_attempts: u32, buffer: Duration },
    /// 일시적 장애 재시도. base * 2^(n-1) + jitter, 최대 max_delay
    Transient {
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    },
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::RateLimit { max_attempts, .. } | RetryPolicy::Transient { max_attempts, .. } => {
                (*max_attempts).max(1)
            }
        }
    }

    /// 재시도 대상이면 대기 시간, 아니면 None
    fn delay_for(&self, err: &VaultError, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::RateLimit { buffer, .. } => err.retry_after().map(|d| d + *buffer),
            RetryPolicy::Transient { base_delay, max_delay, .. } => {
                if !err.is_transient() {
                    return None;
                }
                if let Some(mandated) = err.retry_after() {
                    return Some(mandated);
                }
                let exp = base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
                let jitter_cap = (base_delay.as_millis() as u64 / 4).max(1);
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..jitter_cap));
                Some((exp + jitter).min(*max_delay))
            }
        }
    }
}

/// `operation` 을 정책에 따라 재시도
///
/// 클로저에는 1부터 시작하는 시도 번호가 전달됩니다.
/// 재시도 대상이 아닌 오류는 즉시 반환되고, 시도를 모두 소진하면 `RetriesExhausted`.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, VaultError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, VaultError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(delay) = policy.delay_for(&err, attempt) else {
            return Err(err);
        };

        if attempt >= max_attempts {
            error!("[Retry] {} failed after {} attempts: {}", label, attempt, err);
            return Err(VaultError::RetriesExhausted {
                operation: label.to_string(),
                attempts: attempt,
                last: Box::new(err),
            });
        }

        warn!(
            "[Retry] {} attempt {}/{} failed: {}. Retrying in {}ms...",
            label,
            attempt,
            max_attempts,
            err,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
