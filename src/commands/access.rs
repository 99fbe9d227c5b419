//! Access Commands

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use super::VaultApp;
use crate::access::{spawn_periodic_verification, AccessGate, AccessGateState, Verification};
use crate::config::VERIFY_INTERVAL;
use crate::error::{CommandError, CommandResult};

impl VaultApp {
    /// 활성화 키로 이 기기 등록
    pub async fn activate(&self, activation_key: &str) -> CommandResult<AccessGateState> {
        let remote = self.remote().map_err(CommandError::from)?;
        remote.gate.activate(activation_key).await.map_err(CommandError::from)
    }

    /// 원격 권한 확인 1회 (원격 미설정 시 unverifiable)
    pub async fn verify_access(&self) -> Verification {
        match self.remote() {
            Ok(remote) => remote.gate.verify().await,
            Err(_) => Verification::Unverifiable,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.remote().map(|r| r.gate.is_authorized()).unwrap_or(false)
    }

    /// 백그라운드 권한 확인 시작 (기본 30분 주기)
    pub fn start_access_monitor(&self, interval: Option<Duration>) -> Option<JoinHandle<()>> {
        let remote = self.remote().ok()?;
        let interval = interval.unwrap_or(VERIFY_INTERVAL);
        info!("[Access] Verifying every {}s", interval.as_secs());
        Some(spawn_periodic_verification(remote.gate.clone(), interval))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::access::Verification;
    use crate::commands::test_support::{test_app, DEVICE};

    #[tokio::test]
    async fn test_activation_is_bound_to_device() {
        let t = test_app().await;
        assert!(t.app.is_authorized());
        assert_eq!(
            t.authorizations.record("KEY-1").unwrap().device_fingerprint.as_deref(),
            Some(DEVICE)
        );
        assert_eq!(t.app.verify_access().await, Verification::Verified);

        t.authorizations.insert("KEY-2", Some("someone-else"), true);
        assert_eq!(t.app.activate("KEY-2").await.unwrap_err().code, "ACCESS_REVOKED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_access_monitor_clears_authorization() {
        let t = test_app().await;
        let handle = t.app.start_access_monitor(Some(Duration::from_secs(60))).unwrap();

        t.authorizations.deactivate("KEY-1");
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!t.app.is_authorized());
        handle.abort();
    }
}
