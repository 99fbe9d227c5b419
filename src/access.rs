//! Access Gate
//!
//! 기기 지문 + 활성화 키 기반 권한 확인. 동기화 코어는 이 게이트를 조회만 합니다.
//!
//! - `is_authorized()`: 로컬 상태만 보는 빠른 확인
//! - `verify()`: 원격 활성화 레코드와 비교. 원격 확인 실패 시 마지막 성공 후
//!   24시간까지는 권한을 유지하고, 그 이후에는 해제합니다.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{PointerConfig, ACCESS_GRACE_WINDOW};
use crate::db::{ContentStore, ACCESS_STATE_KEY};
use crate::error::VaultError;

/// 원격 확인 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    #[serde(rename = "ok")]
    Verified,
    Revoked,
    Unverifiable,
}

#[async_trait]
pub trait AccessGate: Send + Sync {
    fn is_authorized(&self) -> bool;

    async fn verify(&self) -> Verification;
}

/// 로컬에 저장되는 권한 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGateState {
    pub activated: bool,
    pub device_fingerprint: Option<String>,
    pub activation_key: Option<String>,
    /// 마지막 원격 확인 성공 시각 (ms)
    pub last_verified_at: Option<i64>,
}

/// 원격 활성화 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub activation_key: String,
    pub device_fingerprint: Option<String>,
    pub active: bool,
}

#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    async fn lookup(&self, activation_key: &str) -> Result<Option<ActivationRecord>, VaultError>;

    /// 아직 기기가 지정되지 않은 키에 현재 기기를 등록
    async fn bind(&self, activation_key: &str, device_fingerprint: &str) -> Result<(), VaultError>;
}

/// PostgREST 활성화 테이블
pub struct PostgrestAuthorizations {
    http: reqwest::Client,
    config: PointerConfig,
}

impl PostgrestAuthorizations {
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
            self.config.activations_table
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
    }
}

#[async_trait]
impl AuthorizationStore for PostgrestAuthorizations {
    async fn lookup(&self, activation_key: &str) -> Result<Option<ActivationRecord>, VaultError> {
        let key_filter = format!("eq.{}", activation_key);
        let response = self
            .authorized(self.http.get(self.table_url()))
            .query(&[("activation_key", key_filter.as_str()), ("select", "*"), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::HostApi {
                status: status.as_u16(),
                description: "activation lookup failed".to_string(),
            });
        }
        let rows: Vec<ActivationRecord> = response
            .json()
            .await
            .map_err(|e| VaultError::Format(format!("invalid activation rows: {}", e)))?;
        Ok(rows.into_iter().next())
    }

    async fn bind(&self, activation_key: &str, device_fingerprint: &str) -> Result<(), VaultError> {
        let key_filter = format!("eq.{}", activation_key);
        let response = self
            .authorized(self.http.patch(self.table_url()))
            .query(&[("activation_key", key_filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "device_fingerprint": device_fingerprint }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::HostApi {
                status: status.as_u16(),
                description: "activation bind failed".to_string(),
            });
        }
        Ok(())
    }
}

/// 현재 기기 지문 (호스트 이름/사용자/OS/아키텍처의 SHA-256)
pub fn device_fingerprint() -> String {
    let env = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| std::env::var(k).ok())
            .unwrap_or_default()
    };
    let host = env(&["HOSTNAME", "COMPUTERNAME"]);
    let user = env(&["USER", "USERNAME"]);
    fingerprint_of(&[
        host.as_str(),
        user.as_str(),
        std::env::consts::OS,
        std::env::consts::ARCH,
    ])
}

fn fingerprint_of(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// 로컬 저장소에 상태를 보관하는 게이트
pub struct DeviceAccessGate {
    store: Arc<dyn ContentStore>,
    remote: Arc<dyn AuthorizationStore>,
    fingerprint: String,
    state: Mutex<AccessGateState>,
}

impl DeviceAccessGate {
    pub fn new(
        store: Arc<dyn ContentStore>,
        remote: Arc<dyn AuthorizationStore>,
        fingerprint: String,
    ) -> Result<Self, VaultError> {
        let state = match store.get(ACCESS_STATE_KEY)? {
            Some(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!("[Access] Stored state is unreadable, starting deactivated: {}", e);
                AccessGateState::default()
            }),
            None => AccessGateState::default(),
        };

        Ok(Self {
            store,
            remote,
            fingerprint,
            state: Mutex::new(state),
        })
    }

    pub fn state(&self) -> AccessGateState {
        self.update(|state| state.clone())
    }

    fn update<R>(&self, f: impl FnOnce(&mut AccessGateState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn persist(&self, state: &AccessGateState) -> Result<(), VaultError> {
        self.store.put(ACCESS_STATE_KEY, &serde_json::to_vec(state)?)
    }

    fn commit(&self, f: impl FnOnce(&mut AccessGateState)) {
        let snapshot = self.update(|state| {
            f(state);
            state.clone()
        });
        if let Err(e) = self.persist(&snapshot) {
            warn!("[Access] Failed to persist state: {}", e);
        }
    }

    fn within_grace(&self, last_verified_at: Option<i64>, now_ms: i64) -> bool {
        last_verified_at.is_some_and(|at| now_ms.saturating_sub(at) <= ACCESS_GRACE_WINDOW.as_millis() as i64)
    }

    fn revoke_locally(&self, reason: &str) {
        warn!("[Access] Authorization revoked: {}", reason);
        self.commit(|state| {
            state.activated = false;
        });
    }

    /// 활성화 키 등록
    ///
    /// 원격 레코드가 활성 상태이고, 다른 기기에 묶여 있지 않아야 합니다.
    pub async fn activate(&self, activation_key: &str) -> Result<AccessGateState, VaultError> {
        let key = activation_key.trim();
        let record = self
            .remote
            .lookup(key)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("activation key {}", key)))?;

        if !record.active {
            return Err(VaultError::AccessRevoked);
        }
        match record.device_fingerprint.as_deref() {
            Some(bound) if bound != self.fingerprint => return Err(VaultError::AccessRevoked),
            Some(_) => {}
            None => self.remote.bind(key, &self.fingerprint).await?,
        }

        let state = AccessGateState {
            activated: true,
            device_fingerprint: Some(self.fingerprint.clone()),
            activation_key: Some(key.to_string()),
            last_verified_at: Some(chrono::Utc::now().timestamp_millis()),
        };
        self.persist(&state)?;
        self.update(|current| *current = state.clone());
        info!("[Access] Device activated");
        Ok(state)
    }
}

#[async_trait]
impl AccessGate for DeviceAccessGate {
    fn is_authorized(&self) -> bool {
        let now = chrono::Utc::now().timestamp_millis();
        let state = self.state();
        state.activated
            && state.device_fingerprint.as_deref() == Some(self.fingerprint.as_str())
            && self.within_grace(state.last_verified_at, now)
    }

    async fn verify(&self) -> Verification {
        let state = self.state();
        let Some(key) = state.activation_key.filter(|_| state.activated) else {
            return Verification::Revoked;
        };

        match self.remote.lookup(&key).await {
            Ok(Some(record))
                if record.active && record.device_fingerprint.as_deref() == Some(self.fingerprint.as_str()) =>
            {
                let now = chrono::Utc::now().timestamp_millis();
                self.commit(|state| state.last_verified_at = Some(now));
                debug!("[Access] Verified");
                Verification::Verified
            }
            Ok(Some(record)) if !record.active => {
                self.revoke_locally("activation deactivated");
                Verification::Revoked
            }
            Ok(Some(_)) => {
                self.revoke_locally("device fingerprint no longer matches");
                Verification::Revoked
            }
            Ok(None) => {
                self.revoke_locally("activation record removed");
                Verification::Revoked
            }
            Err(e) => {
                let now = chrono::Utc::now().timestamp_millis();
                if self.within_grace(state.last_verified_at, now) {
                    warn!("[Access] Remote check failed, keeping authorization: {}", e);
                    Verification::Unverifiable
                } else {
                    self.revoke_locally("grace window elapsed without a successful check");
                    Verification::Revoked
                }
            }
        }
    }
}

/// 고정 주기 백그라운드 확인 (첫 확인은 한 주기 뒤)
pub fn spawn_periodic_verification(gate: Arc<dyn AccessGate>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match gate.verify().await {
                Verification::Verified => debug!("[Access] Periodic check ok"),
                Verification::Unverifiable => warn!("[Access] Periodic check could not reach the server"),
                Verification::Revoked => warn!("[Access] Periodic check: access revoked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::testing::FakeAuthorizations;

    const DEVICE: &str = "device-a";

    fn gate_with(store: Arc<MemoryStore>, remote: Arc<FakeAuthorizations>) -> DeviceAccessGate {
        DeviceAccessGate::new(store, remote, DEVICE.to_string()).unwrap()
    }

    fn seed_state(store: &MemoryStore, last_verified_ago: Duration) {
        let state = AccessGateState {
            activated: true,
            device_fingerprint: Some(DEVICE.to_string()),
            activation_key: Some("KEY-1".to_string()),
            last_verified_at: Some(chrono::Utc::now().timestamp_millis() - last_verified_ago.as_millis() as i64),
        };
        store.put(ACCESS_STATE_KEY, &serde_json::to_vec(&state).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_activate_binds_unclaimed_key_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeAuthorizations::default());
        remote.insert("KEY-1", None, true);

        let gate = gate_with(store.clone(), remote.clone());
        assert!(!gate.is_authorized());
        gate.activate(" KEY-1 ").await.unwrap();
        assert!(gate.is_authorized());
        assert_eq!(remote.record("KEY-1").unwrap().device_fingerprint.as_deref(), Some(DEVICE));

        // 재시작해도 유지
        let reopened = gate_with(store, remote);
        assert!(reopened.is_authorized());
        assert_eq!(reopened.state().activation_key.as_deref(), Some("KEY-1"));
    }

    #[tokio::test]
    async fn test_activate_rejects_other_device_or_inactive_key() {
        let remote = Arc::new(FakeAuthorizations::default());
        remote.insert("TAKEN", Some("device-b"), true);
        remote.insert("OFF", None, false);
        let gate = gate_with(Arc::new(MemoryStore::new()), remote);

        assert!(matches!(gate.activate("TAKEN").await, Err(VaultError::AccessRevoked)));
        assert!(matches!(gate.activate("OFF").await, Err(VaultError::AccessRevoked)));
        assert!(matches!(gate.activate("MISSING").await, Err(VaultError::NotFound(_))));
        assert!(!gate.is_authorized());
    }

    #[tokio::test]
    async fn test_verify_revokes_deactivated_account() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeAuthorizations::default());
        remote.insert("KEY-1", Some(DEVICE), true);
        seed_state(&store, Duration::from_secs(60));
        let gate = gate_with(store.clone(), remote.clone());

        assert_eq!(gate.verify().await, Verification::Verified);
        remote.deactivate("KEY-1");
        assert_eq!(gate.verify().await, Verification::Revoked);
        assert!(!gate.is_authorized());
        assert!(!gate_with(store, remote).state().activated);
    }

    #[tokio::test]
    async fn test_verify_revokes_on_fingerprint_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeAuthorizations::default());
        remote.insert("KEY-1", Some("device-b"), true);
        seed_state(&store, Duration::from_secs(60));

        let gate = gate_with(store, remote);
        assert_eq!(gate.verify().await, Verification::Revoked);
        assert!(!gate.is_authorized());
    }

    #[tokio::test]
    async fn test_unreachable_remote_within_grace_keeps_access() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeAuthorizations::default());
        remote.set_unreachable(true);
        seed_state(&store, Duration::from_secs(60 * 60));

        let gate = gate_with(store, remote);
        assert_eq!(gate.verify().await, Verification::Unverifiable);
        assert!(gate.is_authorized());
    }

    #[tokio::test]
    async fn test_unreachable_remote_after_grace_revokes() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeAuthorizations::default());
        remote.set_unreachable(true);
        seed_state(&store, Duration::from_secs(25 * 60 * 60));

        let gate = gate_with(store, remote);
        assert!(!gate.is_authorized());
        assert_eq!(gate.verify().await, Verification::Revoked);
        assert!(!gate.state().activated);
    }

    #[tokio::test]
    async fn test_verify_without_activation_skips_remote() {
        let remote = Arc::new(FakeAuthorizations::default());
        let gate = gate_with(Arc::new(MemoryStore::new()), remote.clone());
        assert_eq!(gate.verify().await, Verification::Revoked);
        assert_eq!(remote.lookups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_verification_revokes_in_background() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeAuthorizations::default());
        remote.insert("KEY-1", Some(DEVICE), true);
        seed_state(&store, Duration::from_secs(60));
        let gate = Arc::new(gate_with(store, remote.clone()));

        let handle = spawn_periodic_verification(gate.clone(), Duration::from_secs(1800));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(remote.lookups(), 0);
        assert!(gate.is_authorized());

        remote.deactivate("KEY-1");
        tokio::time::sleep(Duration::from_secs(1800)).await;
        assert!(remote.lookups() >= 1);
        assert!(!gate.is_authorized());
        handle.abort();
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = fingerprint_of(&["host", "user", "linux", "x86_64"]);
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint_of(&["host", "user", "linux", "x86_64"]));
        assert_ne!(a, fingerprint_of(&["hostu", "ser", "linux", "x86_64"]));
        assert_eq!(device_fingerprint().len(), 64);
    }
}
