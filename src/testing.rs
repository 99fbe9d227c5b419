//! 테스트용 인메모리 구현들

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::access::{ActivationRecord, AuthorizationStore};
use crate::error::VaultError;
use crate::host::{BlobHost, Document, TransferCallback};
use crate::models::PointerRow;
use crate::pointer::PointerTable;
use crate::progress::{ProgressSink, SyncPhase};

/// 업로드 호출에 주입할 실패
#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    RateLimited(u64),
    HostApi(u16),
    Network,
}

impl FakeFailure {
    fn to_error(self) -> VaultError {
        match self {
            FakeFailure::RateLimited(retry_after_secs) => VaultError::RateLimited { retry_after_secs },
            FakeFailure::HostApi(status) => VaultError::HostApi {
                status,
                description: "scripted failure".to_string(),
            },
            FakeFailure::Network => VaultError::Network("connection reset".to_string()),
        }
    }
}

/// 블롭을 메모리에 보관하는 호스트
#[derive(Default)]
pub struct FakeHost {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    uploaded_names: Mutex<Vec<String>>,
    upload_failures: Mutex<HashMap<usize, FakeFailure>>,
    pending_fetch_failures: Mutex<usize>,
    upload_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeHost {
    /// n번째(1부터) 업로드 호출을 실패시킴
    pub fn fail_upload_call(&self, call: usize, failure: FakeFailure) {
        self.upload_failures.lock().unwrap().insert(call, failure);
    }

    /// 다음 n번의 fetch 를 502 로 실패시킴
    pub fn fail_fetches(&self, count: usize) {
        *self.pending_fetch_failures.lock().unwrap() = count;
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// 성공한 업로드의 파일 이름 (순서대로)
    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploaded_names.lock().unwrap().clone()
    }

    pub fn blob(&self, locator: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(locator).cloned()
    }

    /// 업로드 경로를 거치지 않고 블롭 저장
    pub fn put_blob(&self, bytes: Vec<u8>) -> String {
        let locator = format!("file-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.blobs.lock().unwrap().insert(locator.clone(), bytes);
        locator
    }

    pub fn replace_blob(&self, locator: &str, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(locator.to_string(), bytes);
    }
}

#[async_trait]
impl BlobHost for FakeHost {
    async fn upload(&self, document: Document, on_progress: TransferCallback) -> Result<String, VaultError> {
        let call = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let total = document.bytes.len() as u64;

        // 절반 전송 후 실패하는 상황을 흉내냄
        on_progress(total / 2);
        let failure = self.upload_failures.lock().unwrap().remove(&call);
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }
        on_progress(total);

        self.uploaded_names.lock().unwrap().push(document.file_name);
        Ok(self.put_blob(document.bytes))
    }

    async fn resolve(&self, locator: &str) -> Result<String, VaultError> {
        if !self.blobs.lock().unwrap().contains_key(locator) {
            return Err(VaultError::HostApi {
                status: 400,
                description: "Bad Request: invalid file_id".to_string(),
            });
        }
        Ok(format!("fake://{}", locator))
    }

    async fn fetch(&self, direct_url: &str) -> Result<Vec<u8>, VaultError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut pending = self.pending_fetch_failures.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(VaultError::Proxy { status: 502 });
            }
        }
        let locator = direct_url.trim_start_matches("fake://");
        self.blob(locator).ok_or(VaultError::Proxy { status: 404 })
    }
}

#[derive(Default)]
pub struct MemoryPointerTable {
    rows: Mutex<HashMap<i64, PointerRow>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryPointerTable {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, grade: i64) -> Option<PointerRow> {
        self.rows.lock().unwrap().get(&grade).cloned()
    }
}

#[async_trait]
impl PointerTable for MemoryPointerTable {
    async fn fetch(&self, grade: i64) -> Result<Option<PointerRow>, VaultError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(VaultError::Pointer("select returned 503".to_string()));
        }
        Ok(self.get(grade))
    }

    async fn upsert(&self, row: &PointerRow) -> Result<(), VaultError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VaultError::Pointer("upsert returned 503".to_string()));
        }
        self.rows.lock().unwrap().insert(row.grade, row.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    values: Mutex<Vec<f64>>,
    phases: Mutex<Vec<SyncPhase>>,
}

impl RecordingProgress {
    pub fn values(&self) -> Vec<f64> {
        self.values.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<SyncPhase> {
        self.phases.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, fraction: f64) {
        self.values.lock().unwrap().push(fraction);
    }

    fn phase(&self, phase: &SyncPhase) {
        self.phases.lock().unwrap().push(phase.clone());
    }
}

/// 활성화 키 원격 저장소
#[derive(Default)]
pub struct FakeAuthorizations {
    records: Mutex<HashMap<String, ActivationRecord>>,
    unreachable: AtomicBool,
    lookups: AtomicUsize,
}

impl FakeAuthorizations {
    pub fn insert(&self, activation_key: &str, device_fingerprint: Option<&str>, active: bool) {
        self.records.lock().unwrap().insert(
            activation_key.to_string(),
            ActivationRecord {
                activation_key: activation_key.to_string(),
                device_fingerprint: device_fingerprint.map(str::to_string),
                active,
            },
        );
    }

    pub fn deactivate(&self, activation_key: &str) {
        if let Some(record) = self.records.lock().unwrap().get_mut(activation_key) {
            record.active = false;
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn record(&self, activation_key: &str) -> Option<ActivationRecord> {
        self.records.lock().unwrap().get(activation_key).cloned()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationStore for FakeAuthorizations {
    async fn lookup(&self, activation_key: &str) -> Result<Option<ActivationRecord>, VaultError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(VaultError::Network("authorization store unreachable".to_string()));
        }
        Ok(self.record(activation_key))
    }

    async fn bind(&self, activation_key: &str, device_fingerprint: &str) -> Result<(), VaultError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(VaultError::Network("authorization store unreachable".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(activation_key)
            .ok_or_else(|| VaultError::NotFound(format!("activation {}", activation_key)))?;
        record.device_fingerprint = Some(device_fingerprint.to_string());
        Ok(())
    }
}
