//! Shared fixtures for unit tests

use crate::backend::{object_name, BackendAdapter, BackendError};
use crate::ledger::{LedgerError, MetadataLedger, SqliteLedger};
use crate::models::{
    FailedDelete, LocationPatch, PendingUpload, PhotoCategory, PhotoRecord, RemoteObject,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A gradient JPEG of the given size
pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, 90)
        .encode_image(&img)
        .unwrap();
    buffer
}

/// A record with both locations set and a millisecond-precision timestamp
pub fn record(identity: &str, owner: &str, category: PhotoCategory) -> PhotoRecord {
    PhotoRecord {
        identity: identity.to_string(),
        owner_entity_id: owner.to_string(),
        category,
        capture_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        notes: Some("test".to_string()),
        created_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap()
            + chrono::Duration::milliseconds(125),
        local_path: Some(format!("/data/photos/{}.jpg", identity)),
        remote_url: Some(format!("https://a.example/{}.jpg", identity)),
        remote_backend: Some("a".to_string()),
        remote_delete_token: None,
        uploading_device_id: "device-a".to_string(),
        checksum: "00".repeat(32),
        byte_size: 1024,
    }
}

/// In-memory backend with switchable failures
pub struct StubBackend {
    name: String,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    delay: Option<Duration>,
    uploads: AtomicUsize,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
}

impl StubBackend {
    fn build(name: &str, fail_uploads: bool, delay: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            fail_uploads: AtomicBool::new(fail_uploads),
            fail_deletes: AtomicBool::new(false),
            delay,
            uploads: AtomicUsize::new(0),
            objects: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(name: &str) -> Self {
        Self::build(name, false, None)
    }

    pub fn failing(name: &str) -> Self {
        Self::build(name, true, None)
    }

    /// Succeeds, but only after `delay`
    pub fn slow(name: &str, delay: Duration) -> Self {
        Self::build(name, false, Some(delay))
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_uploads.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_deletes(&self, failing: bool) {
        self.fail_deletes.store(failing, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn deleted_urls(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn stored_urls(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BackendAdapter for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(
        &self,
        bytes: &[u8],
        owner_entity_id: &str,
        category: PhotoCategory,
    ) -> Result<RemoteObject, BackendError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let url = format!(
            "https://{}.example/{}.jpg",
            self.name,
            object_name(owner_entity_id, category)
        );
        self.objects
            .lock()
            .unwrap()
            .insert(url.clone(), bytes.to_vec());
        Ok(RemoteObject {
            url,
            backend: self.name.clone(),
            delete_token: None,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        self.objects
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| BackendError::Status {
                status: 404,
                body: url.to_string(),
            })
    }

    async fn delete(&self, url: &str, _delete_token: Option<&str>) -> Result<bool, BackendError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::Request("connection reset".to_string()));
        }
        self.objects.lock().unwrap().remove(url);
        self.deleted.lock().unwrap().push(url.to_string());
        Ok(true)
    }
}

/// SQLite ledger whose `create` can be made to fail
pub struct FailingLedger {
    inner: SqliteLedger,
    fail_create: AtomicBool,
}

impl FailingLedger {
    pub fn failing_create() -> Self {
        Self {
            inner: SqliteLedger::open_in_memory().unwrap(),
            fail_create: AtomicBool::new(true),
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataLedger for FailingLedger {
    async fn create(&self, record: &PhotoRecord) -> Result<(), LedgerError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("disk full".to_string()));
        }
        self.inner.create(record).await
    }

    async fn get(&self, identity: &str) -> Result<Option<PhotoRecord>, LedgerError> {
        self.inner.get(identity).await
    }

    async fn query_by_owner(
        &self,
        owner_entity_id: &str,
        category: Option<PhotoCategory>,
    ) -> Result<Vec<PhotoRecord>, LedgerError> {
        self.inner.query_by_owner(owner_entity_id, category).await
    }

    async fn query_unreplicated(&self, device_id: &str) -> Result<Vec<PhotoRecord>, LedgerError> {
        self.inner.query_unreplicated(device_id).await
    }

    async fn patch_location(
        &self,
        identity: &str,
        patch: LocationPatch,
    ) -> Result<PhotoRecord, LedgerError> {
        self.inner.patch_location(identity, patch).await
    }

    async fn delete(&self, identity: &str) -> Result<bool, LedgerError> {
        self.inner.delete(identity).await
    }

    async fn begin_pending(&self, pending: &PendingUpload) -> Result<(), LedgerError> {
        self.inner.begin_pending(pending).await
    }

    async fn mark_pending_remote(
        &self,
        identity: &str,
        remote: &RemoteObject,
    ) -> Result<(), LedgerError> {
        self.inner.mark_pending_remote(identity, remote).await
    }

    async fn clear_pending(&self, identity: &str) -> Result<(), LedgerError> {
        self.inner.clear_pending(identity).await
    }

    async fn list_pending(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PendingUpload>, LedgerError> {
        self.inner.list_pending(started_before).await
    }

    async fn queue_failed_delete(
        &self,
        remote: &RemoteObject,
        error: &str,
    ) -> Result<(), LedgerError> {
        self.inner.queue_failed_delete(remote, error).await
    }

    async fn list_failed_deletes(&self) -> Result<Vec<FailedDelete>, LedgerError> {
        self.inner.list_failed_deletes().await
    }

    async fn resolve_failed_delete(&self, id: i64) -> Result<(), LedgerError> {
        self.inner.resolve_failed_delete(id).await
    }

    async fn retry_failed_delete_later(&self, id: i64, error: &str) -> Result<(), LedgerError> {
        self.inner.retry_failed_delete_later(id, error).await
    }
}
