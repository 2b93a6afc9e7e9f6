//! Retrieval: pick the cheapest valid copy of a photo
//!
//! A local path is only trusted on the device that wrote it, and only when
//! the file is still there. Everyone else gets the remote URL.

use crate::backend::{fetch_url, BackendError, FallbackChain};
use crate::device::DeviceIdentity;
use crate::ledger::{LedgerError, MetadataLedger};
use crate::local_cache::LocalCacheStore;
use crate::models::{PhotoRecord, PhotoRef};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Remote copy unavailable: {0}")]
    Remote(#[from] BackendError),
}

pub struct RetrievalResolver {
    cache: Arc<LocalCacheStore>,
    chain: Arc<FallbackChain>,
    ledger: Arc<dyn MetadataLedger>,
    device: Arc<dyn DeviceIdentity>,
    http: reqwest::Client,
}

impl RetrievalResolver {
    pub fn new(
        cache: Arc<LocalCacheStore>,
        chain: Arc<FallbackChain>,
        ledger: Arc<dyn MetadataLedger>,
        device: Arc<dyn DeviceIdentity>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            cache,
            chain,
            ledger,
            device,
            http,
        }
    }

    /// Best reference for `identity`, or `None` if there is no live record
    /// or no copy usable from this device
    pub async fn get_photo(&self, identity: &str) -> Result<Option<PhotoRef>, LedgerError> {
        match self.ledger.get(identity).await? {
            Some(record) => Ok(self.resolve_record(&record).await),
            None => {
                log::debug!("No photo record for {}", identity);
                Ok(None)
            }
        }
    }

    pub async fn resolve_record(&self, record: &PhotoRecord) -> Option<PhotoRef> {
        if let Some(path) = self.own_local_copy(record).await {
            return Some(PhotoRef::Local(path.into()));
        }
        record.remote_url.clone().map(PhotoRef::Remote)
    }

    /// Bytes of the best copy. Falls back to the remote copy when the local
    /// read fails.
    pub async fn load_photo(&self, identity: &str) -> Result<Option<Vec<u8>>, LoadError> {
        let Some(record) = self.ledger.get(identity).await? else {
            return Ok(None);
        };

        if let Some(path) = self.own_local_copy(&record).await {
            match self.cache.read(Path::new(&path)).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) => log::warn!("Local read of {} failed, trying remote: {}", path, e),
            }
        }

        let Some(remote) = record.remote_object() else {
            return Ok(None);
        };

        let bytes = match self.chain.fetch(&remote).await {
            Err(BackendError::UnknownBackend(name)) => {
                log::debug!("Backend {:?} not configured, fetching {} directly", name, remote.url);
                fetch_url(&self.http, &remote.url).await?
            }
            other => other?,
        };
        Ok(Some(bytes))
    }

    async fn own_local_copy(&self, record: &PhotoRecord) -> Option<String> {
        let path = record.local_path.as_ref()?;
        if record.uploading_device_id != self.device.device_id() {
            return None;
        }
        if self.cache.exists(Path::new(path)).await {
            Some(path.clone())
        } else {
            log::debug!("Cached file {} for {} is gone", path, record.identity);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendAdapter;
    use crate::device::FixedDeviceIdentity;
    use crate::ledger::SqliteLedger;
    use crate::models::PhotoCategory;
    use crate::test_support::{record, StubBackend};
    use std::time::Duration;

    struct Setup {
        dir: tempfile::TempDir,
        ledger: Arc<SqliteLedger>,
        backend: Arc<StubBackend>,
    }

    impl Setup {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                ledger: Arc::new(SqliteLedger::open_in_memory().unwrap()),
                backend: Arc::new(StubBackend::succeeding("a")),
            }
        }

        fn resolver(&self, device: &str) -> RetrievalResolver {
            RetrievalResolver::new(
                Arc::new(LocalCacheStore::new(self.dir.path())),
                Arc::new(FallbackChain::new(
                    vec![self.backend.clone() as Arc<dyn BackendAdapter>],
                    Duration::from_secs(5),
                )),
                self.ledger.clone(),
                Arc::new(FixedDeviceIdentity::new(device)),
                reqwest::Client::new(),
            )
        }

        fn local_file(&self, name: &str, bytes: &[u8]) -> String {
            let path = self.dir.path().join(name);
            std::fs::write(&path, bytes).unwrap();
            path.to_string_lossy().into_owned()
        }
    }

    #[tokio::test]
    async fn test_own_device_prefers_local_copy() {
        let s = Setup::new();
        let mut rec = record("p1", "c", PhotoCategory::Progress);
        rec.local_path = Some(s.local_file("p1.jpg", b"jpeg"));
        s.ledger.create(&rec).await.unwrap();

        let found = s.resolver("device-a").get_photo("p1").await.unwrap().unwrap();
        assert!(found.is_local());

        let elsewhere = s.resolver("device-b").get_photo("p1").await.unwrap();
        assert_eq!(elsewhere, Some(PhotoRef::Remote("https://a.example/p1.jpg".into())));
    }

    #[tokio::test]
    async fn test_missing_local_file_falls_back_to_remote() {
        let s = Setup::new();
        let rec = record("p1", "c", PhotoCategory::Progress);
        s.ledger.create(&rec).await.unwrap();

        let found = s.resolver("device-a").get_photo("p1").await.unwrap();
        assert_eq!(found, Some(PhotoRef::Remote("https://a.example/p1.jpg".into())));
    }

    #[tokio::test]
    async fn test_local_only_record_on_other_device_is_none() {
        let s = Setup::new();
        let mut rec = record("p1", "c", PhotoCategory::Progress);
        rec.local_path = Some(s.local_file("p1.jpg", b"jpeg"));
        rec.remote_url = None;
        s.ledger.create(&rec).await.unwrap();

        assert!(s.resolver("device-b").get_photo("p1").await.unwrap().is_none());
        assert!(s.resolver("device-a").get_photo("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeated_reads_agree() {
        let s = Setup::new();
        let mut rec = record("p1", "c", PhotoCategory::Profile);
        rec.local_path = Some(s.local_file("p1.jpg", b"jpeg"));
        s.ledger.create(&rec).await.unwrap();

        let resolver = s.resolver("device-a");
        let first = resolver.get_photo("p1").await.unwrap();
        let second = resolver.get_photo("p1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_reads_local_then_remote() {
        let s = Setup::new();
        let stored = s
            .backend
            .upload(b"remote-bytes", "c", PhotoCategory::Progress)
            .await
            .unwrap();

        let mut rec = record("p1", "c", PhotoCategory::Progress);
        rec.local_path = Some(s.local_file("p1.jpg", b"local-bytes"));
        rec.remote_url = Some(stored.url.clone());
        s.ledger.create(&rec).await.unwrap();

        let own = s.resolver("device-a").load_photo("p1").await.unwrap();
        assert_eq!(own.as_deref(), Some(&b"local-bytes"[..]));

        let other = s.resolver("device-b").load_photo("p1").await.unwrap();
        assert_eq!(other.as_deref(), Some(&b"remote-bytes"[..]));

        assert!(s.resolver("device-a").load_photo("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_surfaces_remote_errors() {
        let s = Setup::new();
        let mut rec = record("p1", "c", PhotoCategory::Progress);
        rec.remote_url = Some("https://a.example/never-uploaded.jpg".into());
        s.ledger.create(&rec).await.unwrap();

        let result = s.resolver("device-b").load_photo("p1").await;
        assert!(matches!(result, Err(LoadError::Remote(BackendError::Status { .. }))));
    }
}
