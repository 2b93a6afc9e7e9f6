//! Photo vault: the engine wired together from one configuration value

use crate::backend::{http_client, BackendAdapter, BackendError, FallbackChain};
use crate::config::{ensure_unique_names, ConfigError, VaultConfig};
use crate::device::DeviceIdentity;
use crate::ledger::{LedgerError, MetadataLedger};
use crate::local_cache::{CacheError, LocalCacheStore};
use crate::models::{PhotoCategory, PhotoRecord, PhotoRef, UploadRequest};
use crate::reconcile::{ReconciliationSweep, SweepReport};
use crate::resolve::{LoadError, RetrievalResolver};
use crate::upload::{UploadError, UploadOrchestrator};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Backend setup failed: {0}")]
    Backend(#[from] BackendError),
    #[error("Photo cache unavailable: {0}")]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// A record together with the copy this device would display
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoListing {
    pub record: PhotoRecord,
    pub reference: Option<PhotoRef>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub records_deleted: usize,
    pub local_files_removed: usize,
    pub remote_deleted: usize,
    /// Remote deletes that failed and were queued for the sweep
    pub remote_queued: usize,
    /// Remote copies the host does not let us delete
    pub remote_kept: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplicationReport {
    pub replicated: usize,
    pub failed: usize,
}

pub struct PhotoVault {
    cache: Arc<LocalCacheStore>,
    chain: Arc<FallbackChain>,
    ledger: Arc<dyn MetadataLedger>,
    device: Arc<dyn DeviceIdentity>,
    uploader: UploadOrchestrator,
    resolver: RetrievalResolver,
    sweeper: ReconciliationSweep,
}

impl PhotoVault {
    /// Build the vault with the backends listed in `config`
    pub async fn new(
        config: &VaultConfig,
        ledger: Arc<dyn MetadataLedger>,
        device: Arc<dyn DeviceIdentity>,
    ) -> Result<Self, VaultError> {
        let backends = config.build_backends()?;
        Self::with_backends(config, backends, ledger, device).await
    }

    /// Build the vault with an explicit, ordered list of adapters.
    /// The backends in `config` are ignored; adapter names must be unique.
    pub async fn with_backends(
        config: &VaultConfig,
        backends: Vec<Arc<dyn BackendAdapter>>,
        ledger: Arc<dyn MetadataLedger>,
        device: Arc<dyn DeviceIdentity>,
    ) -> Result<Self, VaultError> {
        ensure_unique_names(backends.iter().map(|b| b.name()))?;

        let cache = Arc::new(LocalCacheStore::new(&config.storage_path));
        cache.init().await?;

        let timeout = config.adapter_timeout();
        let chain = Arc::new(FallbackChain::new(backends, timeout));
        let http = http_client(timeout)?;

        log::info!(
            "Photo vault ready on device {} (backends: {:?})",
            device.device_id(),
            chain.names()
        );

        Ok(Self {
            uploader: UploadOrchestrator::new(
                cache.clone(),
                chain.clone(),
                ledger.clone(),
                device.clone(),
                config.compression.clone(),
            ),
            resolver: RetrievalResolver::new(
                cache.clone(),
                chain.clone(),
                ledger.clone(),
                device.clone(),
                http,
            ),
            sweeper: ReconciliationSweep::new(chain.clone(), ledger.clone()),
            cache,
            chain,
            ledger,
            device,
        })
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.chain.names()
    }

    pub fn cache(&self) -> &LocalCacheStore {
        &self.cache
    }

    pub async fn upload_photo(&self, request: UploadRequest) -> Result<String, UploadError> {
        self.uploader.upload_photo(request).await
    }

    pub async fn get_photo(&self, identity: &str) -> Result<Option<PhotoRef>, LedgerError> {
        self.resolver.get_photo(identity).await
    }

    pub async fn load_photo(&self, identity: &str) -> Result<Option<Vec<u8>>, LoadError> {
        self.resolver.load_photo(identity).await
    }

    pub async fn get_record(&self, identity: &str) -> Result<Option<PhotoRecord>, LedgerError> {
        self.ledger.get(identity).await
    }

    /// Photos of one owner, oldest first, with their resolved reference
    pub async fn list_photos(
        &self,
        owner_entity_id: &str,
        category: Option<PhotoCategory>,
    ) -> Result<Vec<PhotoListing>, LedgerError> {
        let records = self.ledger.query_by_owner(owner_entity_id, category).await?;

        let mut listings = Vec::with_capacity(records.len());
        for record in records {
            let reference = self.resolver.resolve_record(&record).await;
            listings.push(PhotoListing { record, reference });
        }
        Ok(listings)
    }

    /// Delete one photo. Returns false if there was no live record.
    pub async fn delete_photo(&self, identity: &str) -> Result<bool, LedgerError> {
        let Some(record) = self.ledger.get(identity).await? else {
            return Ok(false);
        };
        let mut report = DeleteReport::default();
        self.delete_record(&record, &mut report).await?;
        Ok(report.records_deleted > 0)
    }

    /// Delete every photo of an owner, e.g. when a client is removed.
    ///
    /// Remote failures never fail the call; they are queued for the sweep.
    pub async fn delete_owner_photos(
        &self,
        owner_entity_id: &str,
    ) -> Result<DeleteReport, LedgerError> {
        let mut report = DeleteReport::default();
        for record in self.ledger.query_by_owner(owner_entity_id, None).await? {
            self.delete_record(&record, &mut report).await?;
        }
        log::info!("Deleted photos of {}: {:?}", owner_entity_id, report);
        Ok(report)
    }

    async fn delete_record(
        &self,
        record: &PhotoRecord,
        report: &mut DeleteReport,
    ) -> Result<(), LedgerError> {
        // Hide the record first so concurrent reads stop resolving it
        if !self.ledger.delete(&record.identity).await? {
            return Ok(());
        }
        report.records_deleted += 1;

        if let Some(local) = &record.local_path {
            if record.uploading_device_id == self.device.device_id() {
                match self.cache.remove(Path::new(local)).await {
                    Ok(true) => report.local_files_removed += 1,
                    Ok(false) => {}
                    Err(e) => log::warn!("Could not remove cached file {}: {}", local, e),
                }
            }
        }

        if let Some(remote) = record.remote_object() {
            match self.chain.delete(&remote).await {
                Ok(true) => report.remote_deleted += 1,
                Ok(false) => {
                    log::info!(
                        "Backend {} kept {} (no delete support)",
                        remote.backend,
                        remote.url
                    );
                    report.remote_kept += 1;
                }
                Err(e) => {
                    log::warn!("Remote delete of {} failed: {}", remote.url, e);
                    if let Err(queue_err) = self
                        .ledger
                        .queue_failed_delete(&remote, &e.to_string())
                        .await
                    {
                        log::error!(
                            "Could not queue failed delete of {}: {}",
                            remote.url,
                            queue_err
                        );
                    }
                    report.remote_queued += 1;
                }
            }
        }
        Ok(())
    }

    /// Upload photos produced on this device that never reached a backend
    pub async fn replicate_pending(
        &self,
        owner_entity_id: Option<&str>,
    ) -> Result<ReplicationReport, LedgerError> {
        let mut report = ReplicationReport::default();
        if self.chain.is_empty() {
            log::debug!("No backends configured, nothing to replicate");
            return Ok(report);
        }

        let pending = self
            .ledger
            .query_unreplicated(self.device.device_id())
            .await?;

        for record in pending
            .iter()
            .filter(|r| owner_entity_id.map_or(true, |owner| r.owner_entity_id == owner))
        {
            match self.uploader.replicate(record).await {
                Ok(_) => report.replicated += 1,
                Err(e) => {
                    log::warn!("Replication of {} failed: {}", record.identity, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn sweep(&self, older_than: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        self.sweeper.run(older_than).await
    }
}
