//! Upload orchestration
//!
//! One upload walks the tiers in order: compress, write the local cache,
//! then try each remote backend until one accepts the photo. The ledger
//! record is written last and only if at least one tier holds the bytes.
//!
//! Remote upload and ledger write are not atomic. A journal entry is kept
//! while the upload is in flight so that an object stored remotely before
//! a crash can be found and removed by the reconciliation sweep.

use crate::backend::{BackendError, FallbackChain};
use crate::compression::compress;
use crate::config::CompressionConfig;
use crate::device::DeviceIdentity;
use crate::ledger::{LedgerError, MetadataLedger};
use crate::local_cache::LocalCacheStore;
use crate::models::{LocationPatch, PendingUpload, PhotoRecord, RemoteObject, UploadRequest};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Why every tier of an upload failed
#[derive(Debug, Default)]
pub struct TierFailures {
    pub local: Option<String>,
    pub backends: Vec<(String, BackendError)>,
}

impl fmt::Display for TierFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(local) = &self.local {
            parts.push(format!("local: {}", local));
        }
        for (name, err) in &self.backends {
            parts.push(format!("{}: {}", name, err));
        }
        if parts.is_empty() {
            f.write_str("no storage tier configured")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid upload request: {0}")]
    InvalidRequest(String),
    #[error("All storage tiers failed: {0}")]
    AllTiersFailed(TierFailures),
    #[error("Photo {identity} could not be recorded: {source}")]
    LedgerWrite {
        identity: String,
        #[source]
        source: LedgerError,
    },
}

impl UploadError {
    /// Whether retrying with the same bytes can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, UploadError::InvalidRequest(_))
    }
}

/// Hex SHA-256 of the stored bytes
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub struct UploadOrchestrator {
    cache: Arc<LocalCacheStore>,
    chain: Arc<FallbackChain>,
    ledger: Arc<dyn MetadataLedger>,
    device: Arc<dyn DeviceIdentity>,
    compression: CompressionConfig,
}

impl UploadOrchestrator {
    pub fn new(
        cache: Arc<LocalCacheStore>,
        chain: Arc<FallbackChain>,
        ledger: Arc<dyn MetadataLedger>,
        device: Arc<dyn DeviceIdentity>,
        compression: CompressionConfig,
    ) -> Self {
        Self {
            cache,
            chain,
            ledger,
            device,
            compression,
        }
    }

    /// Store a photo and return its identity.
    ///
    /// Fails only when neither the local cache nor any backend kept the
    /// bytes, or when the ledger write fails.
    pub async fn upload_photo(&self, request: UploadRequest) -> Result<String, UploadError> {
        let UploadRequest {
            bytes,
            owner_entity_id,
            category,
            notes,
            capture_date,
        } = request;

        if owner_entity_id.trim().is_empty() {
            return Err(UploadError::InvalidRequest(
                "owner entity id is empty".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(UploadError::InvalidRequest("image is empty".to_string()));
        }

        let identity = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        log::debug!(
            "Uploading photo {} for {} ({})",
            identity,
            owner_entity_id,
            category
        );

        let compressed = compress(bytes, self.compression.for_category(category)).await;
        let bytes = compressed.bytes;

        let mut failures = TierFailures::default();

        let local_path = match self
            .cache
            .persist(&bytes, &owner_entity_id, category, created_at)
            .await
        {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                log::warn!("Local cache write failed for {}: {}", identity, e);
                failures.local = Some(e.to_string());
                None
            }
        };

        let remote = if self.chain.is_empty() {
            None
        } else {
            let pending = PendingUpload {
                identity: identity.clone(),
                owner_entity_id: owner_entity_id.clone(),
                category,
                remote: None,
                started_at: created_at,
            };
            self.journal_begin(&pending).await;

            let outcome = self.chain.upload(&bytes, &owner_entity_id, category).await;
            failures.backends = outcome.failures;

            match &outcome.stored {
                Some(remote) => self.journal_remote(&identity, remote).await,
                None => self.journal_clear(&identity).await,
            }
            outcome.stored
        };

        if local_path.is_none() && remote.is_none() {
            log::error!("Upload {} failed on every tier: {}", identity, failures);
            return Err(UploadError::AllTiersFailed(failures));
        }

        let record = PhotoRecord {
            identity: identity.clone(),
            owner_entity_id,
            category,
            capture_date: capture_date.unwrap_or_else(|| created_at.date_naive()),
            notes,
            created_at,
            local_path,
            remote_url: remote.as_ref().map(|r| r.url.clone()),
            remote_backend: remote.as_ref().map(|r| r.backend.clone()),
            remote_delete_token: remote.as_ref().and_then(|r| r.delete_token.clone()),
            uploading_device_id: self.device.device_id().to_string(),
            checksum: checksum(&bytes),
            byte_size: bytes.len() as u64,
        };

        if let Err(source) = self.ledger.create(&record).await {
            log::error!("Ledger write failed for {}: {}", identity, source);
            self.discard_tiers(&record, remote.as_ref()).await;
            return Err(UploadError::LedgerWrite { identity, source });
        }

        log::info!(
            "Stored photo {} (local: {}, remote: {})",
            identity,
            record.local_path.is_some(),
            record.remote_backend.as_deref().unwrap_or("none")
        );
        Ok(identity)
    }

    /// Push a local-only record to the first backend that accepts it and
    /// patch its remote location.
    ///
    /// `record` may be stale: the ledger copy is read again, and a record
    /// that gained a remote copy in the meantime keeps it. An object stored
    /// by a losing concurrent pass is deleted again.
    pub async fn replicate(&self, record: &PhotoRecord) -> Result<PhotoRecord, UploadError> {
        let identity = record.identity.clone();
        let current = self.current_record(&identity).await?;
        if current.remote_url.is_some() {
            return Ok(current);
        }

        let local = current.local_path.as_deref().ok_or_else(|| {
            UploadError::InvalidRequest(format!("{} has no local copy", identity))
        })?;

        let bytes = self.cache.read(Path::new(local)).await.map_err(|e| {
            UploadError::AllTiersFailed(TierFailures {
                local: Some(e.to_string()),
                backends: Vec::new(),
            })
        })?;

        self.journal_begin(&PendingUpload {
            identity: identity.clone(),
            owner_entity_id: current.owner_entity_id.clone(),
            category: current.category,
            remote: None,
            started_at: Utc::now(),
        })
        .await;

        let outcome = self
            .chain
            .upload(&bytes, &current.owner_entity_id, current.category)
            .await;

        let Some(remote) = outcome.stored else {
            self.journal_clear(&identity).await;
            return Err(UploadError::AllTiersFailed(TierFailures {
                local: None,
                backends: outcome.failures,
            }));
        };
        self.journal_remote(&identity, &remote).await;

        let updated = self
            .ledger
            .patch_location(&identity, LocationPatch::Remote(Some(remote.clone())))
            .await;

        match updated {
            Ok(updated) => {
                self.journal_clear(&identity).await;
                log::info!("Replicated {} to {}", identity, remote.backend);
                Ok(updated)
            }
            Err(LedgerError::RemoteConflict(_)) => {
                log::info!(
                    "{} was replicated concurrently, dropping duplicate {}",
                    identity,
                    remote.url
                );
                self.delete_remote_or_queue(&identity, &remote).await;
                self.current_record(&identity).await
            }
            Err(source) => {
                self.delete_remote_or_keep_journal(&identity, &remote).await;
                Err(UploadError::LedgerWrite { identity, source })
            }
        }
    }

    async fn current_record(&self, identity: &str) -> Result<PhotoRecord, UploadError> {
        match self.ledger.get(identity).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(UploadError::LedgerWrite {
                identity: identity.to_string(),
                source: LedgerError::NotFound(identity.to_string()),
            }),
            Err(source) => Err(UploadError::LedgerWrite {
                identity: identity.to_string(),
                source,
            }),
        }
    }

    /// Roll back what the tiers stored when the record could not be written
    async fn discard_tiers(&self, record: &PhotoRecord, remote: Option<&RemoteObject>) {
        if let Some(local) = &record.local_path {
            if let Err(e) = self.cache.remove(Path::new(local)).await {
                log::warn!("Could not remove cached file {}: {}", local, e);
            }
        }
        if let Some(remote) = remote {
            self.delete_remote_or_keep_journal(&record.identity, remote)
                .await;
        }
    }

    async fn delete_remote_or_keep_journal(&self, identity: &str, remote: &RemoteObject) {
        match self.chain.delete(remote).await {
            Ok(true) => self.journal_clear(identity).await,
            Ok(false) => log::warn!(
                "Backend {} did not delete {}, left for the sweep",
                remote.backend,
                remote.url
            ),
            Err(e) => log::warn!(
                "Orphaned remote object {} on {}: {}",
                remote.url,
                remote.backend,
                e
            ),
        }
    }

    /// Delete a redundant object; failures go to the failed-delete queue
    /// since the journal entry for `identity` may belong to another pass
    async fn delete_remote_or_queue(&self, identity: &str, remote: &RemoteObject) {
        let error = match self.chain.delete(remote).await {
            Ok(true) => {
                self.journal_clear(identity).await;
                return;
            }
            Ok(false) => {
                log::warn!(
                    "Backend {} did not delete duplicate {}",
                    remote.backend,
                    remote.url
                );
                self.journal_clear(identity).await;
                return;
            }
            Err(e) => e,
        };

        log::warn!("Could not delete duplicate {}: {}", remote.url, error);
        match self.ledger.queue_failed_delete(remote, &error.to_string()).await {
            Ok(()) => self.journal_clear(identity).await,
            Err(e) => log::warn!("Failed-delete queue write failed for {}: {}", remote.url, e),
        }
    }

    // Journal writes are best effort: losing one only weakens orphan detection.

    async fn journal_begin(&self, pending: &PendingUpload) {
        if let Err(e) = self.ledger.begin_pending(pending).await {
            log::warn!("Upload journal write failed for {}: {}", pending.identity, e);
        }
    }

    async fn journal_remote(&self, identity: &str, remote: &RemoteObject) {
        if let Err(e) = self.ledger.mark_pending_remote(identity, remote).await {
            log::warn!("Upload journal update failed for {}: {}", identity, e);
        }
    }

    async fn journal_clear(&self, identity: &str) {
        if let Err(e) = self.ledger.clear_pending(identity).await {
            log::warn!("Upload journal clear failed for {}: {}", identity, e);
        }
    }
}
