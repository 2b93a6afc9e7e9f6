//! Reconciliation sweep
//!
//! Cleans up after the non-atomic parts of upload and delete: remote
//! objects stored by uploads whose ledger record never got written or never
//! pointed at them, and remote deletes that failed earlier.

use crate::backend::{BackendError, FallbackChain};
use crate::ledger::{LedgerError, MetadataLedger};
use crate::models::{FailedDelete, PendingUpload, RemoteObject};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Queued deletes are dropped after this many failed attempts
pub const MAX_DELETE_ATTEMPTS: u32 = 10;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Journal entries whose record exists after all
    pub completed_uploads: usize,
    /// Orphaned remote objects deleted
    pub orphans_deleted: usize,
    /// Journal entries that could not be cleaned up and were dropped
    pub possible_leaks: usize,
    /// Journal entries kept for the next sweep
    pub orphans_pending: usize,
    pub deletes_retried: usize,
    pub deletes_resolved: usize,
    pub deletes_abandoned: usize,
}

pub struct ReconciliationSweep {
    chain: Arc<FallbackChain>,
    ledger: Arc<dyn MetadataLedger>,
}

impl ReconciliationSweep {
    pub fn new(chain: Arc<FallbackChain>, ledger: Arc<dyn MetadataLedger>) -> Self {
        Self { chain, ledger }
    }

    /// Process journal entries started before `older_than`, then retry
    /// every queued remote delete
    pub async fn run(&self, older_than: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let mut report = SweepReport::default();

        for pending in self.ledger.list_pending(older_than).await? {
            self.reconcile_pending(&pending, &mut report).await?;
        }

        for failed in self.ledger.list_failed_deletes().await? {
            self.retry_delete(&failed, &mut report).await?;
        }

        log::info!("Reconciliation sweep finished: {:?}", report);
        Ok(report)
    }

    async fn reconcile_pending(
        &self,
        pending: &PendingUpload,
        report: &mut SweepReport,
    ) -> Result<(), LedgerError> {
        if let Some(record) = self.ledger.get(&pending.identity).await? {
            match &pending.remote {
                // Replication of an existing record stopped before the patch
                Some(remote) if record.remote_url.as_deref() != Some(remote.url.as_str()) => {
                    self.delete_orphan(pending, remote, report).await?;
                }
                _ => {
                    self.ledger.clear_pending(&pending.identity).await?;
                    report.completed_uploads += 1;
                }
            }
            return Ok(());
        }

        let Some(remote) = &pending.remote else {
            log::warn!(
                "Upload {} for {} was interrupted before a backend answered; a remote copy may have leaked",
                pending.identity,
                pending.owner_entity_id
            );
            self.ledger.clear_pending(&pending.identity).await?;
            report.possible_leaks += 1;
            return Ok(());
        };

        self.delete_orphan(pending, remote, report).await
    }

    async fn delete_orphan(
        &self,
        pending: &PendingUpload,
        remote: &RemoteObject,
        report: &mut SweepReport,
    ) -> Result<(), LedgerError> {
        match self.chain.delete(remote).await {
            Ok(true) => {
                log::info!("Deleted orphan {} on {}", remote.url, remote.backend);
                self.ledger.clear_pending(&pending.identity).await?;
                report.orphans_deleted += 1;
            }
            Ok(false) | Err(BackendError::UnknownBackend(_)) => {
                log::warn!(
                    "Orphan {} on {} cannot be deleted by this client",
                    remote.url,
                    remote.backend
                );
                self.ledger.clear_pending(&pending.identity).await?;
                report.possible_leaks += 1;
            }
            Err(e) => {
                log::warn!("Orphan {} still present: {}", remote.url, e);
                report.orphans_pending += 1;
            }
        }
        Ok(())
    }

    async fn retry_delete(
        &self,
        failed: &FailedDelete,
        report: &mut SweepReport,
    ) -> Result<(), LedgerError> {
        report.deletes_retried += 1;

        match self.chain.delete(&failed.remote).await {
            Ok(_) => {
                self.ledger.resolve_failed_delete(failed.id).await?;
                report.deletes_resolved += 1;
            }
            Err(e) if failed.attempts + 1 >= MAX_DELETE_ATTEMPTS => {
                log::error!(
                    "Giving up on deleting {} after {} attempts: {}",
                    failed.remote.url,
                    failed.attempts + 1,
                    e
                );
                self.ledger.resolve_failed_delete(failed.id).await?;
                report.deletes_abandoned += 1;
            }
            Err(e) => {
                log::debug!("Delete of {} failed again: {}", failed.remote.url, e);
                self.ledger
                    .retry_failed_delete_later(failed.id, &e.to_string())
                    .await?;
            }
        }
        Ok(())
    }
}
