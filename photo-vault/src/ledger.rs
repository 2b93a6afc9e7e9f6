//! Metadata ledger
//!
//! Durable record of every stored photo: identity → locations and
//! provenance. The ledger is the single source of truth for reads. It also
//! keeps the pending-upload journal and the failed-delete queue used by the
//! reconciliation sweep.

use crate::models::{
    FailedDelete, LocationPatch, PendingUpload, PhotoCategory, PhotoRecord, RemoteObject,
};
use crate::schema::init_ledger_schema;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Photo record not found: {0}")]
    NotFound(String),
    #[error("Photo record {0} already exists")]
    Duplicate(String),
    #[error("Photo record {0} would have neither local path nor remote url")]
    NoLocation(String),
    #[error("Photo record {0} already has a remote copy")]
    RemoteConflict(String),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MetadataLedger: Send + Sync {
    /// Insert a new record. Also clears the journal entry for its identity.
    async fn create(&self, record: &PhotoRecord) -> Result<(), LedgerError>;

    async fn get(&self, identity: &str) -> Result<Option<PhotoRecord>, LedgerError>;

    /// Records of one owner, optionally one category, oldest first
    async fn query_by_owner(
        &self,
        owner_entity_id: &str,
        category: Option<PhotoCategory>,
    ) -> Result<Vec<PhotoRecord>, LedgerError>;

    /// Records produced on `device_id` that only exist locally
    async fn query_unreplicated(&self, device_id: &str) -> Result<Vec<PhotoRecord>, LedgerError>;

    /// Change location fields only; returns the updated record.
    ///
    /// A remote copy is only attached to a record that has none; otherwise
    /// the patch fails with [`LedgerError::RemoteConflict`].
    async fn patch_location(
        &self,
        identity: &str,
        patch: LocationPatch,
    ) -> Result<PhotoRecord, LedgerError>;

    /// Soft delete. Returns false if there was no live record.
    async fn delete(&self, identity: &str) -> Result<bool, LedgerError>;

    async fn begin_pending(&self, pending: &PendingUpload) -> Result<(), LedgerError>;

    async fn mark_pending_remote(
        &self,
        identity: &str,
        remote: &RemoteObject,
    ) -> Result<(), LedgerError>;

    async fn clear_pending(&self, identity: &str) -> Result<(), LedgerError>;

    async fn list_pending(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PendingUpload>, LedgerError>;

    async fn queue_failed_delete(
        &self,
        remote: &RemoteObject,
        error: &str,
    ) -> Result<(), LedgerError>;

    async fn list_failed_deletes(&self) -> Result<Vec<FailedDelete>, LedgerError>;

    async fn resolve_failed_delete(&self, id: i64) -> Result<(), LedgerError>;

    async fn retry_failed_delete_later(&self, id: i64, error: &str) -> Result<(), LedgerError>;
}

const RECORD_COLUMNS: &str = "identity, owner_entity_id, category, capture_date, notes, created_at,
     local_path, remote_url, remote_backend, remote_delete_token, uploading_device_id,
     checksum, byte_size";

fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ts_from_sql(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

fn category_from_sql(s: &str) -> rusqlite::Result<PhotoCategory> {
    s.parse().map_err(|_| rusqlite::Error::InvalidQuery)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PhotoRecord> {
    let category: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let byte_size: i64 = row.get(12)?;

    Ok(PhotoRecord {
        identity: row.get(0)?,
        owner_entity_id: row.get(1)?,
        category: category_from_sql(&category)?,
        capture_date: row.get(3)?,
        notes: row.get(4)?,
        created_at: ts_from_sql(&created_at)?,
        local_path: row.get(6)?,
        remote_url: row.get(7)?,
        remote_backend: row.get(8)?,
        remote_delete_token: row.get(9)?,
        uploading_device_id: row.get(10)?,
        checksum: row.get(11)?,
        byte_size: byte_size.max(0) as u64,
    })
}

fn remote_from_columns(
    url: Option<String>,
    backend: Option<String>,
    delete_token: Option<String>,
) -> Option<RemoteObject> {
    url.map(|url| RemoteObject {
        url,
        backend: backend.unwrap_or_default(),
        delete_token,
    })
}

/// SQLite-backed ledger
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        init_ledger_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| LedgerError::Unavailable("connection lock poisoned".to_string()))?;
        f(&mut guard)
    }

    fn load(conn: &Connection, identity: &str) -> Result<Option<PhotoRecord>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM photo_records WHERE identity = ?1 AND deleted = 0",
            RECORD_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![identity], record_from_row)
            .optional()?)
    }

    fn query(
        conn: &Connection,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<PhotoRecord>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM photo_records WHERE deleted = 0 AND {} ORDER BY created_at, rowid",
            RECORD_COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, record_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl MetadataLedger for SqliteLedger {
    async fn create(&self, record: &PhotoRecord) -> Result<(), LedgerError> {
        if !record.has_location() {
            return Err(LedgerError::NoLocation(record.identity.clone()));
        }

        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let exists: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM photo_records WHERE identity = ?1",
                params![record.identity],
                |row| row.get(0),
            )?;
            if exists {
                return Err(LedgerError::Duplicate(record.identity.clone()));
            }

            tx.execute(
                "INSERT INTO photo_records (identity, owner_entity_id, category, capture_date, notes, created_at,
                    local_path, remote_url, remote_backend, remote_delete_token, uploading_device_id,
                    checksum, byte_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.identity,
                    record.owner_entity_id,
                    record.category.as_str(),
                    record.capture_date,
                    record.notes,
                    ts_to_sql(&record.created_at),
                    record.local_path,
                    record.remote_url,
                    record.remote_backend,
                    record.remote_delete_token,
                    record.uploading_device_id,
                    record.checksum,
                    record.byte_size as i64,
                ],
            )?;
            tx.execute(
                "DELETE FROM photo_upload_journal WHERE identity = ?1",
                params![record.identity],
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    async fn get(&self, identity: &str) -> Result<Option<PhotoRecord>, LedgerError> {
        self.with_conn(|conn| Self::load(conn, identity))
    }

    async fn query_by_owner(
        &self,
        owner_entity_id: &str,
        category: Option<PhotoCategory>,
    ) -> Result<Vec<PhotoRecord>, LedgerError> {
        self.with_conn(|conn| match category {
            Some(category) => Self::query(
                conn,
                "owner_entity_id = ?1 AND category = ?2",
                &[&owner_entity_id, &category.as_str()],
            ),
            None => Self::query(conn, "owner_entity_id = ?1", &[&owner_entity_id]),
        })
    }

    async fn query_unreplicated(&self, device_id: &str) -> Result<Vec<PhotoRecord>, LedgerError> {
        self.with_conn(|conn| {
            Self::query(
                conn,
                "remote_url IS NULL AND local_path IS NOT NULL AND uploading_device_id = ?1",
                &[&device_id],
            )
        })
    }

    async fn patch_location(
        &self,
        identity: &str,
        patch: LocationPatch,
    ) -> Result<PhotoRecord, LedgerError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let mut record = Self::load(&tx, identity)?
                .ok_or_else(|| LedgerError::NotFound(identity.to_string()))?;

            let attach_remote = matches!(patch, LocationPatch::Remote(Some(_)));
            if attach_remote && record.remote_url.is_some() {
                return Err(LedgerError::RemoteConflict(identity.to_string()));
            }

            match patch {
                LocationPatch::LocalPath(path) => record.local_path = path,
                LocationPatch::Remote(Some(remote)) => {
                    record.remote_url = Some(remote.url);
                    record.remote_backend = Some(remote.backend);
                    record.remote_delete_token = remote.delete_token;
                }
                LocationPatch::Remote(None) => {
                    record.remote_url = None;
                    record.remote_backend = None;
                    record.remote_delete_token = None;
                }
            }

            if !record.has_location() {
                return Err(LedgerError::NoLocation(identity.to_string()));
            }

            let guard = if attach_remote {
                " AND remote_url IS NULL"
            } else {
                ""
            };
            let rows = tx.execute(
                &format!(
                    "UPDATE photo_records
                     SET local_path = ?1, remote_url = ?2, remote_backend = ?3, remote_delete_token = ?4
                     WHERE identity = ?5 AND deleted = 0{}",
                    guard
                ),
                params![
                    record.local_path,
                    record.remote_url,
                    record.remote_backend,
                    record.remote_delete_token,
                    identity,
                ],
            )?;
            if rows == 0 {
                return Err(if attach_remote {
                    LedgerError::RemoteConflict(identity.to_string())
                } else {
                    LedgerError::NotFound(identity.to_string())
                });
            }
            tx.commit()?;
            Ok(record)
        })
    }

    async fn delete(&self, identity: &str) -> Result<bool, LedgerError> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE photo_records SET deleted = 1, deleted_at = ?1
                 WHERE identity = ?2 AND deleted = 0",
                params![ts_to_sql(&Utc::now()), identity],
            )?;
            Ok(rows > 0)
        })
    }

    async fn begin_pending(&self, pending: &PendingUpload) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            let remote = pending.remote.as_ref();
            conn.execute(
                "INSERT OR REPLACE INTO photo_upload_journal
                    (identity, owner_entity_id, category, remote_url, remote_backend, remote_delete_token, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    pending.identity,
                    pending.owner_entity_id,
                    pending.category.as_str(),
                    remote.map(|r| r.url.as_str()),
                    remote.map(|r| r.backend.as_str()),
                    remote.and_then(|r| r.delete_token.as_deref()),
                    ts_to_sql(&pending.started_at),
                ],
            )?;
            Ok(())
        })
    }

    async fn mark_pending_remote(
        &self,
        identity: &str,
        remote: &RemoteObject,
    ) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE photo_upload_journal
                 SET remote_url = ?1, remote_backend = ?2, remote_delete_token = ?3
                 WHERE identity = ?4",
                params![remote.url, remote.backend, remote.delete_token, identity],
            )?;
            if rows == 0 {
                return Err(LedgerError::NotFound(identity.to_string()));
            }
            Ok(())
        })
    }

    async fn clear_pending(&self, identity: &str) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM photo_upload_journal WHERE identity = ?1",
                params![identity],
            )?;
            Ok(())
        })
    }

    async fn list_pending(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PendingUpload>, LedgerError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT identity, owner_entity_id, category, remote_url, remote_backend,
                        remote_delete_token, started_at
                 FROM photo_upload_journal
                 WHERE started_at < ?1
                 ORDER BY started_at",
            )?;

            let rows = stmt.query_map(params![ts_to_sql(&started_before)], |row| {
                let category: String = row.get(2)?;
                let started_at: String = row.get(6)?;
                Ok(PendingUpload {
                    identity: row.get(0)?,
                    owner_entity_id: row.get(1)?,
                    category: category_from_sql(&category)?,
                    remote: remote_from_columns(row.get(3)?, row.get(4)?, row.get(5)?),
                    started_at: ts_from_sql(&started_at)?,
                })
            })?;

            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    async fn queue_failed_delete(
        &self,
        remote: &RemoteObject,
        error: &str,
    ) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO photo_failed_deletes (remote_url, remote_backend, remote_delete_token, last_error, queued_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    remote.url,
                    remote.backend,
                    remote.delete_token,
                    error,
                    ts_to_sql(&Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    async fn list_failed_deletes(&self) -> Result<Vec<FailedDelete>, LedgerError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, remote_url, remote_backend, remote_delete_token, attempts, last_error, queued_at
                 FROM photo_failed_deletes
                 ORDER BY id",
            )?;

            let rows = stmt.query_map([], |row| {
                let attempts: i64 = row.get(4)?;
                let queued_at: String = row.get(6)?;
                Ok(FailedDelete {
                    id: row.get(0)?,
                    remote: RemoteObject {
                        url: row.get(1)?,
                        backend: row.get(2)?,
                        delete_token: row.get(3)?,
                    },
                    attempts: attempts.max(0) as u32,
                    last_error: row.get(5)?,
                    queued_at: ts_from_sql(&queued_at)?,
                })
            })?;

            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    async fn resolve_failed_delete(&self, id: i64) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM photo_failed_deletes WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    async fn retry_failed_delete_later(&self, id: i64, error: &str) -> Result<(), LedgerError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE photo_failed_deletes SET attempts = attempts + 1, last_error = ?1 WHERE id = ?2",
                params![error, id],
            )?;
            Ok(())
        })
    }
}
