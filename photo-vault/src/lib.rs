//! # Photo Vault
//!
//! Tiered storage for client photos: every photo is compressed, cached on
//! the device, replicated to the first remote image host that accepts it,
//! and recorded in a metadata ledger so other devices can find it.
//!
//! Reads return the cheapest valid copy: the cached file on the device
//! that took the photo, the remote URL everywhere else.
//!
//! ## Platform Separation
//!
//! This crate holds no platform code. Resolving the app-private data
//! directory and choosing the database file is left to the application.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use photo_vault::{PhotoCategory, PhotoVault, SqliteLedger, UploadRequest, VaultConfig};
//!
//! let config = VaultConfig::load(Path::new("/data/coachbook.toml"))?;
//! let conn = rusqlite::Connection::open("/data/coachbook.db")?;
//! let device = PersistedDeviceIdentity::load_or_create(&conn)?;
//! let ledger = SqliteLedger::from_connection(conn)?;
//!
//! let vault = PhotoVault::new(&config, Arc::new(ledger), Arc::new(device)).await?;
//! let id = vault
//!     .upload_photo(UploadRequest::new(bytes, "client-42", PhotoCategory::WeightCheck))
//!     .await?;
//! let photo = vault.get_photo(&id).await?;
//! ```

pub mod backend;
pub mod compression;
pub mod config;
pub mod device;
pub mod ledger;
pub mod local_cache;
pub mod models;
pub mod reconcile;
pub mod resolve;
pub mod schema;
pub mod upload;
pub mod vault;

#[cfg(test)]
mod test_support;

pub use backend::{BackendAdapter, BackendError, FallbackChain};
pub use compression::{compress, CompressedImage, CompressionError};
pub use config::{BackendConfig, CompressionConfig, CompressionProfile, ConfigError, VaultConfig};
pub use device::{DeviceIdentity, FixedDeviceIdentity, PersistedDeviceIdentity};
pub use ledger::{LedgerError, MetadataLedger, SqliteLedger};
pub use local_cache::{CacheError, LocalCacheStore};
pub use models::{PhotoCategory, PhotoRecord, PhotoRef, RemoteObject, UploadRequest};
pub use reconcile::{ReconciliationSweep, SweepReport};
pub use resolve::{LoadError, RetrievalResolver};
pub use schema::{init_device_schema, init_ledger_schema};
pub use upload::{TierFailures, UploadError, UploadOrchestrator};
pub use vault::{DeleteReport, PhotoListing, PhotoVault, ReplicationReport, VaultError};
