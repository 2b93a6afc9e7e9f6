//! On-device photo cache
//!
//! Files are written once under an app-private directory and never
//! overwritten; names follow `{owner}_{category}_{timestamp}.jpg`.

use crate::models::PhotoCategory;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

/// Upper bound on `-{n}` suffixes tried when a name is taken
const MAX_NAME_ATTEMPTS: u32 = 32;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no free file name for {0}")]
    NameExhausted(String),
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Replace anything that could escape the cache directory
fn sanitize_component(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// File name for a cached photo; `attempt > 0` adds a collision suffix
pub fn cache_file_name(
    owner_entity_id: &str,
    category: PhotoCategory,
    timestamp_ms: i64,
    attempt: u32,
) -> String {
    let owner = sanitize_component(owner_entity_id);
    if attempt == 0 {
        format!("{}_{}_{}.jpg", owner, category.as_str(), timestamp_ms)
    } else {
        format!(
            "{}_{}_{}-{}.jpg",
            owner,
            category.as_str(),
            timestamp_ms,
            attempt
        )
    }
}

/// Append-only store for photo bytes on this device
#[derive(Debug)]
pub struct LocalCacheStore {
    root: PathBuf,
    ready: OnceCell<()>,
}

impl LocalCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ready: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache directory. Repeated calls after a success are no-ops;
    /// a failed attempt is retried on the next call.
    pub async fn init(&self) -> Result<(), CacheError> {
        self.ready
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.root)
                    .await
                    .map_err(|e| CacheError::io(&self.root, e))?;
                log::debug!("Photo cache ready at {}", self.root.display());
                Ok::<(), CacheError>(())
            })
            .await
            .map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.initialized()
    }

    /// Write `bytes` to a new file and return its path
    pub async fn persist(
        &self,
        bytes: &[u8],
        owner_entity_id: &str,
        category: PhotoCategory,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, CacheError> {
        self.init().await?;

        let timestamp_ms = at.timestamp_millis();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = cache_file_name(owner_entity_id, category, timestamp_ms, attempt);
            let path = self.root.join(&name);

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(CacheError::io(&path, e)),
            };

            let written = async {
                file.write_all(bytes).await?;
                file.sync_all().await
            }
            .await;

            if let Err(e) = written {
                drop(file);
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    log::warn!(
                        "Could not remove partial cache file {}: {}",
                        path.display(),
                        remove_err
                    );
                }
                return Err(CacheError::io(&path, e));
            }

            log::debug!("Cached {} bytes at {}", bytes.len(), path.display());
            return Ok(path);
        }

        Err(CacheError::NameExhausted(cache_file_name(
            owner_entity_id,
            category,
            timestamp_ms,
            0,
        )))
    }

    /// Whether a cached file is present. Any IO error counts as absent.
    pub async fn exists(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    log::warn!("Treating {} as absent: {}", path.display(), e);
                }
                false
            }
        }
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, CacheError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| CacheError::io(path, e))
    }

    /// Remove a cached file. Returns false if it was already gone.
    pub async fn remove(&self, path: &Path) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }
}
