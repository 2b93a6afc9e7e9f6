//! Vault configuration
//!
//! Everything the engine needs (cache location, timeouts, compression
//! profiles and the ordered list of remote hosts) is carried by one
//! [`VaultConfig`] value, usually loaded from TOML:
//!
//! ```toml
//! storage_path = "/data/photos"
//! adapter_timeout_secs = 20
//!
//! [compression.weight_check]
//! max_width = 300
//! max_height = 300
//! quality = 50
//!
//! [[backends]]
//! kind = "imgbb"
//! api_key = "..."
//!
//! [[backends]]
//! kind = "webdav"
//! name = "home-cloud"
//! server_url = "https://cloud.example.org"
//! username = "coach"
//! app_password = "..."
//! remote_path = "coachbook"
//! ```

use crate::backend::{
    BackendAdapter, BackendError, CloudinaryBackend, ImgbbBackend, WebDavBackend,
};
use crate::models::PhotoCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("backend name {0} is used more than once")]
    DuplicateBackend(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Size and quality bounds for one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionProfile {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100
    pub quality: u8,
}

impl CompressionProfile {
    pub const fn new(max_width: u32, max_height: u32, quality: u8) -> Self {
        Self {
            max_width,
            max_height,
            quality,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub profile: CompressionProfile,
    pub progress: CompressionProfile,
    /// Favors small files over fidelity
    pub weight_check: CompressionProfile,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            profile: CompressionProfile::new(400, 400, 70),
            progress: CompressionProfile::new(1080, 1080, 80),
            weight_check: CompressionProfile::new(300, 300, 50),
        }
    }
}

impl CompressionConfig {
    pub fn for_category(&self, category: PhotoCategory) -> CompressionProfile {
        match category {
            PhotoCategory::Profile => self.profile,
            PhotoCategory::Progress => self.progress,
            PhotoCategory::WeightCheck => self.weight_check,
        }
    }
}

/// One remote image host; the order in [`VaultConfig::backends`] is the
/// fallback order.
///
/// `name` is stored in the ledger as provenance and routes fetch and delete
/// back to this entry. It defaults to the kind, so two entries of the same
/// kind need explicit names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackendConfig {
    Imgbb {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },
    Cloudinary {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        cloud_name: String,
        upload_preset: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_base: Option<String>,
        /// With `api_secret`, enables signed deletes by public id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_secret: Option<String>,
    },
    #[serde(rename = "webdav")]
    WebDav {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        server_url: String,
        username: String,
        app_password: String,
        remote_path: String,
    },
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Imgbb { .. } => "imgbb",
            BackendConfig::Cloudinary { .. } => "cloudinary",
            BackendConfig::WebDav { .. } => "webdav",
        }
    }

    /// Adapter name; the kind unless the entry names itself
    pub fn name(&self) -> &str {
        let name = match self {
            BackendConfig::Imgbb { name, .. }
            | BackendConfig::Cloudinary { name, .. }
            | BackendConfig::WebDav { name, .. } => name.as_deref(),
        };
        name.filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.kind())
    }

    /// Construct the adapter this entry describes
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn BackendAdapter>, BackendError> {
        let name = self.name().to_string();
        let adapter: Arc<dyn BackendAdapter> = match self {
            BackendConfig::Imgbb {
                api_key, endpoint, ..
            } => {
                let mut backend = ImgbbBackend::new(api_key.clone(), timeout)?.with_name(name);
                if let Some(endpoint) = endpoint {
                    backend = backend.with_endpoint(endpoint.clone());
                }
                Arc::new(backend)
            }
            BackendConfig::Cloudinary {
                cloud_name,
                upload_preset,
                folder,
                api_base,
                api_key,
                api_secret,
                ..
            } => {
                let mut backend =
                    CloudinaryBackend::new(cloud_name.clone(), upload_preset.clone(), timeout)?
                        .with_name(name);
                if let Some(folder) = folder {
                    backend = backend.with_folder(folder.clone());
                }
                if let Some(api_base) = api_base {
                    backend = backend.with_api_base(api_base.clone());
                }
                match (api_key, api_secret) {
                    (Some(key), Some(secret)) => {
                        backend = backend.with_credentials(key.clone(), secret.clone());
                    }
                    (None, None) => {}
                    _ => {
                        return Err(BackendError::Config(
                            "Cloudinary api_key and api_secret must be set together".to_string(),
                        ))
                    }
                }
                Arc::new(backend)
            }
            BackendConfig::WebDav {
                server_url,
                username,
                app_password,
                remote_path,
                ..
            } => Arc::new(
                WebDavBackend::new(server_url, username, app_password, remote_path)?
                    .with_name(name),
            ),
        };
        Ok(adapter)
    }
}

/// Fail on the first name that appears twice
pub fn ensure_unique_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateBackend(name.to_string()));
        }
    }
    Ok(())
}

/// Configuration for the whole photo vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// App-private directory for cached photos
    pub storage_path: PathBuf,
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

fn default_adapter_timeout_secs() -> u64 {
    DEFAULT_ADAPTER_TIMEOUT_SECS
}

impl VaultConfig {
    /// Local-only configuration with default profiles
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            compression: CompressionConfig::default(),
            backends: Vec::new(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs.max(1))
    }

    /// Build every configured adapter, preserving order
    pub fn build_backends(&self) -> Result<Vec<Arc<dyn BackendAdapter>>, ConfigError> {
        ensure_unique_names(self.backends.iter().map(|b| b.name()))?;

        let timeout = self.adapter_timeout();
        let adapters = self
            .backends
            .iter()
            .map(|backend| backend.build(timeout))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(adapters)
    }
}
