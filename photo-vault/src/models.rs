use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What a photo shows; selects the compression profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhotoCategory {
    Profile,
    Progress,
    WeightCheck,
}

impl PhotoCategory {
    pub const ALL: [PhotoCategory; 3] = [
        PhotoCategory::Profile,
        PhotoCategory::Progress,
        PhotoCategory::WeightCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoCategory::Profile => "profile",
            PhotoCategory::Progress => "progress",
            PhotoCategory::WeightCheck => "weight-check",
        }
    }
}

impl fmt::Display for PhotoCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhotoCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile" => Ok(PhotoCategory::Profile),
            "progress" => Ok(PhotoCategory::Progress),
            "weight-check" | "weight_check" => Ok(PhotoCategory::WeightCheck),
            other => Err(format!("unknown photo category: {}", other)),
        }
    }
}

/// Ledger entry describing where a photo lives and who stored it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhotoRecord {
    pub identity: String,
    pub owner_entity_id: String,
    pub category: PhotoCategory,
    pub capture_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Only meaningful on the device named by `uploading_device_id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_delete_token: Option<String>,
    pub uploading_device_id: String,
    /// SHA-256 hex digest of the stored bytes
    pub checksum: String,
    pub byte_size: u64,
}

impl PhotoRecord {
    /// A record must point at a local file, a remote object, or both
    pub fn has_location(&self) -> bool {
        self.local_path.is_some() || self.remote_url.is_some()
    }

    /// The remote copy as an adapter sees it, if one was stored
    pub fn remote_object(&self) -> Option<RemoteObject> {
        let url = self.remote_url.clone()?;
        Some(RemoteObject {
            url,
            backend: self.remote_backend.clone().unwrap_or_default(),
            delete_token: self.remote_delete_token.clone(),
        })
    }
}

/// A successfully stored remote copy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteObject {
    pub url: String,
    /// Name of the adapter that stored it
    pub backend: String,
    /// Opaque handle some hosts require for deletion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_token: Option<String>,
}

/// Location fields that may change after a record is created
#[derive(Debug, Clone, PartialEq)]
pub enum LocationPatch {
    LocalPath(Option<String>),
    Remote(Option<RemoteObject>),
}

/// Best available copy of a photo for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoRef {
    /// Cached file on this device
    Local(PathBuf),
    /// URL on a remote image host
    Remote(String),
}

impl PhotoRef {
    pub fn is_local(&self) -> bool {
        matches!(self, PhotoRef::Local(_))
    }
}

impl fmt::Display for PhotoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoRef::Local(path) => write!(f, "{}", path.display()),
            PhotoRef::Remote(url) => f.write_str(url),
        }
    }
}

/// Input for a single photo upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub owner_entity_id: String,
    pub category: PhotoCategory,
    pub notes: Option<String>,
    /// Defaults to today (UTC)
    pub capture_date: Option<NaiveDate>,
}

impl UploadRequest {
    pub fn new(bytes: Vec<u8>, owner_entity_id: impl Into<String>, category: PhotoCategory) -> Self {
        Self {
            bytes,
            owner_entity_id: owner_entity_id.into(),
            category,
            notes: None,
            capture_date: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_capture_date(mut self, date: NaiveDate) -> Self {
        self.capture_date = Some(date);
        self
    }
}

/// Journal entry for an upload whose ledger record is not written yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
    pub identity: String,
    pub owner_entity_id: String,
    pub category: PhotoCategory,
    pub remote: Option<RemoteObject>,
    pub started_at: DateTime<Utc>,
}

/// Remote delete that failed and waits for the reconciliation sweep
#[derive(Debug, Clone, PartialEq)]
pub struct FailedDelete {
    pub id: i64,
    pub remote: RemoteObject,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub queued_at: DateTime<Utc>,
}
