//! Remote image hosts
//!
//! Every host implements [`BackendAdapter`]. Adapters hold only their
//! configuration and an HTTP client; no state survives between calls.

mod chain;
mod cloudinary;
mod imgbb;
mod webdav;

pub use chain::{ChainOutcome, FallbackChain};
pub use cloudinary::CloudinaryBackend;
pub use imgbb::ImgbbBackend;
pub use webdav::WebDavBackend;

use crate::models::{PhotoCategory, RemoteObject};
use async_trait::async_trait;
use std::time::Duration;

const USER_AGENT: &str = concat!("photo-vault/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Server returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected response: {0}")]
    Response(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No configured backend named {0}")]
    UnknownBackend(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Request(err.to_string())
    }
}

/// Capability set shared by all remote image hosts
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Stable name stored in the ledger as provenance
    fn name(&self) -> &str;

    /// Store `bytes` as a new object. On error nothing may remain
    /// registered on the host, so the call is safe to retry.
    async fn upload(
        &self,
        bytes: &[u8],
        owner_entity_id: &str,
        category: PhotoCategory,
    ) -> Result<RemoteObject, BackendError>;

    /// Download an object previously returned by `upload`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError>;

    /// Best-effort removal. `Ok(false)` means the host did not delete
    /// anything (unsupported or already gone).
    async fn delete(&self, url: &str, delete_token: Option<&str>) -> Result<bool, BackendError>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| BackendError::Config(format!("Client build failed: {}", e)))
}

/// Plain GET of a public URL
pub async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, BackendError> {
    let response = client.get(url).send().await?;
    let response = ensure_success(response).await?;
    Ok(response.bytes().await?.to_vec())
}

pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body: truncate(&body, 200),
    })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Unique object name for one upload attempt
pub(crate) fn object_name(owner_entity_id: &str, category: PhotoCategory) -> String {
    let owner: String = owner_entity_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}_{}", owner, category.as_str(), uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_names_are_unique_per_attempt() {
        let a = object_name("client-42", PhotoCategory::WeightCheck);
        let b = object_name("client-42", PhotoCategory::WeightCheck);
        assert_ne!(a, b);
        assert!(a.starts_with("client-42_weight-check_"));
    }

    #[test]
    fn test_object_name_sanitizes_owner() {
        let name = object_name("a/b c", PhotoCategory::Profile);
        assert!(name.starts_with("a_b_c_profile_"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 3), "abc...");
    }
}
