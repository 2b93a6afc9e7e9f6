//! Cloudinary unsigned uploads
//!
//! The image travels inside a JSON envelope as a base64 data URI. The
//! object's delete token carries its public id and, while it is fresh, the
//! short-lived Cloudinary delete token. With API credentials configured,
//! deletes use the signed destroy endpoint and work at any time.

use super::{ensure_success, fetch_url, http_client, object_name, BackendAdapter, BackendError};
use crate::models::{PhotoCategory, RemoteObject};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Cloudinary rejects delete tokens older than ten minutes
const DELETE_TOKEN_LIFETIME_SECS: i64 = 10 * 60;

#[derive(Debug, Serialize)]
struct UploadEnvelope<'a> {
    file: String,
    upload_preset: &'a str,
    public_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder: Option<&'a str>,
    return_delete_token: bool,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: Option<String>,
    secure_url: Option<String>,
    url: Option<String>,
    delete_token: Option<String>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    result: Option<String>,
}

/// Everything needed to remove one object, stored as its delete token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DeleteHandle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    /// Unix seconds the token was issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issued_at: Option<i64>,
}

impl DeleteHandle {
    fn encode(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// A bare string is a token of unknown age
    fn decode(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| DeleteHandle {
            public_id: None,
            token: Some(raw.to_string()),
            issued_at: None,
        })
    }

    fn fresh_token(&self, now: i64) -> Option<&str> {
        let fresh = self
            .issued_at
            .map_or(true, |issued| now - issued < DELETE_TOKEN_LIFETIME_SECS);
        self.token.as_deref().filter(|_| fresh)
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    api_key: String,
    api_secret: String,
}

pub struct CloudinaryBackend {
    name: String,
    client: reqwest::Client,
    cloud_name: String,
    upload_preset: String,
    folder: Option<String>,
    api_base: String,
    credentials: Option<Credentials>,
}

impl CloudinaryBackend {
    pub fn new(
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let cloud_name = cloud_name.into();
        let upload_preset = upload_preset.into();
        if cloud_name.trim().is_empty() || upload_preset.trim().is_empty() {
            return Err(BackendError::Config(
                "Cloudinary needs cloud_name and upload_preset".to_string(),
            ));
        }
        Ok(Self {
            name: "cloudinary".to_string(),
            client: http_client(timeout)?,
            cloud_name,
            upload_preset,
            folder: None,
            api_base: DEFAULT_API_BASE.to_string(),
            credentials: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Enable signed deletes by public id
    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        });
        self
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/{}",
            self.api_base.trim_end_matches('/'),
            self.cloud_name,
            action
        )
    }

    /// Public id Cloudinary assigns when `public_id` is requested
    fn full_public_id(&self, public_id: &str) -> String {
        match self.folder.as_deref().map(|f| f.trim_matches('/')) {
            Some(folder) if !folder.is_empty() => format!("{}/{}", folder, public_id),
            _ => public_id.to_string(),
        }
    }

    async fn destroy(
        &self,
        public_id: &str,
        credentials: &Credentials,
    ) -> Result<bool, BackendError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(
            &[("public_id", public_id), ("timestamp", timestamp.as_str())],
            &credentials.api_secret,
        );

        let response = self
            .client
            .post(self.endpoint("image/destroy"))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", credentials.api_key.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;
        let parsed: DeleteResponse = ensure_success(response).await?.json().await?;
        delete_result(parsed)
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool, BackendError> {
        let response = self
            .client
            .post(self.endpoint("delete_by_token"))
            .form(&[("token", token)])
            .send()
            .await?;
        let parsed: DeleteResponse = ensure_success(response).await?.json().await?;
        delete_result(parsed)
    }
}

/// Cloudinary request signature: sorted `key=value` pairs joined by `&`,
/// followed by the secret, SHA-1 hex encoded
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    format!("{:x}", Sha1::digest(format!("{}{}", joined, api_secret).as_bytes()))
}

fn delete_result(parsed: DeleteResponse) -> Result<bool, BackendError> {
    match parsed.result.as_deref() {
        Some("ok") => Ok(true),
        Some("not found") => Ok(false),
        other => Err(BackendError::Response(format!(
            "delete not accepted: {}",
            other.unwrap_or("no result")
        ))),
    }
}

fn parse_upload_response(
    body: &str,
    backend: &str,
    requested_public_id: &str,
    issued_at: i64,
) -> Result<RemoteObject, BackendError> {
    let parsed: UploadResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Response(format!("Failed to parse response: {}", e)))?;

    if let Some(error) = parsed.error {
        return Err(BackendError::Response(error.message));
    }

    let url = parsed
        .secure_url
        .or(parsed.url)
        .ok_or_else(|| BackendError::Response("response carries no url".to_string()))?;

    let handle = DeleteHandle {
        public_id: Some(
            parsed
                .public_id
                .unwrap_or_else(|| requested_public_id.to_string()),
        ),
        issued_at: parsed.delete_token.as_ref().map(|_| issued_at),
        token: parsed.delete_token,
    };

    Ok(RemoteObject {
        url,
        backend: backend.to_string(),
        delete_token: handle.encode(),
    })
}

#[async_trait]
impl BackendAdapter for CloudinaryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(
        &self,
        bytes: &[u8],
        owner_entity_id: &str,
        category: PhotoCategory,
    ) -> Result<RemoteObject, BackendError> {
        let data_uri = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );
        let public_id = object_name(owner_entity_id, category);
        let envelope = UploadEnvelope {
            file: data_uri,
            upload_preset: &self.upload_preset,
            public_id: &public_id,
            folder: self.folder.as_deref(),
            return_delete_token: true,
        };

        let issued_at = Utc::now().timestamp();
        let response = self
            .client
            .post(self.endpoint("image/upload"))
            .json(&envelope)
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;
        parse_upload_response(
            &body,
            &self.name,
            &self.full_public_id(&public_id),
            issued_at,
        )
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        fetch_url(&self.client, url).await
    }

    async fn delete(&self, url: &str, delete_token: Option<&str>) -> Result<bool, BackendError> {
        let Some(raw) = delete_token else {
            log::debug!("No delete handle for {}, skipping", url);
            return Ok(false);
        };
        let handle = DeleteHandle::decode(raw);

        if let (Some(credentials), Some(public_id)) = (&self.credentials, &handle.public_id) {
            return self.destroy(public_id, credentials).await;
        }

        match handle.fresh_token(Utc::now().timestamp()) {
            Some(token) => self.delete_by_token(token).await,
            None => {
                log::info!(
                    "Delete token for {} expired and no API credentials are configured",
                    url
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUED: i64 = 1_700_000_000;

    fn backend() -> CloudinaryBackend {
        CloudinaryBackend::new("demo", "preset", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_success_keeps_public_id_and_token() {
        let body = r#"{
            "public_id": "coach/client-42_progress_abc",
            "url": "http://res.cloudinary.com/demo/image/upload/v1/x.jpg",
            "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/x.jpg",
            "delete_token": "tok123"
        }"#;
        let remote = parse_upload_response(body, "cloudinary", "ignored", ISSUED).unwrap();
        assert_eq!(
            remote.url,
            "https://res.cloudinary.com/demo/image/upload/v1/x.jpg"
        );

        let handle = DeleteHandle::decode(remote.delete_token.as_deref().unwrap());
        assert_eq!(handle.public_id.as_deref(), Some("coach/client-42_progress_abc"));
        assert_eq!(handle.token.as_deref(), Some("tok123"));
        assert_eq!(handle.issued_at, Some(ISSUED));
    }

    #[test]
    fn test_parse_falls_back_to_requested_public_id() {
        let body = r#"{"secure_url": "https://res.cloudinary.com/demo/x.jpg"}"#;
        let remote = parse_upload_response(body, "cdn", "coach/x", ISSUED).unwrap();
        assert_eq!(remote.backend, "cdn");

        let handle = DeleteHandle::decode(remote.delete_token.as_deref().unwrap());
        assert_eq!(handle.public_id.as_deref(), Some("coach/x"));
        assert!(handle.token.is_none());
        assert!(handle.issued_at.is_none());
    }

    #[test]
    fn test_parse_error() {
        let body = r#"{"error":{"message":"Upload preset not found"}}"#;
        let err = parse_upload_response(body, "cloudinary", "x", ISSUED).unwrap_err();
        assert!(err.to_string().contains("Upload preset not found"));
    }

    #[test]
    fn test_delete_token_expires() {
        let handle = DeleteHandle {
            public_id: Some("x".into()),
            token: Some("tok".into()),
            issued_at: Some(ISSUED),
        };
        assert_eq!(handle.fresh_token(ISSUED + 60), Some("tok"));
        assert_eq!(handle.fresh_token(ISSUED + DELETE_TOKEN_LIFETIME_SECS), None);
        assert_eq!(handle.fresh_token(ISSUED + 3600), None);

        // Bare tokens have no known age and are always tried
        let bare = DeleteHandle::decode("tok");
        assert!(bare.public_id.is_none());
        assert_eq!(bare.fresh_token(ISSUED + 3600), Some("tok"));
    }

    #[test]
    fn test_signature() {
        let signature = sign(
            &[
                ("timestamp", "1315060510"),
                ("public_id", "coach/client-42_progress_abc"),
            ],
            "abcd",
        );
        assert_eq!(signature, "675973d84cb7d41f830b8340624640cef95b884f");
    }

    #[test]
    fn test_delete_result() {
        let ok = DeleteResponse {
            result: Some("ok".into()),
        };
        let gone = DeleteResponse {
            result: Some("not found".into()),
        };
        assert!(delete_result(ok).unwrap());
        assert!(!delete_result(gone).unwrap());
        assert!(delete_result(DeleteResponse { result: None }).is_err());
    }

    #[test]
    fn test_endpoint_and_public_id() {
        let backend = backend()
            .with_api_base("https://api.example.test/v1_1/")
            .with_folder("/coach/");
        assert_eq!(
            backend.endpoint("image/destroy"),
            "https://api.example.test/v1_1/demo/image/destroy"
        );
        assert_eq!(backend.full_public_id("x"), "coach/x");
        assert_eq!(self::backend().full_public_id("x"), "x");
    }

    #[tokio::test]
    async fn test_expired_token_without_credentials_is_kept() {
        let handle = DeleteHandle {
            public_id: Some("coach/x".into()),
            token: Some("tok".into()),
            issued_at: Some(Utc::now().timestamp() - 3600),
        };
        let raw = handle.encode().unwrap();
        assert!(!backend().delete("https://x", Some(&raw)).await.unwrap());
        assert!(!backend().delete("https://x", None).await.unwrap());
    }
}
