//! ImgBB image host
//!
//! Upload is a multipart form POST carrying the base64-encoded image.
//! The public API has no delete endpoint; `delete_url` is kept as the
//! delete token so a user can remove the image by hand.

use super::{ensure_success, fetch_url, http_client, object_name, BackendAdapter, BackendError};
use crate::models::{PhotoCategory, RemoteObject};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

#[derive(Debug, Deserialize)]
struct ImgbbResponse {
    #[serde(default)]
    success: bool,
    data: Option<ImgbbData>,
    error: Option<ImgbbErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ImgbbData {
    url: String,
    delete_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImgbbErrorBody {
    message: Option<String>,
}

pub struct ImgbbBackend {
    name: String,
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ImgbbBackend {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(BackendError::Config("ImgBB api_key is empty".to_string()));
        }
        Ok(Self {
            name: "imgbb".to_string(),
            client: http_client(timeout)?,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

fn parse_upload_response(body: &str, backend: &str) -> Result<RemoteObject, BackendError> {
    let parsed: ImgbbResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Response(format!("Failed to parse response: {}", e)))?;

    match parsed.data {
        Some(data) if parsed.success => Ok(RemoteObject {
            url: data.url,
            backend: backend.to_string(),
            delete_token: data.delete_url,
        }),
        _ => {
            let message = parsed
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "upload not accepted".to_string());
            Err(BackendError::Response(message))
        }
    }
}

#[async_trait]
impl BackendAdapter for ImgbbBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(
        &self,
        bytes: &[u8],
        owner_entity_id: &str,
        category: PhotoCategory,
    ) -> Result<RemoteObject, BackendError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let form = reqwest::multipart::Form::new()
            .text("key", self.api_key.clone())
            .text("name", object_name(owner_entity_id, category))
            .text("image", encoded);

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let body = ensure_success(response).await?.text().await?;
        parse_upload_response(&body, &self.name)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        fetch_url(&self.client, url).await
    }

    async fn delete(&self, url: &str, _delete_token: Option<&str>) -> Result<bool, BackendError> {
        log::debug!("ImgBB offers no delete API, leaving {}", url);
        Ok(false)
    }
}
