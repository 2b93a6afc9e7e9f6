//! WebDAV image storage, typically a Nextcloud instance
//!
//! Objects live under `{remote_path}/photos/{owner}/` and the returned
//! URL is the full DAV URL of the file.

use super::{object_name, BackendAdapter, BackendError};
use crate::models::{PhotoCategory, RemoteObject};
use async_trait::async_trait;

pub struct WebDavBackend {
    name: String,
    client: reqwest_dav::Client,
    host: String,
    remote_path: String,
}

impl WebDavBackend {
    pub fn new(
        server_url: &str,
        username: &str,
        app_password: &str,
        remote_path: &str,
    ) -> Result<Self, BackendError> {
        if server_url.trim().is_empty() || username.trim().is_empty() {
            return Err(BackendError::Config(
                "WebDAV needs server_url and username".to_string(),
            ));
        }

        let host = format!(
            "{}/remote.php/dav/files/{}",
            server_url.trim_end_matches('/'),
            username
        );

        let client = reqwest_dav::ClientBuilder::new()
            .set_host(host.clone())
            .set_auth(reqwest_dav::Auth::Basic(
                username.to_string(),
                app_password.to_string(),
            ))
            .build()
            .map_err(|e| BackendError::Config(format!("WebDAV client error: {:?}", e)))?;

        Ok(Self {
            name: "webdav".to_string(),
            client,
            host,
            remote_path: remote_path.trim_matches('/').to_string(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn photos_dir(&self, owner_entity_id: &str) -> String {
        let owner: String = owner_entity_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        if self.remote_path.is_empty() {
            format!("photos/{}", owner)
        } else {
            format!("{}/photos/{}", self.remote_path, owner)
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.host, path)
    }

    /// Map a URL produced by this backend back to its DAV path
    fn path_for(&self, url: &str) -> Result<String, BackendError> {
        url.strip_prefix(&self.host)
            .map(|p| p.trim_start_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| BackendError::Config(format!("{} is not on {}", url, self.host)))
    }

    /// Create each level of `path` (ignore errors as it might already exist)
    async fn ensure_directory(&self, path: &str) {
        let mut current_path = String::new();

        for part in path.trim_matches('/').split('/') {
            if current_path.is_empty() {
                current_path = part.to_string();
            } else {
                current_path = format!("{}/{}", current_path, part);
            }

            if let Err(e) = self.client.mkcol(&current_path).await {
                log::debug!("MKCOL '{}' note: {:?}", current_path, e);
            }
        }
    }
}

#[async_trait]
impl BackendAdapter for WebDavBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(
        &self,
        bytes: &[u8],
        owner_entity_id: &str,
        category: PhotoCategory,
    ) -> Result<RemoteObject, BackendError> {
        let dir = self.photos_dir(owner_entity_id);
        self.ensure_directory(&dir).await;

        let path = format!("{}/{}.jpg", dir, object_name(owner_entity_id, category));

        if let Err(e) = self.client.put(&path, bytes.to_vec()).await {
            // A failed PUT may leave a truncated file behind
            if let Err(cleanup) = self.client.delete(&path).await {
                log::debug!("Cleanup of {} after failed PUT: {:?}", path, cleanup);
            }
            return Err(BackendError::Request(format!("Upload failed: {:?}", e)));
        }

        log::info!("Uploaded photo to {}", path);
        Ok(RemoteObject {
            url: self.url_for(&path),
            backend: self.name().to_string(),
            delete_token: None,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        let path = self.path_for(url)?;
        let response = self
            .client
            .get(&path)
            .await
            .map_err(|e| BackendError::Request(format!("Download failed: {:?}", e)))?;
        let bytes = response.bytes().await.map_err(|e| {
            BackendError::Response(format!("Failed to read response bytes: {}", e))
        })?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, url: &str, _delete_token: Option<&str>) -> Result<bool, BackendError> {
        let path = self.path_for(url)?;
        self.client
            .delete(&path)
            .await
            .map_err(|e| BackendError::Request(format!("Delete failed: {:?}", e)))?;
        log::info!("Deleted remote photo {}", path);
        Ok(true)
    }
}
