use crate::error::AppError;
use crate::services::client_service::get_client;
use chrono::NaiveDate;
use photo_vault::{PhotoCategory, PhotoListing, PhotoVault, UploadRequest};
use rusqlite::Connection;
use std::path::Path;

/// Store an image file as a photo of an existing client
pub async fn add_client_photo(
    conn: &Connection,
    vault: &PhotoVault,
    client_uuid: &str,
    source: &Path,
    category: PhotoCategory,
    notes: Option<String>,
    capture_date: Option<NaiveDate>,
) -> Result<String, AppError> {
    let client = get_client(conn, client_uuid)?;

    let bytes = tokio::fs::read(source).await?;
    if bytes.is_empty() {
        return Err(AppError::Validation(format!(
            "{} is empty",
            source.display()
        )));
    }
    log::debug!(
        "Adding {} photo for {} from {} ({} bytes)",
        category,
        client.name,
        source.display(),
        bytes.len()
    );

    let mut request = UploadRequest::new(bytes, client.uuid, category);
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        request = request.with_notes(notes);
    }
    if let Some(date) = capture_date {
        request = request.with_capture_date(date);
    }

    Ok(vault.upload_photo(request).await?)
}

/// Photos of a client, oldest first
pub async fn list_client_photos(
    conn: &Connection,
    vault: &PhotoVault,
    client_uuid: &str,
    category: Option<PhotoCategory>,
) -> Result<Vec<PhotoListing>, AppError> {
    let client = get_client(conn, client_uuid)?;
    Ok(vault.list_photos(&client.uuid, category).await?)
}

/// Write the best available copy of a photo to `target`
pub async fn export_photo(
    vault: &PhotoVault,
    identity: &str,
    target: &Path,
) -> Result<u64, AppError> {
    let bytes = vault
        .load_photo(identity)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Photo {}", identity)))?;

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, &bytes).await?;
    Ok(bytes.len() as u64)
}
