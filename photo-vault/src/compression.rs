use crate::config::CompressionProfile;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, GenericImageView};
use std::io::Cursor;
use std::sync::Arc;

/// Error type for compression operations
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("Image decode error: {0}")]
    Decode(String),
    #[error("Image encode error: {0}")]
    Encode(String),
    #[error("Compression task failed: {0}")]
    Task(String),
}

/// Output of the compression stage
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    /// True when compression failed and the original bytes were kept
    pub fallback: bool,
    /// Encoded dimensions, unknown on fallback
    pub dimensions: Option<(u32, u32)>,
}

/// Scale `(width, height)` down to fit inside the bounds, keeping aspect ratio.
/// Never upscales.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if max_width == 0 || max_height == 0 {
        return (width, height);
    }
    let ratio = (width as f32 / max_width as f32).max(height as f32 / max_height as f32);

    if ratio > 1.0 {
        let new_width = ((width as f32 / ratio).round() as u32).clamp(1, max_width);
        let new_height = ((height as f32 / ratio).round() as u32).clamp(1, max_height);
        (new_width, new_height)
    } else {
        (width, height)
    }
}

/// Decode, downscale and re-encode as JPEG with the profile's quality
pub fn encode_with_profile(
    raw: &[u8],
    profile: &CompressionProfile,
) -> Result<(Vec<u8>, (u32, u32)), CompressionError> {
    let img = image::load_from_memory(raw)
        .map_err(|e| CompressionError::Decode(format!("Failed to load image: {}", e)))?;

    let (width, height) = img.dimensions();
    let (target_w, target_h) = fit_within(width, height, profile.max_width, profile.max_height);

    let resized = if (target_w, target_h) != (width, height) {
        img.resize_exact(target_w, target_h, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = resized.to_rgb8();

    let mut buffer = Cursor::new(Vec::new());
    let quality = profile.quality.clamp(1, 100);
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|e| CompressionError::Encode(format!("Failed to write jpeg: {}", e)))?;

    Ok((buffer.into_inner(), (target_w, target_h)))
}

/// Compress raw image bytes on the blocking pool.
///
/// Never fails: any error keeps the original bytes so capture is not blocked.
pub async fn compress(raw: Vec<u8>, profile: CompressionProfile) -> CompressedImage {
    let raw = Arc::new(raw);
    let input = Arc::clone(&raw);

    let result = tokio::task::spawn_blocking(move || encode_with_profile(&input, &profile))
        .await
        .map_err(|e| CompressionError::Task(format!("Task join error: {}", e)))
        .and_then(|r| r);

    match result {
        Ok((bytes, dimensions)) => {
            log::debug!(
                "Compressed {} -> {} bytes ({}x{}, q{})",
                raw.len(),
                bytes.len(),
                dimensions.0,
                dimensions.1,
                profile.quality
            );
            CompressedImage {
                bytes,
                fallback: false,
                dimensions: Some(dimensions),
            }
        }
        Err(e) => {
            log::warn!("Compression failed, keeping original bytes: {}", e);
            let bytes = Arc::try_unwrap(raw).unwrap_or_else(|shared| shared.as_ref().clone());
            CompressedImage {
                bytes,
                fallback: true,
                dimensions: None,
            }
        }
    }
}
