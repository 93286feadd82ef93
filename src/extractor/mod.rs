//! Turning browser image payloads into face signatures.

pub mod haar;

use base64::Engine;
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

use crate::error::ExtractError;
use crate::models::DetectedFace;

pub use haar::HaarEncoder;

/// Finds faces in an image and produces one signature per face.
pub trait FaceEncoder: Send + Sync {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractError>;
}

/// Decodes a base64 image, with or without a `data:image/...;base64,` prefix.
pub fn decode_image(payload: &str) -> Result<DynamicImage, ExtractError> {
    let encoded = match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    };
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    let image = image::load_from_memory(&bytes)?;
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

/// Decodes `payload` and runs `encoder` on a blocking thread.
///
/// Returns the decoded image alongside the faces so callers can archive it.
pub async fn extract_faces(
    encoder: Arc<dyn FaceEncoder>,
    payload: String,
) -> Result<(DynamicImage, Vec<DetectedFace>), ExtractError> {
    tokio::task::spawn_blocking(move || -> Result<_, ExtractError> {
        let image = decode_image(&payload)?;
        let faces = encoder.encode(&image)?;
        debug!(
            "Extracted {} faces from {}x{} image",
            faces.len(),
            image.width(),
            image.height()
        );
        Ok((image, faces))
    })
    .await
    .map_err(|e| ExtractError::Encoder(format!("extraction task failed: {}", e)))?
}
