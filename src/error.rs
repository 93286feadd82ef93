use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid gallery file: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unsupported gallery file version: {0}")]
    UnsupportedVersion(u32),

    #[error("Background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("{0}")]
    Validation(String),

    #[error("Identity not found: {0}")]
    NotFound(String),

    #[error("Failed to persist gallery: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Image payload is not valid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Could not decode image: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("Face encoder failed: {0}")]
    Encoder(String),
}
