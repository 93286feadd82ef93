use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::handlers::ApiResponse;
use crate::error::{ExtractError, GalleryError};

/// Request failures, each mapped to a status code and an error envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("No face detected in the image")]
    NoFacesDetected,

    #[error("More than one face detected; register one person at a time")]
    MultipleFacesDetected,

    #[error("No faces have been registered yet")]
    EmptyGallery,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)
            | ApiError::NoFacesDetected
            | ApiError::MultipleFacesDetected => StatusCode::BAD_REQUEST,
            ApiError::EmptyGallery => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GalleryError> for ApiError {
    fn from(err: GalleryError) -> Self {
        match err {
            GalleryError::Validation(msg) => ApiError::BadRequest(msg),
            GalleryError::NotFound(name) => ApiError::NotFound(format!("No person named {} was found", name)),
            GalleryError::Persistence(e) => ApiError::Internal(format!("Failed to save face data: {}", e)),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::InvalidEncoding(_) | ExtractError::InvalidImage(_) => {
                ApiError::BadRequest(format!("Failed to process image: {}", err))
            }
            ExtractError::Encoder(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}
