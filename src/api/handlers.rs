use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::ApiError;
use super::metrics;
use crate::archive::PhotoArchive;
use crate::extractor::{extract_faces, FaceEncoder};
use crate::gallery::GalleryStore;
use crate::matcher::{self, MatchPolicy};
use crate::models::{IdentitySummary, MatchOutcome};

pub struct AppState {
    pub gallery: Arc<GalleryStore>,
    pub encoder: Arc<dyn FaceEncoder>,
    pub archive: Option<Arc<PhotoArchive>>,
    pub policy: MatchPolicy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub name: String,
    pub photo_count: usize,
    pub total_identities: usize,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub name: String,
    pub confidence: f64,
    pub recognized: bool,
    pub faces_detected: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredFaces {
    pub faces: Vec<String>,
    pub faces_detail: Vec<FaceDetail>,
    pub total: usize,
    pub total_photos: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaceDetail {
    pub name: String,
    pub photo_count: usize,
}

impl From<IdentitySummary> for FaceDetail {
    fn from(summary: IdentitySummary) -> Self {
        Self {
            name: summary.name,
            photo_count: summary.photo_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub name: String,
    pub removed_photos: usize,
    pub remaining_people: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub removed_identities: usize,
    pub removed_photos: usize,
}

pub async fn register_face(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<RegisterResponse>>, ApiError> {
    let result = register(&state, req).await;
    metrics::record_registration(result.is_ok());
    result.map(|r| Json(ApiResponse::success(r)))
}

async fn register(state: &AppState, req: RegisterRequest) -> Result<RegisterResponse, ApiError> {
    let (Some(name), Some(image)) = (req.name, req.image) else {
        return Err(ApiError::BadRequest(
            "Incomplete data: name and image are required".to_string(),
        ));
    };
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name must not be empty".to_string()));
    }

    let (photo, mut faces) = extract_faces(state.encoder.clone(), image).await?;
    let face = match faces.len() {
        0 => return Err(ApiError::NoFacesDetected),
        1 => faces.remove(0),
        _ => return Err(ApiError::MultipleFacesDetected),
    };

    let registration = state.gallery.register(&name, face.signature).await?;
    metrics::record_gallery_size(state.gallery.stats());

    if let Some(archive) = &state.archive {
        if let Err(e) = archive
            .store(&registration.name, registration.photo_count, photo)
            .await
        {
            warn!("Failed to archive photo for {}: {}", registration.name, e);
        }
    }

    Ok(RegisterResponse {
        message: format!(
            "Face for {} registered (total: {} photos)",
            registration.name, registration.photo_count
        ),
        name: registration.name,
        photo_count: registration.photo_count,
        total_identities: registration.total_identities,
    })
}

pub async fn validate_face(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ApiResponse<ValidateResponse>>, ApiError> {
    let result = validate(&state, req).await;
    let outcome = match &result {
        Ok(r) if r.recognized => "recognized",
        Ok(_) => "unknown",
        Err(ApiError::EmptyGallery) => "empty_gallery",
        Err(ApiError::NoFacesDetected) => "no_face",
        Err(_) => "error",
    };
    metrics::record_validation(outcome);
    result.map(|r| Json(ApiResponse::success(r)))
}

async fn validate(state: &AppState, req: ValidateRequest) -> Result<ValidateResponse, ApiError> {
    let Some(image) = req.image else {
        return Err(ApiError::BadRequest("Image data is missing".to_string()));
    };

    let (_, faces) = extract_faces(state.encoder.clone(), image).await?;
    if faces.is_empty() {
        return Err(ApiError::NoFacesDetected);
    }

    let gallery = state.gallery.snapshot();
    let mut results = Vec::with_capacity(faces.len());
    for face in &faces {
        match matcher::classify(&gallery, &face.signature, &state.policy) {
            MatchOutcome::EmptyGallery => return Err(ApiError::EmptyGallery),
            MatchOutcome::Decided(result) => results.push(result),
        }
    }

    let best = matcher::best_of(results);
    let message = if best.recognized {
        info!("Face recognized as {} ({:.2}%)", best.identity, best.confidence);
        format!("Face recognized as {}", best.identity)
    } else {
        "Face not recognized".to_string()
    };

    Ok(ValidateResponse {
        name: best.identity,
        confidence: best.confidence,
        recognized: best.recognized,
        faces_detected: faces.len(),
        message,
    })
}

pub async fn get_registered_faces(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<RegisteredFaces>> {
    let summaries = state.gallery.list();
    let total_photos = summaries.iter().map(|s| s.photo_count).sum();
    let faces_detail: Vec<FaceDetail> = summaries.into_iter().map(FaceDetail::from).collect();

    Json(ApiResponse::success(RegisteredFaces {
        faces: faces_detail.iter().map(|f| f.name.clone()).collect(),
        total: faces_detail.len(),
        total_photos,
        faces_detail,
    }))
}

pub async fn delete_person(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    let deletion = state.gallery.delete(&name).await?;
    metrics::record_gallery_size(state.gallery.stats());

    if let Some(archive) = &state.archive {
        if let Err(e) = archive.remove_identity(&deletion.name).await {
            warn!("Failed to remove archived photos for {}: {}", deletion.name, e);
        }
    }

    Ok(Json(ApiResponse::success(DeleteResponse {
        name: deletion.name,
        removed_photos: deletion.removed_signatures,
        remaining_people: deletion.remaining_identities,
    })))
}

pub async fn reset_all_data(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ResetResponse>>, ApiError> {
    let summary = state.gallery.reset().await?;
    metrics::record_gallery_size(state.gallery.stats());

    if let Some(archive) = &state.archive {
        if let Err(e) = archive.clear().await {
            warn!("Failed to clear photo archive: {}", e);
        }
    }

    Ok(Json(ApiResponse::success(ResetResponse {
        removed_identities: summary.identities,
        removed_photos: summary.signatures,
    })))
}

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "facegate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
