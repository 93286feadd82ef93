pub mod error;
pub mod handlers;
pub mod metrics;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use handlers::AppState;
use metrics::MetricsMiddleware;

/// Camera snapshots arrive as base64 JSON, well above axum's 2 MB default.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn create_app(state: AppState, static_dir: &Path) -> Router {
    let state = Arc::new(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/register_face", post(handlers::register_face))
        .route("/api/validate_face", post(handlers::validate_face))
        .route("/api/get_registered_faces", get(handlers::get_registered_faces))
        .route("/api/delete_person/:name", delete(handlers::delete_person))
        .route(
            "/api/reset_all_data",
            get(handlers::reset_all_data).post(handlers::reset_all_data),
        )
        .route("/metrics", get(metrics::metrics_handler))
        .fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(MetricsMiddleware::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::extractor::FaceEncoder;
    use crate::gallery::{GalleryFile, GalleryStore};
    use crate::matcher::MatchPolicy;
    use crate::models::{BoundingBox, DetectedFace, Signature};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::{json, Value};
    use std::io::Cursor;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    /// Reads one face per distinct pixel colour in the top row; the red
    /// channel becomes the signature.
    struct ColorEncoder;

    impl FaceEncoder for ColorEncoder {
        fn encode(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractError> {
            let rgb = image.to_rgb8();
            let mut faces: Vec<DetectedFace> = Vec::new();
            for x in 0..rgb.width() {
                let px = rgb.get_pixel(x, 0);
                if px[1] == 255 {
                    continue;
                }
                let value = px[0] as f64 / 255.0;
                if faces.iter().any(|f| f.signature.values()[0] == value) {
                    continue;
                }
                faces.push(DetectedFace {
                    bbox: BoundingBox { x, y: 0, width: 1, height: 1 },
                    signature: Signature::new(vec![value, 0.0]),
                });
            }
            Ok(faces)
        }
    }

    /// PNG whose top row holds one "face" per red value; green 255 marks empty.
    fn payload(reds: &[u8]) -> String {
        let width = reds.len().max(1) as u32;
        let mut image = RgbImage::from_pixel(width, 1, Rgb([0, 255, 0]));
        for (x, red) in reds.iter().enumerate() {
            image.put_pixel(x as u32, 0, Rgb([*red, 0, 0]));
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    async fn app() -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        let gallery = GalleryStore::open(GalleryFile::new(dir.path().join("gallery.json")), 10).await;
        let state = AppState {
            gallery: Arc::new(gallery),
            encoder: Arc::new(ColorEncoder),
            archive: None,
            policy: MatchPolicy::default(),
        };
        let router = create_app(state, &dir.path().join("static"));
        (dir, router)
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, router) = app().await;
        let (status, body) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "facegate");
    }

    #[tokio::test]
    async fn test_register_then_recognize() {
        let (_dir, router) = app().await;

        let (status, body) = send(
            &router,
            "POST",
            "/api/register_face",
            Some(json!({ "name": " Alice ", "image": payload(&[51]) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Alice");
        assert_eq!(body["data"]["photo_count"], 1);

        let (status, body) = send(
            &router,
            "POST",
            "/api/validate_face",
            Some(json!({ "image": payload(&[51]) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["recognized"], true);
        assert_eq!(body["data"]["name"], "Alice");
        assert_eq!(body["data"]["confidence"], 100.0);
    }

    #[tokio::test]
    async fn test_validate_against_empty_gallery_is_distinct() {
        let (_dir, router) = app().await;
        let (status, body) = send(
            &router,
            "POST",
            "/api/validate_face",
            Some(json!({ "image": payload(&[10]) })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unrecognized_face_is_not_an_error() {
        let (_dir, router) = app().await;
        send(&router, "POST", "/api/register_face", Some(json!({ "name": "Bob", "image": payload(&[0]) }))).await;

        // Red 255 maps to distance 1.0 from Bob's 0.0.
        let (status, body) = send(
            &router,
            "POST",
            "/api/validate_face",
            Some(json!({ "image": payload(&[255]) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["recognized"], false);
        assert_eq!(body["data"]["name"], "Unknown");
        assert_eq!(body["data"]["confidence"], 0.0);
    }

    #[tokio::test]
    async fn test_validate_picks_best_of_several_faces() {
        let (_dir, router) = app().await;
        send(&router, "POST", "/api/register_face", Some(json!({ "name": "Cara", "image": payload(&[0]) }))).await;

        let (status, body) = send(
            &router,
            "POST",
            "/api/validate_face",
            Some(json!({ "image": payload(&[255, 0]) })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["faces_detected"], 2);
        assert_eq!(body["data"]["name"], "Cara");
        assert_eq!(body["data"]["confidence"], 100.0);
    }

    #[tokio::test]
    async fn test_register_rejections() {
        let (_dir, router) = app().await;

        let (status, _) = send(&router, "POST", "/api/register_face", Some(json!({ "image": payload(&[1]) }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            "POST",
            "/api/register_face",
            Some(json!({ "name": "   ", "image": payload(&[1]) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &router,
            "POST",
            "/api/register_face",
            Some(json!({ "name": "Dan", "image": payload(&[]) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No face detected in the image");

        let (status, _) = send(
            &router,
            "POST",
            "/api/register_face",
            Some(json!({ "name": "Dan", "image": payload(&[1, 2]) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            "POST",
            "/api/register_face",
            Some(json!({ "name": "Dan", "image": "not an image" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&router, "GET", "/api/get_registered_faces", None).await;
        assert_eq!(body["data"]["total"], 0);
    }

    #[tokio::test]
    async fn test_list_delete_and_reset() {
        let (_dir, router) = app().await;
        for (name, red) in [("Eve", 10u8), ("Eve", 20), ("Finn", 30)] {
            send(&router, "POST", "/api/register_face", Some(json!({ "name": name, "image": payload(&[red]) }))).await;
        }

        let (_, body) = send(&router, "GET", "/api/get_registered_faces", None).await;
        assert_eq!(body["data"]["faces"], json!(["Eve", "Finn"]));
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["total_photos"], 3);

        let (status, _) = send(&router, "DELETE", "/api/delete_person/Nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&router, "DELETE", "/api/delete_person/Eve", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["removed_photos"], 2);
        assert_eq!(body["data"]["remaining_people"], 1);

        let (status, body) = send(&router, "GET", "/api/reset_all_data", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["removed_identities"], 1);
        assert_eq!(body["data"]["removed_photos"], 1);

        let (_, body) = send(&router, "POST", "/api/reset_all_data", None).await;
        assert_eq!(body["data"]["removed_identities"], 0);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (_dir, router) = app().await;
        send(&router, "GET", "/health", None).await;
        send(&router, "POST", "/api/register_face", Some(json!({ "name": "Gia", "image": payload(&[5]) }))).await;

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("http_requests_total"));
        assert!(text.contains("gallery_identities"));
        assert!(text.contains("face_registrations_total"));
    }
}
