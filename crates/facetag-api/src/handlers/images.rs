//! Image-serving endpoint.
//!
//! `GET /?face=<FaceID>` serves a face crop, `GET /?image=<ObjectId>` a
//! source image. The detection provider and the chat client fetch images
//! through here. Anything that cannot be served is a bare 404.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use facetag_models::ObjectId;
use facetag_pipeline::PipelineResult;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub face: Option<String>,
    pub image: Option<String>,
}

/// Serve a face crop or a source image; `face` takes precedence.
pub async fn serve_image(State(state): State<AppState>, Query(query): Query<ImageQuery>) -> Response {
    let face = query.face.filter(|s| !s.is_empty());
    let image = query.image.filter(|s| !s.is_empty());

    let (kind, name, result): (&str, String, PipelineResult<Option<Vec<u8>>>) = match (face, image) {
        (Some(face), _) => {
            let result = state.store.read_face(&face).await;
            ("face", face, result)
        }
        (None, Some(image)) => {
            let result = state.store.read_image(&ObjectId::new(image.clone())).await;
            ("image", image, result)
        }
        (None, None) => return StatusCode::NOT_FOUND.into_response(),
    };

    match result {
        Ok(Some(bytes)) => {
            debug!(kind, name = %name, bytes = bytes.len(), "Serving image");
            ([(header::CONTENT_TYPE, "image/jpeg")], Body::from(bytes)).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(kind, name = %name, error = %e, "Failed to read image");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use tower::ServiceExt;

    use facetag_models::FaceId;
    use facetag_pipeline::ArtifactStore;

    use crate::test_support::{body_bytes, TestApp};

    use super::*;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_serves_face_with_or_without_extension() {
        let app = TestApp::new();
        let face_id = FaceId::from_string("f1");
        app.store.write_face(&face_id, b"jpeg-bytes".to_vec()).await.unwrap();

        for uri in ["/?face=f1", "/?face=f1.jpg"] {
            let response = app.router().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
            assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
            assert_eq!(body_bytes(response).await, b"jpeg-bytes".to_vec());
        }
    }

    #[tokio::test]
    async fn test_serves_source_image_and_face_takes_precedence() {
        let app = TestApp::new();
        app.store.put_image("img 1.png", b"image-bytes".to_vec()).await;
        app.store
            .write_face(&FaceId::from_string("f1"), b"face-bytes".to_vec())
            .await
            .unwrap();

        let response = app.router().oneshot(get("/?image=img%201.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"image-bytes".to_vec());

        let response = app
            .router()
            .oneshot(get("/?face=f1&image=img%201.png"))
            .await
            .unwrap();
        assert_eq!(body_bytes(response).await, b"face-bytes".to_vec());
    }

    #[tokio::test]
    async fn test_missing_parameter_object_or_read_failure_is_404() {
        let app = TestApp::new();
        app.store.put_image("img1", b"image-bytes".to_vec()).await;

        for uri in ["/", "/?face=", "/?image=nope", "/?face=nope"] {
            let response = app.router().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        app.store.set_fail_reads(true);
        let response = app.router().oneshot(get("/?image=img1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
