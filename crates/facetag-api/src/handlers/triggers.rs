//! Stage trigger endpoints.
//!
//! The object store posts upload notifications to `object-created`; the
//! queue trigger posts batches of crop-task messages to `crop-tasks`. A
//! non-2xx reply makes the event source redeliver the whole batch.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use facetag_models::{ObjectCreatedBatch, QueueTriggerBatch};
use facetag_pipeline::{CroppingSummary, DetectionSummary, TaskOutcome};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub images_processed: usize,
    pub images_skipped: usize,
    pub faces_enqueued: usize,
    pub boxes_rejected: usize,
}

impl From<DetectionSummary> for DetectionResponse {
    fn from(s: DetectionSummary) -> Self {
        Self {
            images_processed: s.images_processed,
            images_skipped: s.images_skipped,
            faces_enqueued: s.faces_enqueued,
            boxes_rejected: s.boxes_rejected,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CroppingResponse {
    pub persisted: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl From<CroppingSummary> for CroppingResponse {
    fn from(s: CroppingSummary) -> Self {
        Self {
            persisted: s.persisted,
            dropped: s.dropped,
            failed: s.failed,
        }
    }
}

/// Run detection over a batch of upload notifications.
pub async fn object_created_trigger(
    State(state): State<AppState>,
    Json(batch): Json<ObjectCreatedBatch>,
) -> ApiResult<Json<DetectionResponse>> {
    let summary = state.detection.handle_batch(&batch).await?;
    info!(
        images = summary.images_processed,
        skipped = summary.images_skipped,
        faces = summary.faces_enqueued,
        "Detection batch handled"
    );
    Ok(Json(summary.into()))
}

/// Run cropping over a batch of delivered crop tasks.
///
/// Any retryable failure fails the request so the batch is redelivered.
/// Tasks that already succeeded are processed again on redelivery.
pub async fn crop_tasks_trigger(
    State(state): State<AppState>,
    Json(batch): Json<QueueTriggerBatch>,
) -> ApiResult<Json<CroppingResponse>> {
    let messages = batch.into_messages();
    let reports = state.cropping.handle_messages(&messages).await;
    let summary = CroppingSummary::from_reports(&reports);

    if summary.failed > 0 {
        for report in &reports {
            if let TaskOutcome::Failed(e) = &report.outcome {
                warn!(message_id = %report.message_id, error = %e, "Crop task failed");
            }
        }
        return Err(ApiError::internal(format!(
            "{} of {} crop tasks failed",
            summary.failed,
            reports.len()
        )));
    }

    info!(
        persisted = summary.persisted,
        dropped = summary.dropped,
        "Crop batch handled"
    );
    Ok(Json(summary.into()))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use facetag_models::NormalizedBox;

    use crate::test_support::{json_body, png_image, TestApp};

    use super::*;

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn object_created(keys: &[&str]) -> Value {
        json!({
            "messages": keys.iter().map(|key| json!({
                "event_metadata": {"event_type": "ObjectCreate"},
                "details": {"bucket_id": "photos", "object_id": key}
            })).collect::<Vec<_>>()
        })
    }

    fn crop_batch(bodies: &[String]) -> Value {
        json!({
            "messages": bodies.iter().enumerate().map(|(i, body)| json!({
                "details": {"message": {"message_id": format!("m{}", i), "body": body}}
            })).collect::<Vec<_>>()
        })
    }

    #[tokio::test]
    async fn test_object_created_enqueues_tasks() {
        let app = TestApp::with_boxes(vec![NormalizedBox::new(0.0, 0.5, 0.0, 0.5)]);
        app.store.put_image("img1", png_image(200, 200)).await;

        let response = app
            .router()
            .oneshot(post_json(
                "/triggers/object-created",
                object_created(&["images/img1", "faces/f.jpg"]),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["images_processed"], 1);
        assert_eq!(body["images_skipped"], 1);
        assert_eq!(body["faces_enqueued"], 1);
        assert_eq!(app.queue.tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_object_created_provider_failure_is_bad_gateway() {
        let app = TestApp::with_boxes(vec![]);
        app.store.put_image("img1", png_image(20, 20)).await;
        app.detector.set_fail(true);

        let response = app
            .router()
            .oneshot(post_json("/triggers/object-created", object_created(&["images/img1"])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_object_created_store_outage_is_redelivered() {
        let app = TestApp::with_boxes(vec![NormalizedBox::new(0.0, 0.5, 0.0, 0.5)]);
        app.store.put_image("img1", png_image(200, 200)).await;
        app.store.set_fail_reads(true);

        let response = app
            .router()
            .oneshot(post_json("/triggers/object-created", object_created(&["images/img1"])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(app.queue.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_rejected() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(post_json("/triggers/object-created", json!({"messages": [{}]})))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_crop_tasks_persist_and_drop() {
        let app = TestApp::with_boxes(vec![NormalizedBox::new(0.0, 0.5, 0.0, 0.5)]);
        app.store.put_image("img1", png_image(200, 200)).await;
        app.router()
            .oneshot(post_json("/triggers/object-created", object_created(&["images/img1"])))
            .await
            .unwrap();

        let mut bodies: Vec<String> = app
            .queue
            .drain_messages()
            .await
            .into_iter()
            .map(|m| m.body)
            .collect();
        bodies.push("not json".to_string());

        let response = app
            .router()
            .oneshot(post_json("/triggers/crop-tasks", crop_batch(&bodies)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["persisted"], 1);
        assert_eq!(body["dropped"], 1);
        assert_eq!(body["failed"], 0);
        assert_eq!(app.store.face_count().await, 1);
        assert_eq!(app.catalog.faces().await.len(), 1);
    }

    #[tokio::test]
    async fn test_crop_tasks_retryable_failure_fails_request() {
        let app = TestApp::with_boxes(vec![NormalizedBox::new(0.0, 0.5, 0.0, 0.5)]);
        app.store.put_image("img1", png_image(200, 200)).await;
        app.router()
            .oneshot(post_json("/triggers/object-created", object_created(&["images/img1"])))
            .await
            .unwrap();
        let bodies: Vec<String> = app
            .queue
            .drain_messages()
            .await
            .into_iter()
            .map(|m| m.body)
            .collect();

        app.catalog.set_fail(true);
        let response = app
            .router()
            .oneshot(post_json("/triggers/crop-tasks", crop_batch(&bodies)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
