//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::hide_internal_details;
use crate::handlers::{
    crop_tasks_trigger, health, object_created_trigger, ready, serve_image, telegram_webhook,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    hide_internal_details(state.config.is_production());

    // Public image serving, fetched by the detection provider and the chat client
    let image_routes = Router::new().route("/", get(serve_image));

    // Event sources of the two pipeline stages
    let trigger_routes = Router::new()
        .route("/triggers/object-created", post(object_created_trigger))
        .route("/triggers/crop-tasks", post(crop_tasks_trigger));

    let chat_routes = Router::new().route("/telegram/webhook", post(telegram_webhook));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(image_routes)
        .merge(trigger_routes)
        .merge(chat_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
