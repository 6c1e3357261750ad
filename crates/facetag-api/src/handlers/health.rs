//! Health check handlers.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: BTreeMap<String, CheckStatus>,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness check endpoint (readiness probe).
/// Checks connectivity to every backing service concurrently.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let results = join_all(state.checks.iter().map(|check| async move {
        let start = Instant::now();
        let status = match check.check().await {
            Ok(()) => CheckStatus::ok(start.elapsed().as_millis() as u64),
            Err(e) => CheckStatus::error(e),
        };
        (check.name().to_string(), status)
    }))
    .await;

    let checks: BTreeMap<String, CheckStatus> = results.into_iter().collect();
    let all_ok = checks.values().all(CheckStatus::is_ok);

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks,
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::checks::ReadinessCheck;
    use crate::test_support::{json_body, TestApp};

    use super::*;

    struct StaticCheck(&'static str, Result<(), String>);

    #[async_trait::async_trait]
    impl ReadinessCheck for StaticCheck {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn check(&self) -> Result<(), String> {
            self.1.clone()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_failing_dependency() {
        let checks: Vec<Arc<dyn ReadinessCheck>> = vec![
            Arc::new(StaticCheck("redis", Ok(()))) as Arc<dyn ReadinessCheck>,
            Arc::new(StaticCheck("firestore", Err("connection refused".to_string()))),
        ];
        let app = TestApp::with_checks(checks).router();

        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["checks"]["redis"]["status"], "ok");
        assert_eq!(body["checks"]["firestore"]["error"], "connection refused");
    }

    #[tokio::test]
    async fn test_ready_when_all_checks_pass() {
        let checks: Vec<Arc<dyn ReadinessCheck>> = vec![Arc::new(StaticCheck("storage", Ok(())))];
        let app = TestApp::with_checks(checks).router();

        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
