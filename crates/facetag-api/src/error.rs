//! API error types.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use facetag_pipeline::PipelineError;

use crate::telegram::TelegramError;

pub type ApiResult<T> = Result<T, ApiError>;

static HIDE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

/// Replace 5xx details with a generic message (set for production).
pub fn hide_internal_details(hide: bool) {
    HIDE_INTERNAL_DETAILS.store(hide, Ordering::Relaxed);
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Telegram error: {0}")]
    Telegram(#[from] TelegramError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Pipeline(e) => match e {
                PipelineError::InvalidName(_) | PipelineError::InvalidTask(_) => StatusCode::BAD_REQUEST,
                PipelineError::UnknownFace(_) => StatusCode::NOT_FOUND,
                PipelineError::DetectionProvider(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Telegram(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal() && HIDE_INTERNAL_DETAILS.load(Ordering::Relaxed) {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetag_models::FaceId;

    #[test]
    fn test_pipeline_status_codes() {
        let err: ApiError = PipelineError::UnknownFace(FaceId::from_string("f")).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = PipelineError::InvalidName("empty".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ApiError = PipelineError::Enqueue("down".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = PipelineError::DetectionProvider("down".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
