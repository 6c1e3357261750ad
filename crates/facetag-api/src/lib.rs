//! Axum HTTP API for the face pipeline.
//!
//! Routes:
//! - `GET /?face=` and `GET /?image=` serve stored images
//! - `POST /triggers/object-created` runs detection
//! - `POST /triggers/crop-tasks` runs cropping
//! - `POST /telegram/webhook` drives labeling and retrieval from chat
//! - `GET /health`, `GET /ready`, `GET /metrics`

pub mod checks;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telegram;

#[cfg(test)]
mod test_support;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, Ports};
