//! Detection client error types.

use thiserror::Error;

pub type DetectionResult<T> = Result<T, DetectionError>;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Provider reported failure: {0}")]
    ProviderFailed(String),

    #[error("Unexpected response schema: {0}")]
    SchemaMismatch(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl DetectionError {
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }
}
