//! Artifact storage errors.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage is not configured: {0}")]
    ConfigError(String),

    #[error("No object at {0}")]
    NotFound(String),

    #[error("Failed to write object: {0}")]
    WriteFailed(String),

    #[error("Failed to read object: {0}")]
    ReadFailed(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// The object does not exist, as opposed to the store failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
