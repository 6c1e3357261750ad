//! Crop-task queue errors.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Cannot reach Redis: {0}")]
    Unreachable(String),

    #[error("Failed to publish crop task: {0}")]
    Publish(String),

    #[error("Failed to read crop tasks: {0}")]
    Consume(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Crop task encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl QueueError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn consume(msg: impl Into<String>) -> Self {
        Self::Consume(msg.into())
    }
}
