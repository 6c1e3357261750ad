//! Worker errors.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker is shutting down: {0}")]
    ShuttingDown(String),

    #[error("Queue error: {0}")]
    Queue(#[from] facetag_queue::QueueError),
}

impl WorkerError {
    pub fn shutting_down(msg: impl Into<String>) -> Self {
        Self::ShuttingDown(msg.into())
    }
}
