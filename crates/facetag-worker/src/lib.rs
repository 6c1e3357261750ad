//! Crop-task worker.
//!
//! This crate provides:
//! - The executor consuming crop tasks from the Redis stream
//! - Ack, redelivery and dead-letter policy
//! - Claiming of tasks abandoned by crashed consumers
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{settle, CropExecutor, RetryDecision, Settlement};
pub use logging::BatchLogger;
