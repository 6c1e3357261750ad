//! Redis Streams crop-task queue.
//!
//! This crate provides:
//! - CropTask enqueueing via Redis Streams
//! - Consumer-group consumption of raw task messages
//! - Ack, stale-entry claiming, retry counting and dead-lettering

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{CropTaskQueue, QueueConfig, TASK_FIELD};
