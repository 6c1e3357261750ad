//! Shared data models for the facetag pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Image and face identifiers
//! - Normalized detection boxes and pixel-space face bounds
//! - Crop tasks handed from detection to cropping
//! - Face and relation records
//! - Inbound trigger envelopes (object storage, queue)

pub mod event;
pub mod face;
pub mod geometry;
pub mod ids;
pub mod task;

// Re-export common types
pub use event::{
    ObjectCreatedBatch, ObjectCreatedDetails, ObjectCreatedMessage, QueueMessage, QueueTriggerBatch,
};
pub use face::{FaceRecord, Relation};
pub use geometry::{map_box, FaceBounds, GeometryError, NormalizedBox};
pub use ids::{FaceId, ObjectId};
pub use task::CropTask;
