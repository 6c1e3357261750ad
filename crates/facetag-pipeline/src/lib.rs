//! Face pipeline core.
//!
//! This crate provides:
//! - Port traits for the artifact store, crop-task queue, face catalog and detector
//! - The detection stage (image -> crop tasks)
//! - The cropping stage (crop task -> face crop + rows)
//! - Labeling and retrieval workflows
//! - Port bindings for the production clients and in-memory ones for tests

pub mod adapters;
pub mod config;
pub mod cropping;
pub mod detection;
pub mod error;
pub mod imaging;
pub mod labeling;
pub mod memory;
pub mod metrics;
pub mod ports;
pub mod retrieval;

pub use config::{ConfigError, PipelineConfig};
pub use cropping::{CroppingStage, CroppingSummary, TaskOutcome, TaskReport};
pub use detection::{DetectionStage, DetectionSummary};
pub use error::{PipelineError, PipelineResult};
pub use labeling::LabelingService;
pub use ports::{ArtifactStore, CropTaskSink, FaceCatalog, FaceDetector, ObjectHead};
pub use retrieval::RetrievalService;
