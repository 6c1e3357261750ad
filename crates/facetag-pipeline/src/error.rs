//! Pipeline error taxonomy.
//!
//! Adapter crates keep their own error enums; the port implementations map
//! them into these variants.

use facetag_models::{FaceId, GeometryError, ObjectId};
use thiserror::Error;
use tokio::task::JoinError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    #[error("Cannot decode image {object_id}: {reason}")]
    ImageDecode { object_id: ObjectId, reason: String },

    #[error("Detection provider error: {0}")]
    DetectionProvider(String),

    #[error("Failed to enqueue crop task: {0}")]
    Enqueue(String),

    #[error("Source image not found: {0}")]
    SourceNotFound(ObjectId),

    #[error("Crop of {0} is empty after clamping to the image")]
    EmptyCrop(ObjectId),

    #[error("Failed to read artifact {key}: {reason}")]
    ArtifactRead { key: String, reason: String },

    #[error("Failed to persist face artifact: {0}")]
    Persist(String),

    #[error("Unknown face: {0}")]
    UnknownFace(FaceId),

    #[error("Tabular store error: {0}")]
    Store(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid crop task: {0}")]
    InvalidTask(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JoinError> for PipelineError {
    fn from(e: JoinError) -> Self {
        Self::Internal(format!("blocking task did not complete: {e}"))
    }
}

impl PipelineError {
    pub fn image_decode(object_id: &ObjectId, reason: impl ToString) -> Self {
        Self::ImageDecode {
            object_id: object_id.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn artifact_read(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::ArtifactRead {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors tied to the input itself; redelivering the same input fails again.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidGeometry(_)
                | Self::ImageDecode { .. }
                | Self::SourceNotFound(_)
                | Self::EmptyCrop(_)
                | Self::UnknownFace(_)
                | Self::InvalidName(_)
                | Self::InvalidTask(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidGeometry(_) => "invalid_geometry",
            Self::ImageDecode { .. } => "image_decode",
            Self::DetectionProvider(_) => "detection_provider",
            Self::Enqueue(_) => "enqueue",
            Self::SourceNotFound(_) => "source_not_found",
            Self::EmptyCrop(_) => "empty_crop",
            Self::ArtifactRead { .. } => "artifact_read",
            Self::Persist(_) => "persist",
            Self::UnknownFace(_) => "unknown_face",
            Self::Store(_) => "store",
            Self::InvalidName(_) => "invalid_name",
            Self::InvalidTask(_) => "invalid_task",
            Self::Internal(_) => "internal",
        }
    }
}
