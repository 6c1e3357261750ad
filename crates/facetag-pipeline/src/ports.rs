//! Interfaces between the stages and their collaborators.
//!
//! Stages only see these traits. Concrete bindings live in [`crate::adapters`],
//! in-memory ones in [`crate::memory`].

use async_trait::async_trait;

use facetag_models::{CropTask, FaceId, FaceRecord, NormalizedBox, ObjectId, Relation};

use crate::error::PipelineResult;

/// Leading bytes of a stored object.
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub bytes: Vec<u8>,
    /// True when `bytes` is the whole object.
    pub complete: bool,
}

/// Blob storage for source images and face crops.
///
/// Reads return `Ok(None)` for absent objects and `ArtifactRead` for any
/// other failure.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Read at most `max_bytes` from the start of a source image.
    async fn read_image_head(&self, id: &ObjectId, max_bytes: u64) -> PipelineResult<Option<ObjectHead>>;

    /// Read a whole source image.
    async fn read_image(&self, id: &ObjectId) -> PipelineResult<Option<Vec<u8>>>;

    /// Read a stored face crop. Accepts a FaceID with or without the file extension.
    async fn read_face(&self, face_ref: &str) -> PipelineResult<Option<Vec<u8>>>;

    /// Store an encoded face crop. Failures surface as `Persist`.
    async fn write_face(&self, id: &FaceId, jpeg: Vec<u8>) -> PipelineResult<()>;
}

/// Producer side of the crop-task queue.
#[async_trait]
pub trait CropTaskSink: Send + Sync {
    /// Enqueue one task. Failures surface as `Enqueue`.
    async fn enqueue(&self, task: &CropTask) -> PipelineResult<()>;
}

/// Tabular store of faces, their names, and their source images.
#[async_trait]
pub trait FaceCatalog: Send + Sync {
    /// Persist a face row and its relation together.
    async fn insert_face(&self, face: &FaceRecord, relation: &Relation) -> PipelineResult<()>;

    /// One face without a name, oldest first.
    async fn next_unlabeled(&self) -> PipelineResult<Option<FaceId>>;

    /// Overwrite the name of an existing face; `UnknownFace` if it does not exist.
    async fn assign_name(&self, face_id: &FaceId, name: &str) -> PipelineResult<()>;

    /// Images related to faces named exactly `name`.
    async fn find_images_by_name(&self, name: &str) -> PipelineResult<Vec<ObjectId>>;
}

/// Third-party face detection.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect faces in the image at a public URL. Failures surface as `DetectionProvider`.
    async fn detect(&self, file_url: &str) -> PipelineResult<Vec<NormalizedBox>>;
}
