//! In-memory port implementations.
//!
//! Used by tests and local runs without external services. Each adapter can
//! be switched into a failing mode to exercise error paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use facetag_models::{CropTask, FaceId, FaceRecord, NormalizedBox, ObjectId, QueueMessage, Relation};

use crate::error::{PipelineError, PipelineResult};
use crate::ports::{ArtifactStore, CropTaskSink, FaceCatalog, FaceDetector, ObjectHead};

// =============================================================================
// Artifact store
// =============================================================================

#[derive(Default)]
pub struct InMemoryArtifactStore {
    images: Mutex<HashMap<ObjectId, Vec<u8>>>,
    faces: Mutex<HashMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_image(&self, id: impl Into<String>, bytes: Vec<u8>) {
        self.images.lock().await.insert(ObjectId::new(id), bytes);
    }

    pub async fn face(&self, id: &FaceId) -> Option<Vec<u8>> {
        self.faces.lock().await.get(id.as_str()).cloned()
    }

    pub async fn face_count(&self) -> usize {
        self.faces.lock().await.len()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self, key: &str) -> PipelineResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PipelineError::artifact_read(key, "store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn read_image_head(&self, id: &ObjectId, max_bytes: u64) -> PipelineResult<Option<ObjectHead>> {
        self.check_reads(id.as_str())?;
        let images = self.images.lock().await;
        Ok(images.get(id).map(|bytes| {
            let len = bytes.len().min(usize::try_from(max_bytes).unwrap_or(usize::MAX));
            ObjectHead {
                bytes: bytes[..len].to_vec(),
                complete: len == bytes.len(),
            }
        }))
    }

    async fn read_image(&self, id: &ObjectId) -> PipelineResult<Option<Vec<u8>>> {
        self.check_reads(id.as_str())?;
        Ok(self.images.lock().await.get(id).cloned())
    }

    async fn read_face(&self, face_ref: &str) -> PipelineResult<Option<Vec<u8>>> {
        self.check_reads(face_ref)?;
        let id = face_ref.strip_suffix(".jpg").unwrap_or(face_ref);
        Ok(self.faces.lock().await.get(id).cloned())
    }

    async fn write_face(&self, id: &FaceId, jpeg: Vec<u8>) -> PipelineResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PipelineError::Persist("store unavailable".to_string()));
        }
        self.faces.lock().await.insert(id.as_str().to_string(), jpeg);
        Ok(())
    }
}

// =============================================================================
// Task queue
// =============================================================================

#[derive(Default)]
pub struct InMemoryTaskQueue {
    tasks: Mutex<Vec<CropTask>>,
    fail: AtomicBool,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn tasks(&self) -> Vec<CropTask> {
        self.tasks.lock().await.clone()
    }

    /// Remove all queued tasks and wrap them as delivered messages.
    pub async fn drain_messages(&self) -> Vec<QueueMessage> {
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        tasks
            .iter()
            .enumerate()
            .filter_map(|(i, task)| {
                task.to_json()
                    .ok()
                    .map(|body| QueueMessage::new(format!("mem-{}", i), body))
            })
            .collect()
    }
}

#[async_trait]
impl CropTaskSink for InMemoryTaskQueue {
    async fn enqueue(&self, task: &CropTask) -> PipelineResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::Enqueue("queue unavailable".to_string()));
        }
        self.tasks.lock().await.push(task.clone());
        Ok(())
    }
}

// =============================================================================
// Face catalog
// =============================================================================

#[derive(Default)]
struct CatalogState {
    faces: Vec<FaceRecord>,
    relations: Vec<Relation>,
}

#[derive(Default)]
pub struct InMemoryFaceCatalog {
    state: Mutex<CatalogState>,
    fail: AtomicBool,
}

impl InMemoryFaceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn faces(&self) -> Vec<FaceRecord> {
        self.state.lock().await.faces.clone()
    }

    pub async fn relations(&self) -> Vec<Relation> {
        self.state.lock().await.relations.clone()
    }

    fn check(&self) -> PipelineResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::Store("catalog unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FaceCatalog for InMemoryFaceCatalog {
    async fn insert_face(&self, face: &FaceRecord, relation: &Relation) -> PipelineResult<()> {
        self.check()?;
        let mut state = self.state.lock().await;
        if state.faces.iter().any(|f| f.face_id == face.face_id) {
            return Err(PipelineError::Store(format!("face {} already exists", face.face_id)));
        }
        state.faces.push(face.clone());
        state.relations.push(relation.clone());
        Ok(())
    }

    async fn next_unlabeled(&self) -> PipelineResult<Option<FaceId>> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .faces
            .iter()
            .filter(|f| !f.is_labeled())
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.face_id.cmp(&b.face_id))
            })
            .map(|f| f.face_id.clone()))
    }

    async fn assign_name(&self, face_id: &FaceId, name: &str) -> PipelineResult<()> {
        self.check()?;
        let mut state = self.state.lock().await;
        let face = state
            .faces
            .iter_mut()
            .find(|f| &f.face_id == face_id)
            .ok_or_else(|| PipelineError::UnknownFace(face_id.clone()))?;
        face.face_name = Some(name.to_string());
        Ok(())
    }

    async fn find_images_by_name(&self, name: &str) -> PipelineResult<Vec<ObjectId>> {
        self.check()?;
        let state = self.state.lock().await;
        let named: HashSet<&FaceId> = state
            .faces
            .iter()
            .filter(|f| f.face_name.as_deref() == Some(name))
            .map(|f| &f.face_id)
            .collect();

        Ok(state
            .relations
            .iter()
            .filter(|r| named.contains(&r.face_id))
            .map(|r| r.image_id.clone())
            .collect())
    }
}

// =============================================================================
// Detector
// =============================================================================

/// Detector answering every request with the same boxes.
#[derive(Default)]
pub struct FixedDetector {
    boxes: Vec<NormalizedBox>,
    requests: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FixedDetector {
    pub fn new(boxes: Vec<NormalizedBox>) -> Self {
        Self {
            boxes,
            ..Default::default()
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// URLs the detector was asked about, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl FaceDetector for FixedDetector {
    async fn detect(&self, file_url: &str) -> PipelineResult<Vec<NormalizedBox>> {
        self.requests.lock().await.push(file_url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::DetectionProvider("provider unavailable".to_string()));
        }
        Ok(self.boxes.clone())
    }
}
