//! Cropping stage: crop task -> face crop + face row + relation row.
//!
//! Every message is handled independently and reported back with an outcome
//! the caller uses to acknowledge it:
//!
//! - [`TaskOutcome::Persisted`]: the face crop and both rows are stored.
//! - [`TaskOutcome::Dropped`]: the task can never succeed (bad payload,
//!   missing or corrupt source, crop outside the image). Acknowledge it.
//! - [`TaskOutcome::Failed`]: a store was unavailable. Leave it for redelivery.
//!
//! Redelivery after a partial failure may leave an orphaned crop or a second
//! face for the same box; both are accepted.

use std::sync::Arc;
use std::time::Instant;

use facetag_models::{CropTask, FaceId, FaceRecord, QueueMessage, Relation};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::imaging::{self, Crop};
use crate::metrics;
use crate::ports::{ArtifactStore, FaceCatalog};

#[derive(Debug)]
pub enum TaskOutcome {
    Persisted(FaceId),
    Dropped(PipelineError),
    Failed(PipelineError),
}

/// Outcome of one delivered message.
#[derive(Debug)]
pub struct TaskReport {
    pub message_id: String,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    /// Whether the message is done with and can be acknowledged.
    pub fn should_ack(&self) -> bool {
        !matches!(self.outcome, TaskOutcome::Failed(_))
    }
}

/// Counts over a set of reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CroppingSummary {
    pub persisted: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl CroppingSummary {
    pub fn from_reports(reports: &[TaskReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.outcome {
                TaskOutcome::Persisted(_) => summary.persisted += 1,
                TaskOutcome::Dropped(_) => summary.dropped += 1,
                TaskOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

pub struct CroppingStage {
    store: Arc<dyn ArtifactStore>,
    catalog: Arc<dyn FaceCatalog>,
    config: PipelineConfig,
}

impl CroppingStage {
    pub fn new(store: Arc<dyn ArtifactStore>, catalog: Arc<dyn FaceCatalog>, config: PipelineConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Handle a batch of delivered messages, one report per message in order.
    pub async fn handle_messages(&self, messages: &[QueueMessage]) -> Vec<TaskReport> {
        let span = info_span!("cropping_stage", messages = messages.len());

        async {
            let start = Instant::now();
            let mut reports = Vec::with_capacity(messages.len());
            for message in messages {
                reports.push(self.handle_message(message).await);
            }

            metrics::record_stage_duration("cropping", start.elapsed().as_secs_f64());
            let summary = CroppingSummary::from_reports(&reports);
            info!(
                persisted = summary.persisted,
                dropped = summary.dropped,
                failed = summary.failed,
                "Cropping batch finished"
            );
            reports
        }
        .instrument(span)
        .await
    }

    pub async fn handle_message(&self, message: &QueueMessage) -> TaskReport {
        let outcome = match CropTask::from_json(&message.body) {
            Err(e) => {
                let err = PipelineError::InvalidTask(e.to_string());
                warn!(message_id = %message.message_id, error = %err, "Dropping malformed crop task");
                metrics::record_task_dropped(err.kind());
                TaskOutcome::Dropped(err)
            }
            Ok(task) => match self.process_task(&task).await {
                Ok(face_id) => TaskOutcome::Persisted(face_id),
                Err(e) if e.is_permanent() => {
                    warn!(
                        message_id = %message.message_id,
                        object_id = %task.object_id,
                        error = %e,
                        "Dropping crop task"
                    );
                    metrics::record_task_dropped(e.kind());
                    TaskOutcome::Dropped(e)
                }
                Err(e) => {
                    error!(
                        message_id = %message.message_id,
                        object_id = %task.object_id,
                        error = %e,
                        "Crop task failed"
                    );
                    TaskOutcome::Failed(e)
                }
            },
        };

        TaskReport {
            message_id: message.message_id.clone(),
            outcome,
        }
    }

    /// Cut one face out of its source image and record it as unlabeled.
    pub async fn process_task(&self, task: &CropTask) -> PipelineResult<FaceId> {
        let object_id = &task.object_id;
        let source = self
            .store
            .read_image(object_id)
            .await?
            .ok_or_else(|| PipelineError::SourceNotFound(object_id.clone()))?;

        let bounds = task.bounds;
        let quality = self.config.jpeg_quality;
        let crop = tokio::task::spawn_blocking(move || imaging::crop_to_jpeg(&source, &bounds, quality))
            .await?
            .map_err(|e| PipelineError::image_decode(object_id, e))?;

        let (jpeg, clamped) = match crop {
            Crop::Jpeg { bytes, bounds } => (bytes, bounds),
            Crop::Empty => return Err(PipelineError::EmptyCrop(object_id.clone())),
        };
        if clamped != task.bounds {
            debug!(object_id = %object_id, ?clamped, "Clamped crop to image");
        }

        let face_id = FaceId::new();
        self.store.write_face(&face_id, jpeg).await?;

        let face = FaceRecord::unlabeled(face_id.clone());
        let relation = Relation::new(object_id.clone(), face_id.clone());
        self.catalog.insert_face(&face, &relation).await?;

        metrics::record_face_persisted();
        info!(face_id = %face_id, object_id = %object_id, "Persisted face");
        Ok(face_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::tests::test_image;
    use crate::memory::{InMemoryArtifactStore, InMemoryFaceCatalog};
    use facetag_models::{FaceBounds, ObjectId};
    use image::ImageOutputFormat;

    fn stage() -> (Arc<InMemoryArtifactStore>, Arc<InMemoryFaceCatalog>, CroppingStage) {
        let store = Arc::new(InMemoryArtifactStore::new());
        let catalog = Arc::new(InMemoryFaceCatalog::new());
        let stage = CroppingStage::new(store.clone(), catalog.clone(), PipelineConfig::default());
        (store, catalog, stage)
    }

    fn message(id: &str, task: &CropTask) -> QueueMessage {
        QueueMessage::new(id, task.to_json().unwrap())
    }

    #[tokio::test]
    async fn test_persists_crop_face_and_relation() {
        let (store, catalog, stage) = stage();
        store
            .put_image("img1", test_image(200, 200, ImageOutputFormat::Png))
            .await;

        let task = CropTask::new(ObjectId::new("img1"), FaceBounds::new(0, 0, 100, 100));
        let face_id = stage.process_task(&task).await.unwrap();

        let jpeg = store.face(&face_id).await.unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 100));

        let faces = catalog.faces().await;
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].face_id, face_id);
        assert!(faces[0].face_name.is_none());
        assert_eq!(
            catalog.relations().await,
            vec![Relation::new(ObjectId::new("img1"), face_id)]
        );
    }

    #[tokio::test]
    async fn test_overhanging_bounds_are_clamped() {
        let (store, _, stage) = stage();
        store
            .put_image("img1", test_image(50, 40, ImageOutputFormat::Png))
            .await;

        let task = CropTask::new(ObjectId::new("img1"), FaceBounds::new(30, 20, 100, 100));
        let face_id = stage.process_task(&task).await.unwrap();

        let decoded = image::load_from_memory(&store.face(&face_id).await.unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 20));
    }

    #[tokio::test]
    async fn test_permanent_failures_are_dropped() {
        let (store, catalog, stage) = stage();
        store
            .put_image("small", test_image(10, 10, ImageOutputFormat::Png))
            .await;
        store.put_image("broken", b"garbage".to_vec()).await;

        let messages = vec![
            QueueMessage::new("1", "{not json"),
            QueueMessage::new("2", r#"{"objectID":"small"}"#),
            message("3", &CropTask::new(ObjectId::new("missing"), FaceBounds::new(0, 0, 5, 5))),
            message("4", &CropTask::new(ObjectId::new("broken"), FaceBounds::new(0, 0, 5, 5))),
            message("5", &CropTask::new(ObjectId::new("small"), FaceBounds::new(20, 20, 5, 5))),
        ];

        let reports = stage.handle_messages(&messages).await;
        assert_eq!(reports.len(), 5);
        assert!(reports.iter().all(|r| r.should_ack()));
        assert!(matches!(
            reports[0].outcome,
            TaskOutcome::Dropped(PipelineError::InvalidTask(_))
        ));
        assert!(matches!(
            reports[1].outcome,
            TaskOutcome::Dropped(PipelineError::InvalidTask(_))
        ));
        assert!(matches!(
            reports[2].outcome,
            TaskOutcome::Dropped(PipelineError::SourceNotFound(_))
        ));
        assert!(matches!(
            reports[3].outcome,
            TaskOutcome::Dropped(PipelineError::ImageDecode { .. })
        ));
        assert!(matches!(
            reports[4].outcome,
            TaskOutcome::Dropped(PipelineError::EmptyCrop(_))
        ));

        assert_eq!(store.face_count().await, 0);
        assert!(catalog.faces().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_outages_are_retryable() {
        let (store, catalog, stage) = stage();
        store
            .put_image("img1", test_image(20, 20, ImageOutputFormat::Png))
            .await;
        let task = CropTask::new(ObjectId::new("img1"), FaceBounds::new(0, 0, 10, 10));

        store.set_fail_writes(true);
        let report = stage.handle_message(&message("1", &task)).await;
        assert!(matches!(report.outcome, TaskOutcome::Failed(PipelineError::Persist(_))));
        assert!(!report.should_ack());
        store.set_fail_writes(false);

        catalog.set_fail(true);
        let report = stage.handle_message(&message("2", &task)).await;
        assert!(matches!(report.outcome, TaskOutcome::Failed(PipelineError::Store(_))));
        // The crop was written before the rows failed.
        assert_eq!(store.face_count().await, 1);
        catalog.set_fail(false);

        store.set_fail_reads(true);
        let report = stage.handle_message(&message("3", &task)).await;
        assert!(matches!(
            report.outcome,
            TaskOutcome::Failed(PipelineError::ArtifactRead { .. })
        ));
    }

    #[tokio::test]
    async fn test_redelivery_creates_a_second_face() {
        let (store, catalog, stage) = stage();
        store
            .put_image("img1", test_image(20, 20, ImageOutputFormat::Png))
            .await;
        let task = CropTask::new(ObjectId::new("img1"), FaceBounds::new(0, 0, 10, 10));

        let reports = stage
            .handle_messages(&[message("1", &task), message("1", &task)])
            .await;
        assert_eq!(CroppingSummary::from_reports(&reports).persisted, 2);

        let faces = catalog.faces().await;
        assert_eq!(faces.len(), 2);
        assert_ne!(faces[0].face_id, faces[1].face_id);
    }
}
