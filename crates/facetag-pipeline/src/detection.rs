//! Detection stage: uploaded image -> face boxes -> crop tasks.
//!
//! For each notification the stage reads the image dimensions from the
//! header, asks the provider for face boxes, maps every box to pixel space
//! and enqueues one [`CropTask`] per valid box. Per-image input problems are
//! logged and skipped; provider and queue failures abort the invocation so
//! the trigger can redeliver.

use std::sync::Arc;
use std::time::Instant;

use facetag_models::{map_box, CropTask, ObjectCreatedBatch, ObjectId};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::imaging;
use crate::metrics;
use crate::ports::{ArtifactStore, CropTaskSink, FaceDetector};

/// Counters of one detection invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionSummary {
    pub images_processed: usize,
    pub images_skipped: usize,
    pub faces_enqueued: usize,
    pub boxes_rejected: usize,
}

/// Outcome of detection on a single image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDetection {
    pub faces_enqueued: usize,
    pub boxes_rejected: usize,
}

pub struct DetectionStage {
    store: Arc<dyn ArtifactStore>,
    detector: Arc<dyn FaceDetector>,
    sink: Arc<dyn CropTaskSink>,
    config: PipelineConfig,
}

impl DetectionStage {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        detector: Arc<dyn FaceDetector>,
        sink: Arc<dyn CropTaskSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            detector,
            sink,
            config,
        }
    }

    /// Process a batch of object-created notifications.
    pub async fn handle_batch(&self, batch: &ObjectCreatedBatch) -> PipelineResult<DetectionSummary> {
        let span = info_span!("detection_stage", notifications = batch.messages.len());

        async {
            let start = Instant::now();
            let mut summary = DetectionSummary::default();

            for message in &batch.messages {
                let details = &message.details;
                let Some(object_id) = details.image_id(&self.config.images_prefix) else {
                    debug!(
                        bucket = %details.bucket_id,
                        key = %details.object_id,
                        "Ignoring object outside the images prefix"
                    );
                    metrics::record_image_skipped("outside_prefix");
                    summary.images_skipped += 1;
                    continue;
                };

                match self.detect_image(&object_id).await {
                    Ok(result) => {
                        summary.images_processed += 1;
                        summary.faces_enqueued += result.faces_enqueued;
                        summary.boxes_rejected += result.boxes_rejected;
                    }
                    Err(e @ PipelineError::ImageDecode { .. }) => {
                        warn!(object_id = %object_id, error = %e, "Skipping unreadable image");
                        metrics::record_image_skipped(e.kind());
                        summary.images_skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            metrics::record_stage_duration("detection", start.elapsed().as_secs_f64());
            info!(
                processed = summary.images_processed,
                skipped = summary.images_skipped,
                enqueued = summary.faces_enqueued,
                rejected = summary.boxes_rejected,
                "Detection batch finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Detect faces in one stored image and enqueue a crop task per face.
    pub async fn detect_image(&self, object_id: &ObjectId) -> PipelineResult<ImageDetection> {
        let (width, height) = self.probe_dimensions(object_id).await?;
        debug!(object_id = %object_id, width, height, "Read image dimensions");

        let url = self.config.image_url(object_id.as_str());
        let boxes = self.detector.detect(&url).await?;

        let mut result = ImageDetection::default();
        let mut tasks = Vec::with_capacity(boxes.len());
        for bbox in &boxes {
            match map_box(width, height, bbox) {
                Ok(bounds) => tasks.push(CropTask::new(object_id.clone(), bounds)),
                Err(e) => {
                    warn!(object_id = %object_id, error = %e, "Rejecting face box");
                    result.boxes_rejected += 1;
                }
            }
        }

        for task in &tasks {
            self.sink.enqueue(task).await?;
            result.faces_enqueued += 1;
        }

        metrics::record_faces_enqueued(result.faces_enqueued as u64);
        metrics::record_boxes_rejected(result.boxes_rejected as u64);
        info!(
            object_id = %object_id,
            faces = result.faces_enqueued,
            rejected = result.boxes_rejected,
            "Enqueued crop tasks"
        );
        Ok(result)
    }

    /// Image dimensions from the header, reading the whole object only if needed.
    ///
    /// A missing or undecodable image is `ImageDecode`; store failures pass through.
    async fn probe_dimensions(&self, object_id: &ObjectId) -> PipelineResult<(u32, u32)> {
        let head = self
            .store
            .read_image_head(object_id, self.config.header_probe_bytes)
            .await?
            .ok_or_else(|| PipelineError::image_decode(object_id, "image not found"))?;

        match imaging::dimensions(&head.bytes) {
            Ok(dims) => return Ok(dims),
            Err(e) if head.complete => return Err(PipelineError::image_decode(object_id, e)),
            Err(e) => debug!(object_id = %object_id, error = %e, "Header not in prefix, reading full image"),
        }

        let bytes = self
            .store
            .read_image(object_id)
            .await?
            .ok_or_else(|| PipelineError::image_decode(object_id, "image not found"))?;

        imaging::dimensions(&bytes).map_err(|e| PipelineError::image_decode(object_id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::tests::test_image;
    use crate::memory::{FixedDetector, InMemoryArtifactStore, InMemoryTaskQueue};
    use facetag_models::{FaceBounds, NormalizedBox, ObjectCreatedDetails, ObjectCreatedMessage};
    use image::ImageOutputFormat;

    struct Harness {
        store: Arc<InMemoryArtifactStore>,
        detector: Arc<FixedDetector>,
        queue: Arc<InMemoryTaskQueue>,
        stage: DetectionStage,
    }

    fn harness(boxes: Vec<NormalizedBox>, config: PipelineConfig) -> Harness {
        let store = Arc::new(InMemoryArtifactStore::new());
        let detector = Arc::new(FixedDetector::new(boxes));
        let queue = Arc::new(InMemoryTaskQueue::new());
        let stage = DetectionStage::new(store.clone(), detector.clone(), queue.clone(), config);
        Harness {
            store,
            detector,
            queue,
            stage,
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            public_base_url: "https://gw.example".to_string(),
            ..Default::default()
        }
    }

    fn batch(keys: &[&str]) -> ObjectCreatedBatch {
        ObjectCreatedBatch {
            messages: keys
                .iter()
                .map(|key| ObjectCreatedMessage {
                    event_metadata: None,
                    details: ObjectCreatedDetails {
                        bucket_id: "photos".to_string(),
                        object_id: key.to_string(),
                    },
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_one_task_per_valid_box() {
        let h = harness(
            vec![
                NormalizedBox::new(0.1, 0.3, 0.2, 0.4),
                NormalizedBox::new(0.5, 0.5, 0.1, 0.2),
            ],
            config(),
        );
        h.store
            .put_image("img1", test_image(1000, 500, ImageOutputFormat::Png))
            .await;

        let summary = h.stage.handle_batch(&batch(&["images/img1"])).await.unwrap();

        assert_eq!(
            summary,
            DetectionSummary {
                images_processed: 1,
                images_skipped: 0,
                faces_enqueued: 1,
                boxes_rejected: 1,
            }
        );
        assert_eq!(
            h.queue.tasks().await,
            vec![CropTask::new(ObjectId::new("img1"), FaceBounds::new(100, 100, 200, 100))]
        );
        assert_eq!(
            h.detector.requests().await,
            vec!["https://gw.example/?image=img1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_faces_enqueues_nothing() {
        let h = harness(vec![], config());
        h.store
            .put_image("img1", test_image(10, 10, ImageOutputFormat::Png))
            .await;

        let summary = h.stage.handle_batch(&batch(&["images/img1"])).await.unwrap();
        assert_eq!(summary.images_processed, 1);
        assert!(h.queue.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_images_are_skipped() {
        let h = harness(vec![NormalizedBox::new(0.0, 0.5, 0.0, 0.5)], config());
        h.store.put_image("broken", b"not an image".to_vec()).await;
        h.store
            .put_image("good", test_image(200, 200, ImageOutputFormat::Png))
            .await;

        let summary = h
            .stage
            .handle_batch(&batch(&["images/missing", "images/broken", "images/good"]))
            .await
            .unwrap();

        assert_eq!(summary.images_skipped, 2);
        assert_eq!(summary.images_processed, 1);
        assert_eq!(h.queue.tasks().await.len(), 1);
        // The provider is never asked about images we cannot read.
        assert_eq!(h.detector.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_fails_the_batch() {
        let h = harness(vec![NormalizedBox::new(0.0, 0.5, 0.0, 0.5)], config());
        h.store
            .put_image("img1", test_image(200, 200, ImageOutputFormat::Png))
            .await;
        h.store.set_fail_reads(true);

        let result = h.stage.handle_batch(&batch(&["images/img1"])).await;

        assert!(matches!(result, Err(PipelineError::ArtifactRead { .. })), "{:?}", result);
        assert!(!result.unwrap_err().is_permanent());
        assert!(h.queue.tasks().await.is_empty());
        assert!(h.detector.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_keys_outside_images_prefix_are_ignored() {
        let h = harness(vec![NormalizedBox::new(0.0, 0.5, 0.0, 0.5)], config());

        let summary = h.stage.handle_batch(&batch(&["faces/abc.jpg"])).await.unwrap();
        assert_eq!(summary.images_skipped, 1);
        assert!(h.detector.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_header_beyond_probe_falls_back_to_full_read() {
        let h = harness(
            vec![NormalizedBox::new(0.0, 1.0, 0.0, 1.0)],
            PipelineConfig {
                header_probe_bytes: 4,
                ..config()
            },
        );
        h.store
            .put_image("img1", test_image(40, 30, ImageOutputFormat::Png))
            .await;

        h.stage.handle_batch(&batch(&["images/img1"])).await.unwrap();
        assert_eq!(
            h.queue.tasks().await[0].bounds,
            FaceBounds::new(0, 0, 40, 30)
        );
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let h = harness(vec![], config());
        h.detector.set_fail(true);
        h.store
            .put_image("img1", test_image(10, 10, ImageOutputFormat::Png))
            .await;

        let err = h.stage.handle_batch(&batch(&["images/img1"])).await.unwrap_err();
        assert!(matches!(err, PipelineError::DetectionProvider(_)));
    }

    #[tokio::test]
    async fn test_enqueue_failure_propagates() {
        let h = harness(vec![NormalizedBox::new(0.0, 0.5, 0.0, 0.5)], config());
        h.queue.set_fail(true);
        h.store
            .put_image("img1", test_image(10, 10, ImageOutputFormat::Png))
            .await;

        let err = h.stage.handle_batch(&batch(&["images/img1"])).await.unwrap_err();
        assert!(matches!(err, PipelineError::Enqueue(_)));
    }
}
