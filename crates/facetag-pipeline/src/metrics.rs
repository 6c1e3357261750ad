//! Pipeline metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Crop tasks enqueued by the detection stage.
    pub const FACES_ENQUEUED_TOTAL: &str = "facetag_faces_enqueued_total";

    /// Faces written to the artifact store and the catalog.
    pub const FACES_PERSISTED_TOTAL: &str = "facetag_faces_persisted_total";

    /// Crop tasks dropped without retry, by reason.
    pub const TASKS_DROPPED_TOTAL: &str = "facetag_tasks_dropped_total";

    /// Notifications skipped by the detection stage, by reason.
    pub const IMAGES_SKIPPED_TOTAL: &str = "facetag_images_skipped_total";

    /// Detected boxes rejected by coordinate mapping.
    pub const BOXES_REJECTED_TOTAL: &str = "facetag_boxes_rejected_total";

    /// Stage invocation duration in seconds.
    pub const STAGE_DURATION_SECONDS: &str = "facetag_stage_duration_seconds";
}

pub fn record_faces_enqueued(count: u64) {
    counter!(names::FACES_ENQUEUED_TOTAL).increment(count);
}

pub fn record_face_persisted() {
    counter!(names::FACES_PERSISTED_TOTAL).increment(1);
}

pub fn record_task_dropped(reason: &'static str) {
    counter!(names::TASKS_DROPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_image_skipped(reason: &'static str) {
    counter!(names::IMAGES_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_boxes_rejected(count: u64) {
    counter!(names::BOXES_REJECTED_TOTAL).increment(count);
}

pub fn record_stage_duration(stage: &'static str, seconds: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(seconds);
}
