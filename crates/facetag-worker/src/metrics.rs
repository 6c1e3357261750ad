//! Worker metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Batches handled, labeled by how they were read
    pub const BATCHES_TOTAL: &str = "facetag_worker_batches_total";

    /// Messages moved to the dead letter stream
    pub const TASKS_DEAD_LETTERED_TOTAL: &str = "facetag_tasks_dead_lettered_total";

    /// Failed deliveries left for redelivery
    pub const TASKS_RETRIED_TOTAL: &str = "facetag_tasks_retried_total";

    /// Batch processing time
    pub const BATCH_DURATION_SECONDS: &str = "facetag_worker_batch_duration_seconds";
}

pub fn record_batch(source: &'static str, seconds: f64) {
    counter!(names::BATCHES_TOTAL, "source" => source).increment(1);
    histogram!(names::BATCH_DURATION_SECONDS, "source" => source).record(seconds);
}

pub fn record_dead_lettered() {
    counter!(names::TASKS_DEAD_LETTERED_TOTAL).increment(1);
}

pub fn record_retried() {
    counter!(names::TASKS_RETRIED_TOTAL).increment(1);
}
