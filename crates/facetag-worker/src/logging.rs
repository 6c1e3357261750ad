//! Structured batch logging.

use tracing::{error, info, warn, Span};

use facetag_pipeline::{CroppingSummary, TaskOutcome, TaskReport};

/// Logger carrying the context of one consumed batch.
#[derive(Debug, Clone)]
pub struct BatchLogger {
    consumer: String,
    source: &'static str,
    size: usize,
}

impl BatchLogger {
    /// `source` tells fresh reads (`"consume"`) from reclaimed ones (`"claim"`).
    pub fn new(consumer: &str, source: &'static str, size: usize) -> Self {
        Self {
            consumer: consumer.to_string(),
            source,
            size,
        }
    }

    pub fn log_start(&self) {
        info!(
            consumer = %self.consumer,
            source = self.source,
            size = self.size,
            "Batch started"
        );
    }

    /// Log how one message will be settled.
    pub fn log_report(&self, report: &TaskReport) {
        match &report.outcome {
            TaskOutcome::Persisted(face_id) => info!(
                message_id = %report.message_id,
                face_id = %face_id,
                "Task persisted"
            ),
            TaskOutcome::Dropped(e) => warn!(
                message_id = %report.message_id,
                reason = e.kind(),
                "Task dropped: {}", e
            ),
            TaskOutcome::Failed(e) => error!(
                message_id = %report.message_id,
                reason = e.kind(),
                "Task failed: {}", e
            ),
        }
    }

    pub fn log_redelivery(&self, message_id: &str, attempt: u32, max_retries: u32) {
        info!(
            consumer = %self.consumer,
            message_id = %message_id,
            "Task will be redelivered (attempt {}/{})", attempt, max_retries
        );
    }

    pub fn log_dead_letter(&self, message_id: &str, max_retries: u32) {
        warn!(
            consumer = %self.consumer,
            message_id = %message_id,
            "Task exceeded max retries ({}), moving to DLQ", max_retries
        );
    }

    pub fn log_completion(&self, summary: &CroppingSummary) {
        info!(
            consumer = %self.consumer,
            source = self.source,
            persisted = summary.persisted,
            dropped = summary.dropped,
            failed = summary.failed,
            "Batch completed"
        );
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "batch",
            consumer = %self.consumer,
            source = self.source,
            size = self.size
        )
    }
}
