//! Crop-task executor.
//!
//! Reads batches from the Redis stream, hands them to the cropping stage and
//! settles every message according to its outcome:
//!
//! - persisted or dropped: acknowledged and removed from the stream
//! - failed: left pending for redelivery until it has failed `max_retries`
//!   times, then moved to the dead letter stream

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use facetag_models::QueueMessage;
use facetag_pipeline::{CroppingStage, CroppingSummary, TaskOutcome, TaskReport};
use facetag_queue::{CropTaskQueue, QueueResult};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::BatchLogger;
use crate::metrics;

/// What happens to a message whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Redeliver { attempt: u32 },
    DeadLetter,
}

impl RetryDecision {
    /// Decision for a message that failed for the `attempt`-th time.
    pub fn after_failure(attempt: u32, max_retries: u32) -> Self {
        if attempt >= max_retries {
            Self::DeadLetter
        } else {
            Self::Redeliver { attempt }
        }
    }
}

/// Queue operations needed to settle a processed message.
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn ack(&self, message_id: &str) -> QueueResult<()>;
    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32>;
    async fn dlq(&self, message: &QueueMessage, error: &str) -> QueueResult<()>;
    fn max_retries(&self) -> u32;
}

#[async_trait]
impl Settlement for CropTaskQueue {
    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        CropTaskQueue::ack(self, message_id).await
    }

    async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        CropTaskQueue::increment_retry(self, message_id).await
    }

    async fn dlq(&self, message: &QueueMessage, error: &str) -> QueueResult<()> {
        CropTaskQueue::dlq(self, message, error).await
    }

    fn max_retries(&self) -> u32 {
        CropTaskQueue::max_retries(self)
    }
}

/// Executor that processes crop tasks from the queue.
pub struct CropExecutor {
    config: WorkerConfig,
    queue: Arc<CropTaskQueue>,
    stage: Arc<CroppingStage>,
    batch_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl CropExecutor {
    pub fn new(config: WorkerConfig, queue: CropTaskQueue, stage: CroppingStage) -> Self {
        let batch_semaphore = Arc::new(Semaphore::new(config.max_concurrent_batches));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = config
            .consumer_name
            .clone()
            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));

        Self {
            config,
            queue: Arc::new(queue),
            stage: Arc::new(stage),
            batch_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Run until [`CropExecutor::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting crop executor '{}' with {} max concurrent batches",
            self.consumer_name, self.config.max_concurrent_batches
        );

        self.queue.init().await?;

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.stage),
            Arc::clone(&self.batch_semaphore),
            self.config.clone(),
            self.consumer_name.clone(),
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_batch() => {
                    if let Err(e) = result {
                        error!("Error consuming crop tasks: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight batches to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_batches())
            .await
            .is_err()
        {
            warn!("Shutdown timeout elapsed with batches still running");
        }

        info!("Crop executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn consume_batch(&self) -> WorkerResult<()> {
        let permit = Arc::clone(&self.batch_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::shutting_down("batch semaphore closed"))?;

        let messages = self
            .queue
            .consume(&self.consumer_name, self.config.block_ms, self.config.batch_size)
            .await?;

        if messages.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} crop tasks from queue", messages.len());
        let logger = BatchLogger::new(&self.consumer_name, "consume", messages.len());
        tokio::spawn(Self::execute_batch(
            Arc::clone(&self.stage),
            Arc::clone(&self.queue),
            logger,
            messages,
            permit,
        ));
        Ok(())
    }

    async fn claim_loop(
        queue: Arc<CropTaskQueue>,
        stage: Arc<CroppingStage>,
        semaphore: Arc<Semaphore>,
        config: WorkerConfig,
        consumer_name: String,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(config.claim_interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        break;
                    };
                    match queue
                        .claim_pending(&consumer_name, config.claim_min_idle, config.batch_size)
                        .await
                    {
                        Ok(messages) if !messages.is_empty() => {
                            let logger = BatchLogger::new(&consumer_name, "claim", messages.len());
                            tokio::spawn(Self::execute_batch(
                                Arc::clone(&stage),
                                Arc::clone(&queue),
                                logger,
                                messages,
                                permit,
                            ));
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to claim pending crop tasks: {}", e),
                    }
                }
            }
        }
    }

    /// Process one batch and settle each of its messages.
    async fn execute_batch(
        stage: Arc<CroppingStage>,
        queue: Arc<CropTaskQueue>,
        logger: BatchLogger,
        messages: Vec<QueueMessage>,
        permit: OwnedSemaphorePermit,
    ) {
        let _permit = permit;
        let span = logger.create_span();

        async {
            let start = Instant::now();
            logger.log_start();

            let reports = stage.handle_messages(&messages).await;
            for (message, report) in messages.iter().zip(&reports) {
                logger.log_report(report);
                settle(queue.as_ref(), &logger, message, report).await;
            }

            metrics::record_batch(logger.source(), start.elapsed().as_secs_f64());
            logger.log_completion(&CroppingSummary::from_reports(&reports));
        }
        .instrument(span)
        .await
    }

    async fn wait_for_batches(&self) {
        loop {
            if self.batch_semaphore.available_permits() == self.config.max_concurrent_batches {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Ack, leave pending or dead-letter one message according to its outcome.
pub async fn settle<Q: Settlement + ?Sized>(
    queue: &Q,
    logger: &BatchLogger,
    message: &QueueMessage,
    report: &TaskReport,
) {
    let message_id = &message.message_id;

    let error = match &report.outcome {
        TaskOutcome::Persisted(_) | TaskOutcome::Dropped(_) => {
            if let Err(e) = queue.ack(message_id).await {
                error!(message_id = %message_id, "Failed to ack crop task: {}", e);
            }
            return;
        }
        TaskOutcome::Failed(e) => e,
    };

    let max_retries = queue.max_retries();
    // Without a counter the message could cycle forever; park it.
    let attempt = queue.increment_retry(message_id).await.unwrap_or_else(|e| {
        error!(message_id = %message_id, "Failed to record retry: {}", e);
        max_retries
    });

    match RetryDecision::after_failure(attempt, max_retries) {
        RetryDecision::Redeliver { attempt } => {
            metrics::record_retried();
            logger.log_redelivery(message_id, attempt, max_retries);
        }
        RetryDecision::DeadLetter => {
            logger.log_dead_letter(message_id, max_retries);
            match queue.dlq(message, &error.to_string()).await {
                Ok(()) => metrics::record_dead_lettered(),
                Err(e) => error!(message_id = %message_id, "Failed to move crop task to DLQ: {}", e),
            }
        }
    }
}
