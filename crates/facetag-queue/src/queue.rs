//! Crop-task queue using Redis Streams.

use std::time::Duration;

use facetag_models::{CropTask, QueueMessage};
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};

/// Stream entry field carrying the serialized CropTask.
pub const TASK_FIELD: &str = "task";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for crop tasks
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Failed deliveries before a task is dead-lettered
    pub max_retries: u32,
    /// How long retry counters survive
    pub retry_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "facetag:crop-tasks".to_string(),
            consumer_group: "facetag:croppers".to_string(),
            dlq_stream_name: "facetag:crop-tasks:dlq".to_string(),
            max_retries: 3,
            retry_ttl: Duration::from_secs(86400),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_ttl: std::env::var("QUEUE_RETRY_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_ttl),
        }
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!("{}:retry:{}", self.stream_name, message_id)
    }
}

/// Crop-task queue client.
///
/// Delivery is at-least-once. Tasks are not deduplicated: every enqueue
/// produces a new stream entry.
pub struct CropTaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl CropTaskQueue {
    /// Create a new queue client.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::unreachable(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Check that Redis answers.
    pub async fn check_connectivity(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Enqueue one crop task. Returns the stream message ID.
    pub async fn enqueue(&self, task: &CropTask) -> QueueResult<String> {
        let payload = task.to_json()?;
        let mut conn = self.connection().await?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(TASK_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish(e.to_string()))?;

        debug!(
            object_id = %task.object_id,
            message_id = %message_id,
            "Enqueued crop task"
        );

        Ok(message_id)
    }

    /// Acknowledge a message and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Best effort; the counter expires on its own.
        let _: Result<(), _> = conn.del(self.config.retry_key(message_id)).await;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Move a message to the dead letter queue.
    pub async fn dlq(&self, message: &QueueMessage, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(TASK_FIELD)
            .arg(&message.body)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&message.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&message.message_id).await?;

        warn!(message_id = %message.message_id, "Moved crop task to DLQ: {}", error);
        Ok(())
    }

    /// Read new messages for this consumer.
    ///
    /// Bodies are returned undecoded. Entries without a task field are acked
    /// and skipped.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<QueueMessage>> {
        let mut conn = self.connection().await?;

        let result: StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::consume(e.to_string()))?;

        let entries = result.keys.into_iter().flat_map(|key| key.ids);
        self.collect_messages(entries).await
    }

    /// Claim messages other consumers left pending for at least `min_idle`.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<QueueMessage>> {
        let mut conn = self.connection().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms);
        for entry in &pending.ids {
            cmd.arg(&entry.id);
        }

        let claimed: StreamClaimReply = cmd.query_async(&mut conn).await?;
        if !claimed.ids.is_empty() {
            info!("Claimed {} pending crop tasks", claimed.ids.len());
        }

        self.collect_messages(claimed.ids).await
    }

    async fn collect_messages(
        &self,
        entries: impl IntoIterator<Item = StreamId>,
    ) -> QueueResult<Vec<QueueMessage>> {
        let (messages, malformed) = split_entries(entries);
        for message_id in malformed {
            warn!(message_id = %message_id, "Stream entry has no task payload");
            self.ack(&message_id).await.ok();
        }
        Ok(messages)
    }

    /// Record a failed delivery and return the new count.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.connection().await?;

        let key = self.config.retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, self.config.retry_ttl.as_secs() as i64)
            .await?;
        Ok(count)
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

/// Separate entries carrying a task payload from malformed ones.
fn split_entries(entries: impl IntoIterator<Item = StreamId>) -> (Vec<QueueMessage>, Vec<String>) {
    let mut messages = Vec::new();
    let mut malformed = Vec::new();

    for entry in entries {
        let body = match entry.map.get(TASK_FIELD) {
            Some(redis::Value::BulkString(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Some(redis::Value::SimpleString(s)) => Some(s.clone()),
            _ => None,
        };

        match body {
            Some(body) => messages.push(QueueMessage::new(entry.id, body)),
            None => malformed.push(entry.id),
        }
    }

    (messages, malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn entry(id: &str, fields: &[(&str, redis::Value)]) -> StreamId {
        let mut entry = StreamId::default();
        entry.id = id.to_string();
        entry.map = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>();
        entry
    }

    #[test]
    fn test_split_entries() {
        let body = r#"{"bounds":{"x":0,"y":0,"width":1,"height":1},"objectID":"a"}"#;
        let entries = vec![
            entry("1-0", &[(TASK_FIELD, redis::Value::BulkString(body.as_bytes().to_vec()))]),
            entry("2-0", &[("job", redis::Value::BulkString(b"x".to_vec()))]),
            entry("3-0", &[(TASK_FIELD, redis::Value::BulkString(b"not json".to_vec()))]),
        ];

        let (messages, malformed) = split_entries(entries);

        // Undecodable bodies are passed through; the cropping stage rejects them.
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], QueueMessage::new("1-0", body));
        assert_eq!(messages[1].message_id, "3-0");
        assert_eq!(malformed, vec!["2-0".to_string()]);
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "facetag:crop-tasks");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_key("1-0"), "facetag:crop-tasks:retry:1-0");
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("QUEUE_STREAM", "tasks");
        std::env::set_var("QUEUE_MAX_RETRIES", "5");
        std::env::set_var("QUEUE_RETRY_TTL_SECS", "not-a-number");

        let config = QueueConfig::from_env();
        assert_eq!(config.stream_name, "tasks");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_ttl, Duration::from_secs(86400));
        assert_eq!(config.consumer_group, "facetag:croppers");

        std::env::remove_var("QUEUE_STREAM");
        std::env::remove_var("QUEUE_MAX_RETRIES");
        std::env::remove_var("QUEUE_RETRY_TTL_SECS");
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = QueueConfig {
            redis_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(CropTaskQueue::new(config).is_err());
    }
}
