//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum batches processed concurrently
    pub max_concurrent_batches: usize,
    /// Messages read per poll
    pub batch_size: usize,
    /// How long a poll blocks waiting for new messages
    pub block_ms: u64,
    /// How often to look for messages abandoned by other consumers
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Consumer name inside the consumer group; random when unset
    pub consumer_name: Option<String>,
    /// Port of the Prometheus scrape listener; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_batches: 2,
            batch_size: 10,
            block_ms: 1000,
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            shutdown_timeout: Duration::from_secs(30),
            consumer_name: None,
            metrics_port: Some(9100),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_batches: env_parse("WORKER_MAX_BATCHES")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_batches),
            batch_size: env_parse("WORKER_BATCH_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            block_ms: env_parse("WORKER_BLOCK_MS").unwrap_or(defaults.block_ms),
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("WORKER_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            consumer_name: std::env::var("WORKER_CONSUMER_NAME")
                .ok()
                .filter(|s| !s.is_empty()),
            metrics_port: match std::env::var("WORKER_METRICS_PORT") {
                Ok(s) if s.is_empty() || s == "0" => None,
                Ok(s) => s.parse().ok().or(defaults.metrics_port),
                Err(_) => defaults.metrics_port,
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
