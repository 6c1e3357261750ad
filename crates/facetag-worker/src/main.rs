//! Crop-task worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use facetag_firestore::{FaceRepository, FirestoreClient};
use facetag_pipeline::{CroppingStage, PipelineConfig};
use facetag_queue::CropTaskQueue;
use facetag_storage::StorageClient;
use facetag_worker::{CropExecutor, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

    init_tracing()?;

    info!("Starting facetag-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start metrics listener")?;
        info!("Metrics listening on {}", addr);
    }

    let storage = StorageClient::from_env()
        .await
        .context("Failed to create storage client")?;
    let firestore = FirestoreClient::from_env()
        .await
        .context("Failed to create Firestore client")?;
    let queue = CropTaskQueue::from_env().context("Failed to create crop task queue")?;

    let stage = CroppingStage::new(
        Arc::new(storage),
        Arc::new(FaceRepository::new(firestore)),
        PipelineConfig::from_env().context("Invalid pipeline config")?,
    );

    let executor = Arc::new(CropExecutor::new(config, queue, stage));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        return Err(e.into());
    }

    info!("Worker shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON for production.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("facetag=info".parse()?)
        .add_directive("aws_config=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
