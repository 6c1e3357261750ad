//! Application state.

use std::sync::Arc;

use facetag_detection::DetectionClient;
use facetag_firestore::{FaceRepository, FirestoreClient};
use facetag_pipeline::{
    ArtifactStore, CropTaskSink, CroppingStage, DetectionStage, FaceCatalog, FaceDetector,
    LabelingService, PipelineConfig, RetrievalService,
};
use facetag_queue::CropTaskQueue;
use facetag_storage::StorageClient;
use tracing::info;

use crate::checks::ReadinessCheck;
use crate::config::ApiConfig;
use crate::telegram::{TelegramClient, TelegramConfig};

/// The collaborators the pipeline stages run against.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn ArtifactStore>,
    pub sink: Arc<dyn CropTaskSink>,
    pub catalog: Arc<dyn FaceCatalog>,
    pub detector: Arc<dyn FaceDetector>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: PipelineConfig,
    pub store: Arc<dyn ArtifactStore>,
    pub detection: Arc<DetectionStage>,
    pub cropping: Arc<CroppingStage>,
    pub labeling: Arc<LabelingService>,
    pub retrieval: Arc<RetrievalService>,
    /// `None` when no bot token is configured
    pub telegram: Option<Arc<TelegramClient>>,
    pub checks: Arc<Vec<Arc<dyn ReadinessCheck>>>,
}

impl AppState {
    /// Wire the stages and workflows over a set of ports.
    pub fn new(
        config: ApiConfig,
        pipeline: PipelineConfig,
        ports: Ports,
        telegram: Option<TelegramClient>,
        checks: Vec<Arc<dyn ReadinessCheck>>,
    ) -> Self {
        let detection = DetectionStage::new(
            Arc::clone(&ports.store),
            ports.detector,
            ports.sink,
            pipeline.clone(),
        );
        let cropping = CroppingStage::new(
            Arc::clone(&ports.store),
            Arc::clone(&ports.catalog),
            pipeline.clone(),
        );

        Self {
            config,
            pipeline,
            store: ports.store,
            detection: Arc::new(detection),
            cropping: Arc::new(cropping),
            labeling: Arc::new(LabelingService::new(Arc::clone(&ports.catalog))),
            retrieval: Arc::new(RetrievalService::new(ports.catalog)),
            telegram: telegram.map(Arc::new),
            checks: Arc::new(checks),
        }
    }

    /// Build the production clients from environment variables.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let storage = Arc::new(StorageClient::from_env().await?);
        let firestore = FirestoreClient::from_env().await?;
        let queue = Arc::new(CropTaskQueue::from_env()?);
        let detector = Arc::new(DetectionClient::from_env()?);

        let telegram_config = TelegramConfig::from_env();
        let telegram = if telegram_config.is_configured() {
            Some(TelegramClient::new(telegram_config)?)
        } else {
            info!("TELEGRAM_BOT_TOKEN not set, chat webhook disabled");
            None
        };

        let checks: Vec<Arc<dyn ReadinessCheck>> = vec![
            Arc::clone(&queue) as Arc<dyn ReadinessCheck>,
            Arc::new(firestore.clone()) as Arc<dyn ReadinessCheck>,
            Arc::clone(&storage) as Arc<dyn ReadinessCheck>,
        ];

        let ports = Ports {
            store: storage,
            sink: queue,
            catalog: Arc::new(FaceRepository::new(firestore)),
            detector,
        };

        Ok(Self::new(config, PipelineConfig::from_env()?, ports, telegram, checks))
    }
}
