//! Router fixtures over the in-memory ports.

use std::io::Cursor;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::response::Response;
use axum::Router;
use image::{ImageOutputFormat, Rgb, RgbImage};
use serde_json::Value;
use wiremock::MockServer;

use facetag_models::NormalizedBox;
use facetag_pipeline::memory::{FixedDetector, InMemoryArtifactStore, InMemoryFaceCatalog, InMemoryTaskQueue};
use facetag_pipeline::PipelineConfig;

use crate::checks::ReadinessCheck;
use crate::config::ApiConfig;
use crate::routes::create_router;
use crate::state::{AppState, Ports};
use crate::telegram::{TelegramClient, TelegramConfig};

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryArtifactStore>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub catalog: Arc<InMemoryFaceCatalog>,
    pub detector: Arc<FixedDetector>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(Vec::new(), None, Vec::new())
    }

    pub fn with_boxes(boxes: Vec<NormalizedBox>) -> Self {
        Self::build(boxes, None, Vec::new())
    }

    pub fn with_checks(checks: Vec<Arc<dyn ReadinessCheck>>) -> Self {
        Self::build(Vec::new(), None, checks)
    }

    pub fn with_telegram(server: &MockServer, webhook_secret: Option<&str>) -> Self {
        let bot = TelegramClient::new(TelegramConfig {
            bot_token: "123:abc".to_string(),
            api_base: server.uri(),
            webhook_secret: webhook_secret.map(str::to_string),
            ..Default::default()
        })
        .unwrap();
        Self::build(Vec::new(), Some(bot), Vec::new())
    }

    fn build(
        boxes: Vec<NormalizedBox>,
        telegram: Option<TelegramClient>,
        checks: Vec<Arc<dyn ReadinessCheck>>,
    ) -> Self {
        let store = Arc::new(InMemoryArtifactStore::new());
        let queue = Arc::new(InMemoryTaskQueue::new());
        let catalog = Arc::new(InMemoryFaceCatalog::new());
        let detector = Arc::new(FixedDetector::new(boxes));

        let ports = Ports {
            store: store.clone(),
            sink: queue.clone(),
            catalog: catalog.clone(),
            detector: detector.clone(),
        };
        let state = AppState::new(
            ApiConfig::default(),
            PipelineConfig::default(),
            ports,
            telegram,
            checks,
        );

        Self {
            state,
            store,
            queue,
            catalog,
            detector,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone(), None)
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A solid-color PNG of the given size.
pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([120, 80, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
    out.into_inner()
}
