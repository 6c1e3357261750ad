//! Detection API HTTP client.

use std::time::Duration;

use facetag_models::NormalizedBox;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{DetectionError, DetectionResult};
use crate::types::{DetectionRequest, ProviderResult};

/// Configuration for the detection client.
#[derive(Debug, Clone)]
pub struct DetectionClientConfig {
    /// Face detection endpoint
    pub api_url: String,
    /// Bearer token; comes from the environment only
    pub api_token: String,
    /// Provider to run and to read results from
    pub provider: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for DetectionClientConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.edenai.run/v2/image/face_detection".to_string(),
            api_token: String::new(),
            provider: "amazon".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl DetectionClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> DetectionResult<Self> {
        let defaults = Self::default();
        let api_token = std::env::var("DETECTION_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DetectionError::Config("DETECTION_API_TOKEN not set".to_string()))?;

        Ok(Self {
            api_url: std::env::var("DETECTION_API_URL").unwrap_or(defaults.api_url),
            api_token,
            provider: std::env::var("DETECTION_PROVIDER").unwrap_or(defaults.provider),
            timeout: std::env::var("DETECTION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        })
    }
}

/// Client for the face detection API.
///
/// Every call is a single attempt; failures go back to the caller.
pub struct DetectionClient {
    http: Client,
    config: DetectionClientConfig,
}

impl DetectionClient {
    pub fn new(config: DetectionClientConfig) -> DetectionResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DetectionError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> DetectionResult<Self> {
        Self::new(DetectionClientConfig::from_env()?)
    }

    /// Detect faces in the image served at `file_url`.
    pub async fn detect_faces(&self, file_url: &str) -> DetectionResult<Vec<NormalizedBox>> {
        let request = DetectionRequest {
            providers: self.config.provider.clone(),
            file_url: file_url.to_string(),
        };

        debug!(file_url = %file_url, "Sending face detection request");

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectionError::RequestFailed(format!(
                "Detection API returned {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DetectionError::schema_mismatch(format!("body is not JSON: {}", e)))?;

        let boxes = parse_provider_result(&body, &self.config.provider)?;
        debug!(faces = boxes.len(), "Face detection finished");
        Ok(boxes)
    }
}

/// Extract the boxes of `provider` from a detection response body.
fn parse_provider_result(
    body: &serde_json::Value,
    provider: &str,
) -> DetectionResult<Vec<NormalizedBox>> {
    let block = body
        .get(provider)
        .ok_or_else(|| DetectionError::schema_mismatch(format!("missing `{}` result", provider)))?;

    if let Some(status) = block.get("status").and_then(|s| s.as_str()) {
        if status != "success" {
            let message = block
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or(status);
            warn!(provider = %provider, status = %status, "Detection provider failed");
            return Err(DetectionError::ProviderFailed(message.to_string()));
        }
    }

    let result: ProviderResult = serde_json::from_value(block.clone())
        .map_err(|e| DetectionError::schema_mismatch(e.to_string()))?;

    Ok(result
        .items
        .into_iter()
        .map(|item| item.bounding_box.into())
        .collect())
}
