//! Request and response types of the detection API.

use facetag_models::NormalizedBox;
use serde::{Deserialize, Serialize};

/// Detection request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    /// Comma-separated provider names; one is used.
    pub providers: String,
    /// Publicly reachable URL of the image.
    pub file_url: String,
}

/// Result block of one provider, keyed by the provider name in the response.
///
/// Unknown fields (landmarks, emotions, confidence, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResult {
    #[serde(default)]
    pub status: Option<String>,
    pub items: Vec<ProviderItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderItem {
    pub bounding_box: ProviderBoundingBox,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProviderBoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl From<ProviderBoundingBox> for NormalizedBox {
    fn from(b: ProviderBoundingBox) -> Self {
        NormalizedBox::new(b.x_min, b.x_max, b.y_min, b.y_max)
    }
}
