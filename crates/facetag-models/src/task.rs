//! Crop tasks handed from detection to cropping.

use serde::{Deserialize, Serialize};

use crate::geometry::FaceBounds;
use crate::ids::ObjectId;

/// One face to cut out of one source image.
///
/// The serialized form is the queue payload and must stay byte-compatible:
/// `{"bounds":{"x":..,"y":..,"width":..,"height":..},"objectID":".."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropTask {
    pub bounds: FaceBounds,
    #[serde(rename = "objectID")]
    pub object_id: ObjectId,
}

impl CropTask {
    pub fn new(object_id: ObjectId, bounds: FaceBounds) -> Self {
        Self { bounds, object_id }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a task, rejecting anything that is not a complete task.
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}
