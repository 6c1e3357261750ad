//! Persisted face records and image relations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FaceId, ObjectId};

/// A row of the `names` table.
///
/// `face_name` is `None` until an operator labels the face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRecord {
    #[serde(rename = "FaceID")]
    pub face_id: FaceId,
    #[serde(rename = "FaceName")]
    pub face_name: Option<String>,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

impl FaceRecord {
    /// A freshly extracted, unlabeled face.
    pub fn unlabeled(face_id: FaceId) -> Self {
        Self {
            face_id,
            face_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_labeled(&self) -> bool {
        self.face_name.is_some()
    }
}

/// A row of the `relations` table linking a source image to one of its faces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "ImageID")]
    pub image_id: ObjectId,
    #[serde(rename = "FaceID")]
    pub face_id: FaceId,
}

impl Relation {
    pub fn new(image_id: ObjectId, face_id: FaceId) -> Self {
        Self { image_id, face_id }
    }
}
