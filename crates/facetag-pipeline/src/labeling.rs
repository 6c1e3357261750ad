//! Labeling: hand out unlabeled faces and record the names operators give them.

use std::sync::Arc;

use facetag_models::FaceId;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::ports::FaceCatalog;

pub struct LabelingService {
    catalog: Arc<dyn FaceCatalog>,
}

impl LabelingService {
    pub fn new(catalog: Arc<dyn FaceCatalog>) -> Self {
        Self { catalog }
    }

    /// Some face without a name, or `None` when every face is labeled.
    ///
    /// Does not reserve the face: two callers may get the same one and the
    /// later assignment wins.
    pub async fn next_unlabeled(&self) -> PipelineResult<Option<FaceId>> {
        self.catalog.next_unlabeled().await
    }

    /// Set or overwrite the name of a face.
    pub async fn assign_name(&self, face_id: &FaceId, name: &str) -> PipelineResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PipelineError::InvalidName("name is empty".to_string()));
        }

        self.catalog.assign_name(face_id, name).await?;
        info!(face_id = %face_id, name = %name, "Labeled face");
        Ok(())
    }
}
