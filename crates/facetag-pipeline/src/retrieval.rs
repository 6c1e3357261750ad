//! Retrieval: every image containing a face with a given name.

use std::sync::Arc;

use facetag_models::ObjectId;
use tracing::debug;

use crate::error::PipelineResult;
use crate::ports::FaceCatalog;

pub struct RetrievalService {
    catalog: Arc<dyn FaceCatalog>,
}

impl RetrievalService {
    pub fn new(catalog: Arc<dyn FaceCatalog>) -> Self {
        Self { catalog }
    }

    /// Images related to faces named exactly `name` (case-sensitive).
    ///
    /// An image with several faces of that name appears once per face.
    /// A blank name matches nothing.
    pub async fn find_images_by_name(&self, name: &str) -> PipelineResult<Vec<ObjectId>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Vec::new());
        }

        let images = self.catalog.find_images_by_name(name).await?;
        debug!(name = %name, images = images.len(), "Resolved images by name");
        Ok(images)
    }
}
