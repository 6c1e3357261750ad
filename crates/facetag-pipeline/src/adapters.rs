//! Port implementations over the production clients.

use async_trait::async_trait;
use tracing::debug;

use facetag_detection::DetectionClient;
use facetag_firestore::FaceRepository;
use facetag_models::{CropTask, FaceId, FaceRecord, NormalizedBox, ObjectId, Relation};
use facetag_queue::CropTaskQueue;
use facetag_storage::StorageClient;

use crate::error::{PipelineError, PipelineResult};
use crate::ports::{ArtifactStore, CropTaskSink, FaceCatalog, FaceDetector, ObjectHead};

const JPEG_CONTENT_TYPE: &str = "image/jpeg";

#[async_trait]
impl ArtifactStore for StorageClient {
    async fn read_image_head(&self, id: &ObjectId, max_bytes: u64) -> PipelineResult<Option<ObjectHead>> {
        let key = self.layout().image_key(id);
        match self.download_prefix(&key, max_bytes).await {
            Ok(prefix) => Ok(Some(ObjectHead {
                bytes: prefix.bytes,
                complete: prefix.complete,
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(PipelineError::artifact_read(key, e)),
        }
    }

    async fn read_image(&self, id: &ObjectId) -> PipelineResult<Option<Vec<u8>>> {
        let key = self.layout().image_key(id);
        read_optional(self, key).await
    }

    async fn read_face(&self, face_ref: &str) -> PipelineResult<Option<Vec<u8>>> {
        let key = self.layout().face_key_for_ref(face_ref);
        read_optional(self, key).await
    }

    async fn write_face(&self, id: &FaceId, jpeg: Vec<u8>) -> PipelineResult<()> {
        let key = self.layout().face_key(id);
        self.upload_bytes(jpeg, &key, JPEG_CONTENT_TYPE)
            .await
            .map_err(|e| PipelineError::Persist(e.to_string()))?;
        debug!(key = %key, "Stored face crop");
        Ok(())
    }
}

async fn read_optional(client: &StorageClient, key: String) -> PipelineResult<Option<Vec<u8>>> {
    match client.download_bytes(&key).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(PipelineError::artifact_read(key, e)),
    }
}

#[async_trait]
impl CropTaskSink for CropTaskQueue {
    async fn enqueue(&self, task: &CropTask) -> PipelineResult<()> {
        CropTaskQueue::enqueue(self, task)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::Enqueue(e.to_string()))
    }
}

#[async_trait]
impl FaceCatalog for FaceRepository {
    async fn insert_face(&self, face: &FaceRecord, relation: &Relation) -> PipelineResult<()> {
        FaceRepository::insert_face(self, face, relation)
            .await
            .map_err(store_error)
    }

    async fn next_unlabeled(&self) -> PipelineResult<Option<FaceId>> {
        FaceRepository::next_unlabeled(self).await.map_err(store_error)
    }

    async fn assign_name(&self, face_id: &FaceId, name: &str) -> PipelineResult<()> {
        FaceRepository::assign_name(self, face_id, name)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    PipelineError::UnknownFace(face_id.clone())
                } else {
                    store_error(e)
                }
            })
    }

    async fn find_images_by_name(&self, name: &str) -> PipelineResult<Vec<ObjectId>> {
        FaceRepository::find_images_by_name(self, name)
            .await
            .map_err(store_error)
    }
}

fn store_error(e: facetag_firestore::FirestoreError) -> PipelineError {
    PipelineError::Store(e.to_string())
}

#[async_trait]
impl FaceDetector for DetectionClient {
    async fn detect(&self, file_url: &str) -> PipelineResult<Vec<NormalizedBox>> {
        self.detect_faces(file_url)
            .await
            .map_err(|e| PipelineError::DetectionProvider(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetag_detection::DetectionClientConfig;
    use facetag_firestore::token_cache::TokenCache;
    use facetag_firestore::{FirestoreClient, FirestoreConfig};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repository(server: &MockServer) -> FaceRepository {
        let config = FirestoreConfig {
            project_id: "test-project".to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let client = FirestoreClient::with_base_url(
            config,
            format!(
                "{}/v1/projects/test-project/databases/(default)/documents",
                server.uri()
            ),
            TokenCache::fixed("test-token"),
        )
        .unwrap();
        FaceRepository::new(client)
    }

    #[tokio::test]
    async fn test_missing_face_maps_to_unknown_face() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "No document to update", "status": "NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        let catalog: &dyn FaceCatalog = &repository(&server);
        let err = catalog
            .assign_name(&FaceId::from_string("ghost"), "Bob")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownFace(id) if id.as_str() == "ghost"));
    }

    #[tokio::test]
    async fn test_store_outage_maps_to_store_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let catalog: &dyn FaceCatalog = &repository(&server);
        let err = catalog.next_unlabeled().await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(_)));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_detection_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "amazon": {"status": "fail", "error": {"message": "Invalid image"}}
            })))
            .mount(&server)
            .await;

        let detector = DetectionClient::new(DetectionClientConfig {
            api_url: format!("{}/v2/image/face_detection", server.uri()),
            api_token: "token".to_string(),
            ..Default::default()
        })
        .unwrap();

        let err = FaceDetector::detect(&detector, "https://gw.example/?image=img1")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DetectionProvider(msg) if msg.contains("Invalid image")));
    }
}
