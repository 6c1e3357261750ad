//! Dependency checks behind the readiness probe.

use async_trait::async_trait;

use facetag_firestore::FirestoreClient;
use facetag_queue::CropTaskQueue;
use facetag_storage::StorageClient;

/// A backing service the API needs to serve traffic.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), String>;
}

#[async_trait]
impl ReadinessCheck for CropTaskQueue {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn check(&self) -> Result<(), String> {
        self.check_connectivity().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ReadinessCheck for StorageClient {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn check(&self) -> Result<(), String> {
        self.check_connectivity().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ReadinessCheck for FirestoreClient {
    fn name(&self) -> &'static str {
        "firestore"
    }

    /// A missing document still proves Firestore is reachable.
    async fn check(&self) -> Result<(), String> {
        self.get_document("_health", "_check")
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
