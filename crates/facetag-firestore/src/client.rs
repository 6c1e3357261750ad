//! Firestore REST API client.
//!
//! Covers the handful of document operations the face repository needs,
//! each wrapped in a tracing span with request metrics. The client performs
//! no retries of its own; the only repeated request is the one re-sent after
//! an expired access token has been refreshed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{info, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::token_cache::TokenCache;
use crate::types::{
    CommitRequest, CommitResponse, Document, RunQueryRequest, RunQueryResponse, StructuredQuery,
    Value, Write,
};

/// Token the Firestore emulator accepts.
const EMULATOR_TOKEN: &str = "owner";

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// `host:port` of a local emulator; skips Google authentication
    pub emulator_host: Option<String>,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: "facetag".to_string(),
            database_id: "(default)".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            emulator_host: None,
        }
    }
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let defaults = Self::default();
        let secs = |var: &str, default: Duration| {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID").unwrap_or(defaults.database_id),
            timeout: secs("FIRESTORE_TIMEOUT_SECS", defaults.timeout),
            connect_timeout: secs("FIRESTORE_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
        })
    }

    fn documents_path(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }
}

// =============================================================================
// Client
// =============================================================================

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        match config.emulator_host.clone() {
            Some(host) => {
                info!(host = %host, "Using Firestore emulator");
                let base_url = format!("http://{}/v1/{}", host, config.documents_path());
                Self::with_base_url(config, base_url, TokenCache::fixed(EMULATOR_TOKEN))
            }
            None => {
                let auth = Self::create_auth_provider()?;
                let base_url = format!(
                    "https://firestore.googleapis.com/v1/{}",
                    config.documents_path()
                );
                Self::with_base_url(config, base_url, TokenCache::new(auth))
            }
        }
    }

    /// Create a client against an explicit documents endpoint.
    pub fn with_base_url(
        config: FirestoreConfig,
        base_url: impl Into<String>,
        token_cache: TokenCache,
    ) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("facetag-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        Ok(Self {
            http,
            config,
            base_url: base_url.into(),
            token_cache: Arc::new(token_cache),
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        )
    }

    /// Whether Firestore accepts `doc_id` as a document id.
    ///
    /// Ids cannot be empty, contain `/`, be `.` or `..`, match `__.*__`, or
    /// exceed 1500 bytes.
    pub fn is_valid_document_id(doc_id: &str) -> bool {
        !doc_id.is_empty()
            && doc_id.len() <= 1500
            && !doc_id.contains('/')
            && doc_id != "."
            && doc_id != ".."
            && !(doc_id.len() >= 4 && doc_id.starts_with("__") && doc_id.ends_with("__"))
    }

    /// Full resource name used inside commit requests.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.config.documents_path(), collection, doc_id)
    }

    /// Send a request, refreshing the token once if Firestore reports it expired.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.token_cache.get_token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(401, body));
        }

        self.token_cache.invalidate().await;
        let token = self.token_cache.get_token().await?;
        Ok(build(&token).send().await?)
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Get a document. Returns `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self.send(|token| self.http.get(&url).bearer_auth(token)).await?;

            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Update the masked fields of an existing document.
    ///
    /// Fails with [`FirestoreError::NotFound`] instead of creating the
    /// document when it is missing.
    pub async fn update_existing_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: &[&str],
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = update_mask
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        params.push("currentDocument.exists=true".to_string());
        let url = format!(
            "{}?{}",
            self.document_url(collection, doc_id),
            params.join("&")
        );

        let body = Document::new(fields);

        self.execute_request("update_document", collection, Some(doc_id), async {
            let response = self
                .send(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Apply writes atomically: either all of them land or none does.
    pub async fn commit(&self, writes: Vec<Write>) -> FirestoreResult<CommitResponse> {
        let url = format!("{}:commit", self.base_url);
        let request = CommitRequest { writes };

        self.execute_request("commit", "batch", None, async {
            let response = self
                .send(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;

            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Run a structured query over top-level collections.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let request = RunQueryRequest {
            structured_query: query,
        };

        self.execute_request("run_query", &collection, None, async {
            let response = self
                .send(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.unwrap_or_default();
                    // runQuery returns a JSON array; entries without a document carry only readTime
                    let responses: Vec<RunQueryResponse> =
                        serde_json::from_str(&body).map_err(|e| {
                            FirestoreError::request_failed(format!(
                                "Failed to parse runQuery response: {} (body prefix: {})",
                                e,
                                &body[..body.len().min(200)]
                            ))
                        })?;

                    Ok(responses.into_iter().filter_map(|r| r.document).collect())
                }
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Execute a request with tracing and metrics.
    async fn execute_request<T, F>(
        &self,
        operation: &'static str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = if let Some(id) = doc_id {
            info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id)
        } else {
            info_span!("firestore_request", operation = %operation, collection = %collection)
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(0),
        };
        record_request(operation, status, start.elapsed());

        result
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Filter, ToFirestoreValue};
    use serde_json::json;
    use serial_test::serial;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) const DOCS_PATH: &str = "/v1/projects/test-project/databases/(default)/documents";

    pub(crate) fn test_client(server: &MockServer) -> FirestoreClient {
        let config = FirestoreConfig {
            project_id: "test-project".to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        FirestoreClient::with_base_url(
            config,
            format!("{}{}", server.uri(), DOCS_PATH),
            TokenCache::fixed("test-token"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_document_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/names/missing", DOCS_PATH)))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "status": "NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert!(client.get_document("names", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_existing_sends_mask_and_precondition() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/names/abc", DOCS_PATH)))
            .and(query_param("updateMask.fieldPaths", "FaceName"))
            .and(query_param("currentDocument.exists", "true"))
            .and(body_partial_json(json!({
                "fields": {"FaceName": {"stringValue": "Alice"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/databases/(default)/documents/names/abc",
                "fields": {"FaceName": {"stringValue": "Alice"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let fields = HashMap::from([("FaceName".to_string(), "Alice".to_firestore_value())]);
        let doc = client
            .update_existing_document("names", "abc", fields, &["FaceName"])
            .await
            .unwrap();
        assert_eq!(doc.id(), Some("abc"));
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "No document to update", "status": "NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let fields = HashMap::from([("FaceName".to_string(), "Bob".to_firestore_value())]);
        let err = client
            .update_existing_document("names", "nope", fields, &["FaceName"])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_run_query_skips_read_time_only_entries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:runQuery", DOCS_PATH)))
            .and(body_partial_json(json!({
                "structuredQuery": {"from": [{"collectionId": "names"}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"readTime": "2024-05-01T10:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let query = StructuredQuery::collection("names").filter(Filter::is_null("FaceName"));
        assert!(client.run_query(query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_error_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:commit", DOCS_PATH)))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.commit(vec![]).await.unwrap_err();
        assert!(matches!(err, FirestoreError::ServerError(503, _)));
    }

    #[tokio::test]
    async fn test_non_expired_401_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.get_document("names", "abc").await.unwrap_err();
        assert!(matches!(err, FirestoreError::AuthError(_)));
    }

    #[test]
    fn test_full_document_name() {
        let config = FirestoreConfig {
            project_id: "p".to_string(),
            ..Default::default()
        };
        let client =
            FirestoreClient::with_base_url(config, "http://localhost", TokenCache::fixed("t")).unwrap();
        assert_eq!(
            client.full_document_name("relations", "f1"),
            "projects/p/databases/(default)/documents/relations/f1"
        );
    }

    #[test]
    fn test_document_id_rules() {
        assert!(FirestoreClient::is_valid_document_id("0b8e6f5c-2c1d-4c7e-9a55-1f3c2d7a9b10"));
        assert!(FirestoreClient::is_valid_document_id("Mary_Jane"));
        assert!(FirestoreClient::is_valid_document_id("__"));
        assert!(!FirestoreClient::is_valid_document_id(""));
        assert!(!FirestoreClient::is_valid_document_id("a/b"));
        assert!(!FirestoreClient::is_valid_document_id("."));
        assert!(!FirestoreClient::is_valid_document_id("__name__"));
        assert!(!FirestoreClient::is_valid_document_id(&"x".repeat(1501)));
    }

    #[test]
    #[serial]
    fn test_config_from_env_validates_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(FirestoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_from_env_reads_emulator() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");

        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.project_id, "test-project");
        assert_eq!(config.emulator_host.as_deref(), Some("localhost:8080"));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));

        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
    }
}
