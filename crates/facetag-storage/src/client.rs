//! S3-compatible storage client implementation.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::keys::KeyLayout;

/// Configuration for the storage client.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket holding both images and face crops
    pub bucket_name: String,
    /// Region ("auto" works for most S3-compatible providers)
    pub region: String,
    /// Key prefix of uploaded source images
    pub images_prefix: String,
    /// Key prefix of extracted face crops
    pub faces_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let layout = KeyLayout::default();
        Self {
            endpoint_url: "http://localhost:9000".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket_name: "facetag".to_string(),
            region: "auto".to_string(),
            images_prefix: layout.images_prefix,
            faces_prefix: layout.faces_prefix,
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let defaults = Self::default();
        let images_prefix =
            std::env::var("STORAGE_IMAGES_PREFIX").unwrap_or(defaults.images_prefix);
        if images_prefix.is_empty() {
            return Err(StorageError::config_error("STORAGE_IMAGES_PREFIX must not be empty"));
        }
        Ok(Self {
            endpoint_url: std::env::var("STORAGE_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("STORAGE_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("STORAGE_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("STORAGE_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("STORAGE_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("STORAGE_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("STORAGE_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("STORAGE_BUCKET_NAME not set"))?,
            region: std::env::var("STORAGE_REGION").unwrap_or(defaults.region),
            images_prefix,
            faces_prefix: std::env::var("STORAGE_FACES_PREFIX").unwrap_or(defaults.faces_prefix),
        })
    }

    pub fn layout(&self) -> KeyLayout {
        KeyLayout {
            images_prefix: self.images_prefix.clone(),
            faces_prefix: self.faces_prefix.clone(),
        }
    }
}

/// Leading bytes of an object.
#[derive(Debug, Clone)]
pub struct ObjectPrefix {
    pub bytes: Vec<u8>,
    /// True when `bytes` holds the whole object.
    pub complete: bool,
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    bucket: String,
    layout: KeyLayout,
}

impl StorageClient {
    /// Create a new client from configuration.
    pub async fn new(config: StorageConfig) -> StorageResult<Self> {
        let layout = config.layout();
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "facetag-storage",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(sdk_config);

        info!(bucket = %config.bucket_name, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket_name,
            layout,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = StorageConfig::from_env()?;
        Self::new(config).await
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Upload bytes.
    pub async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::write_failed(e.to_string()))?;

        Ok(())
    }

    /// Download object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
                    StorageError::not_found(key)
                } else {
                    StorageError::read_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::read_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    /// Download at most `max_bytes` leading bytes of an object.
    ///
    /// Zero-length objects reject any range, so they come back as an empty,
    /// complete prefix.
    pub async fn download_prefix(&self, key: &str, max_bytes: u64) -> StorageResult<ObjectPrefix> {
        if max_bytes == 0 {
            return Err(StorageError::read_failed("prefix length must be positive"));
        }
        debug!("Downloading first {} bytes of {}", max_bytes, key);

        let range = format!("bytes=0-{}", max_bytes - 1);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(range)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let service = e.as_service_error();
                if service.is_some_and(GetObjectError::is_no_such_key) {
                    return Err(StorageError::not_found(key));
                }
                if service.and_then(|se| se.code()) == Some("InvalidRange") {
                    return Ok(ObjectPrefix {
                        bytes: Vec::new(),
                        complete: true,
                    });
                }
                return Err(StorageError::read_failed(e.to_string()));
            }
        };

        let total = response.content_range().and_then(total_from_content_range);

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::read_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        let complete = match total {
            Some(total) => bytes.len() as u64 >= total,
            None => (bytes.len() as u64) < max_bytes,
        };

        Ok(ObjectPrefix { bytes, complete })
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(e.to_string()))
                }
            }
        }
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("Storage connectivity check failed: {}", e)))?;
        Ok(())
    }
}

/// Parse the object size out of a `Content-Range` header (`bytes 0-99/1234`).
fn total_from_content_range(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}
