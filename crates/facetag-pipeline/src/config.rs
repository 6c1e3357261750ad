//! Pipeline configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Settings shared by the pipeline stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Public base URL of the image-serving endpoint (scheme and host, no trailing slash)
    pub public_base_url: String,
    /// Key prefix of source images; other keys never enter detection
    pub images_prefix: String,
    /// JPEG quality of face crops (1-100)
    pub jpeg_quality: u8,
    /// Bytes read from the start of an image to decode its header
    pub header_probe_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8000".to_string(),
            images_prefix: "images/".to_string(),
            jpeg_quality: 90,
            header_probe_bytes: 64 * 1024,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            images_prefix: std::env::var("STORAGE_IMAGES_PREFIX").unwrap_or(defaults.images_prefix),
            jpeg_quality: std::env::var("CROP_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse::<u8>().ok())
                .map(|q| q.clamp(1, 100))
                .unwrap_or(defaults.jpeg_quality),
            header_probe_bytes: std::env::var("DETECTION_HEADER_PROBE_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.header_probe_bytes),
        };
        config.validate()?;
        Ok(config)
    }

    /// An empty images prefix would feed face crops back into detection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images_prefix.is_empty() {
            return Err(ConfigError::Empty("STORAGE_IMAGES_PREFIX"));
        }
        Ok(())
    }

    /// URL at which the detection provider can fetch an image.
    pub fn image_url(&self, object_id: &str) -> String {
        format!(
            "{}/?image={}",
            self.public_base_url,
            urlencoding::encode(object_id)
        )
    }

    /// URL at which the chat client can fetch a face crop.
    pub fn face_url(&self, face_id: &str) -> String {
        format!(
            "{}/?face={}",
            self.public_base_url,
            urlencoding::encode(face_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_urls() {
        let config = PipelineConfig {
            public_base_url: "https://gw.example".to_string(),
            ..Default::default()
        };
        assert_eq!(config.image_url("img1"), "https://gw.example/?image=img1");
        assert_eq!(
            config.image_url("a b/c.jpg"),
            "https://gw.example/?image=a%20b%2Fc.jpg"
        );
        assert_eq!(config.face_url("f1"), "https://gw.example/?face=f1");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("PUBLIC_BASE_URL", "https://gw.example/");
        std::env::set_var("CROP_JPEG_QUALITY", "0");
        std::env::remove_var("DETECTION_HEADER_PROBE_BYTES");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.public_base_url, "https://gw.example");
        assert_eq!(config.jpeg_quality, 1);
        assert_eq!(config.header_probe_bytes, 65536);

        std::env::remove_var("PUBLIC_BASE_URL");
        std::env::remove_var("CROP_JPEG_QUALITY");
    }

    #[test]
    #[serial]
    fn test_empty_images_prefix_is_rejected() {
        std::env::set_var("STORAGE_IMAGES_PREFIX", "");
        assert!(matches!(
            PipelineConfig::from_env(),
            Err(ConfigError::Empty("STORAGE_IMAGES_PREFIX"))
        ));
        std::env::remove_var("STORAGE_IMAGES_PREFIX");

        let config = PipelineConfig {
            images_prefix: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }
}
