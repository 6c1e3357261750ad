//! Client for the third-party face detection API.
//!
//! The provider fetches the image itself from a public URL and answers with
//! one normalized bounding box per detected face.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DetectionClient, DetectionClientConfig};
pub use error::{DetectionError, DetectionResult};
pub use types::{DetectionRequest, ProviderBoundingBox, ProviderItem, ProviderResult};
