//! S3-compatible artifact store client.
//!
//! This crate provides:
//! - Key layout for source images and extracted face crops
//! - Byte upload/download, including ranged reads of an object prefix
//! - Existence and connectivity checks

pub mod client;
pub mod error;
pub mod keys;

pub use client::{StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use keys::KeyLayout;
