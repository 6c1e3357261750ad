//! Firestore REST API client.
//!
//! This crate provides:
//! - A thin REST client (get, conditional patch, structured query, atomic commit)
//! - The face repository over the `names` and `relations` collections
//! - Service account authentication via gcp_auth, or a static token for the emulator

pub mod client;
pub mod error;
pub mod face_repo;
pub mod metrics;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use face_repo::{FaceRepository, NAMES_COLLECTION, RELATIONS_COLLECTION};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
