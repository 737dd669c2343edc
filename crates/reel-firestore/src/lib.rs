//! Firestore REST API client and job status persistence.
//!
//! This crate provides:
//! - A minimal Firestore document client (get / upsert)
//! - Service account authentication via gcp_auth, or the local emulator
//! - Retry with backoff and request metrics
//! - The `JobStatusStore` interface and its Firestore implementation

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod status_store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use retry::RetryConfig;
pub use status_store::{FirestoreJobStatusStore, InMemoryJobStatusStore, JobStatusStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
