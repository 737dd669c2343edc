//! Artifact store client.
//!
//! This crate provides:
//! - The `ArtifactStore` interface used by the orchestrator
//! - An S3-compatible implementation for Cloudflare R2
//! - Deterministic key layout for job artifacts
//! - Error classification (transient vs. fatal)

pub mod client;
pub mod error;
pub mod layout;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use store::{content_type_for, ArtifactStore, StoreEntry};
