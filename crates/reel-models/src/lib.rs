//! Shared data models for the ReelForge render orchestrator.
//!
//! This crate provides Serde-serializable types for:
//! - Job requests, kinds and identifiers
//! - Script documents (beats, images, captions)
//! - Persisted job status and metrics
//! - Uploaded artifact descriptors
//! - Webhook envelopes

pub mod artifact;
pub mod job;
pub mod job_status;
pub mod script;
pub mod webhook;

// Re-export common types
pub use artifact::{ArtifactSummary, UploadedFile, VideoMetadata};
pub use job::{JobId, JobKind, JobRequest, JobSubmission, JobValidationError};
pub use job_status::{JobMetrics, JobPhase, JobStatusRecord};
pub use script::{Beat, BeatImage, CaptionConfig, MediaSource, ScriptDocument};
pub use webhook::{WebhookEnvelope, WebhookType};
