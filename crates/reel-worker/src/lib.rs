//! Render job orchestration.
//!
//! This crate provides:
//! - Admission control over in-flight jobs
//! - Content safety preprocessing of image prompts
//! - Reuse of previously stored artifacts
//! - Moderation recovery around the renderer
//! - Artifact uploads with retry and a concurrency cap
//! - Job status reporting, operator notifications and completion polling

pub mod admission;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod poller;
pub mod recovery;
pub mod retry;
pub mod reuse;
pub mod safety;
pub mod status;
pub mod upload;
pub mod workdir;

pub use admission::{AdmissionController, AdmissionSlot};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use notify::{FailureNotice, OperatorNotifier, WebhookNotifier};
pub use orchestrator::{JobOrchestrator, JobReport};
pub use poller::{CompletionPoller, PollError};
pub use recovery::{ModerationRecovery, RecoveryReport, RenderAttempt, RenderPlan};
pub use retry::RetryConfig;
pub use reuse::ReuseResolver;
pub use status::StatusReporter;
pub use upload::UploadManager;
pub use workdir::WorkingDirectory;
