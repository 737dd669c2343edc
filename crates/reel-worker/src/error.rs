//! Worker error types.

use reel_models::JobValidationError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job request: {0}")]
    Validation(String),

    #[error("Too many concurrent jobs ({active}/{max})")]
    AdmissionRejected { active: usize, max: usize },

    #[error("Render timed out: {0}")]
    RenderTimeout(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Image moderation could not be resolved after {attempts} renders: {message}")]
    ModerationExhausted { attempts: u32, message: String },

    #[error("Upload of {key} failed after {attempts} attempts: {message}")]
    UploadTransient {
        key: String,
        attempts: u32,
        message: String,
    },

    #[error("Upload of {key} failed: {message}")]
    UploadFatal { key: String, message: String },

    #[error("Failed to persist job status: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Renderer error: {0}")]
    Render(#[from] reel_render::RenderError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<JobValidationError> for WorkerError {
    fn from(err: JobValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render_failed(msg: impl Into<String>) -> Self {
        Self::RenderFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Stable label for metrics.
    pub fn kind_label(&self) -> &'static str {
        match self {
            WorkerError::Validation(_) => "validation",
            WorkerError::AdmissionRejected { .. } => "admission_rejected",
            WorkerError::RenderTimeout(_) => "render_timeout",
            WorkerError::RenderFailed(_) | WorkerError::Render(_) => "render_failed",
            WorkerError::ModerationExhausted { .. } => "moderation_exhausted",
            WorkerError::UploadTransient { .. } => "upload_transient",
            WorkerError::UploadFatal { .. } => "upload_fatal",
            WorkerError::Persistence(_) => "persistence",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Storage(_) => "storage",
            WorkerError::Json(_) | WorkerError::Io(_) => "internal",
        }
    }

    /// Errors the caller should see synchronously, before any job state exists.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WorkerError::Validation(_) | WorkerError::AdmissionRejected { .. }
        )
    }

    /// Whether the failure came from content moderation.
    pub fn is_moderation(&self) -> bool {
        matches!(self, WorkerError::ModerationExhausted { .. })
    }
}
