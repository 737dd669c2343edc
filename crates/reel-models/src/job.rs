//! Job definitions for render orchestration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::script::ScriptDocument;

/// Errors raised while validating an inbound job submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobValidationError {
    #[error("Invalid {field}: '{value}' is not a UUID")]
    InvalidId { field: &'static str, value: String },

    #[error("Missing {0}")]
    Missing(&'static str),
}

/// Unique identifier for a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID, requiring a well-formed UUID.
    pub fn parse(s: &str) -> Result<Self, JobValidationError> {
        parse_uuid("jobId", s).map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of artifact a job produces.
///
/// The kind selects the renderer mode, the storage subpath, and whether the
/// result is a single file or a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Full narrated video
    Video,
    /// Per-beat images only
    ImagePreview,
    /// Per-beat narration audio only
    AudioPreview,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Video => "video",
            JobKind::ImagePreview => "image_preview",
            JobKind::AudioPreview => "audio_preview",
        }
    }

    /// Parse from the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(JobKind::Video),
            "image_preview" => Some(JobKind::ImagePreview),
            "audio_preview" => Some(JobKind::AudioPreview),
            _ => None,
        }
    }

    /// Path segment used for this kind in the artifact store.
    pub fn storage_segment(&self) -> &'static str {
        match self {
            JobKind::Video => "video",
            JobKind::ImagePreview => "image-preview",
            JobKind::AudioPreview => "audio-preview",
        }
    }

    /// Video jobs produce a single file; previews produce a tree.
    pub fn is_single_file(&self) -> bool {
        matches!(self, JobKind::Video)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job submission as received on the wire, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    /// Job identifier (UUID string)
    #[serde(default, alias = "videoId")]
    pub job_id: Option<String>,

    /// Parent entity identifier (UUID string)
    #[serde(default, alias = "storyId")]
    pub parent_id: Option<String>,

    /// Owning user identifier (UUID string)
    #[serde(default, alias = "userId")]
    pub owner_id: Option<String>,

    /// Human-readable title
    #[serde(default)]
    pub title: String,

    /// Script to render
    #[serde(default)]
    pub script: Option<ScriptDocument>,
}

impl JobSubmission {
    /// Best-effort job id, used to record failures for submissions that never
    /// pass validation.
    pub fn parsed_job_id(&self) -> Option<JobId> {
        self.job_id.as_deref().and_then(|s| JobId::parse(s).ok())
    }

    /// Validate identifiers and produce an immutable request.
    pub fn validate(self, kind: JobKind) -> Result<JobRequest, JobValidationError> {
        let job_id = JobId::parse(required("jobId", &self.job_id)?)?;
        let parent_id = parse_uuid("parentId", required("parentId", &self.parent_id)?)?;
        let owner_id = parse_uuid("ownerId", required("ownerId", &self.owner_id)?)?;

        Ok(JobRequest {
            kind,
            job_id,
            parent_id,
            owner_id,
            title: self.title,
            script: self.script,
        })
    }
}

/// A validated generation request. Immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub kind: JobKind,
    pub job_id: JobId,
    pub parent_id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// Checked for presence by the orchestrator, after the job is marked processing.
    pub script: Option<ScriptDocument>,
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, JobValidationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(JobValidationError::Missing(field)),
    }
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, JobValidationError> {
    Uuid::parse_str(value.trim()).map_err(|_| JobValidationError::InvalidId {
        field,
        value: value.to_string(),
    })
}
