//! Persisted job status.
//!
//! The status record is the only job state visible to polling clients. It is
//! written by the status reporter and is terminal once completed or failed.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobKind};

/// Job lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Accepted, waiting for a slot
    #[default]
    Queued,
    /// Being orchestrated
    Processing,
    /// Artifact stored and metadata written
    Completed,
    /// Unrecovered failure
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Queued => "queued",
            JobPhase::Processing => "processing",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
        }
    }

    /// Parse from the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobPhase::Queued),
            "processing" => Some(JobPhase::Processing),
            "completed" => Some(JobPhase::Completed),
            "failed" => Some(JobPhase::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }

    /// Whether a write moving `self` to `next` is legal.
    ///
    /// A new orchestration run may restart any job, so `Processing` is always
    /// reachable. Terminal phases never flip into each other.
    pub fn can_transition_to(&self, next: JobPhase) -> bool {
        match (self, next) {
            (_, JobPhase::Processing) => true,
            (JobPhase::Queued, _) => true,
            (JobPhase::Processing, JobPhase::Completed | JobPhase::Failed) => true,
            (JobPhase::Completed, JobPhase::Completed) | (JobPhase::Failed, JobPhase::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metrics recorded with a finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobMetrics {
    /// Renderer invocations performed (0 when reused)
    pub render_attempts: u32,
    /// Beats whose image was swapped for the fallback
    #[serde(default)]
    pub replaced_beats: Vec<usize>,
    /// Beats whose image fields were stripped before rendering
    #[serde(default)]
    pub sanitized_beats: Vec<usize>,
    /// Artifact served from the store instead of rendered
    pub reused: bool,
    pub file_count: u32,
    pub total_bytes: u64,
    /// Wall-clock time spent in the renderer
    pub render_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Persisted status of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusRecord {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
    pub phase: JobPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<JobMetrics>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusRecord {
    /// Create a record in the given phase.
    pub fn new(job_id: JobId, kind: Option<JobKind>, phase: JobPhase) -> Self {
        Self {
            job_id,
            kind,
            phase,
            artifact_url: None,
            error_message: None,
            metrics: None,
            updated_at: Utc::now(),
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
