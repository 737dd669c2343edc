//! Deterministic key layout for job artifacts.
//!
//! - Video: `videos/<jobId>.mp4`
//! - Previews: `videos/<jobId>/<kind>/output/<relative path>`

use reel_models::{JobId, JobKind};

/// Root of every job artifact.
pub const ARTIFACT_ROOT: &str = "videos";

/// Name of the renderer output directory mirrored under preview prefixes.
pub const OUTPUT_DIR: &str = "output";

/// Key of the primary video artifact.
pub fn video_key(job_id: &JobId) -> String {
    format!("{}/{}.mp4", ARTIFACT_ROOT, job_id)
}

/// Prefix holding a job's preview tree for `kind` (with trailing slash).
pub fn preview_prefix(job_id: &JobId, kind: JobKind) -> String {
    format!("{}/{}/{}/", ARTIFACT_ROOT, job_id, kind.storage_segment())
}

/// Prefix of the mirrored renderer output tree (with trailing slash).
pub fn preview_output_prefix(job_id: &JobId, kind: JobKind) -> String {
    format!("{}{}/", preview_prefix(job_id, kind), OUTPUT_DIR)
}

/// The prefix probed to decide whether an artifact already exists.
pub fn artifact_prefix(job_id: &JobId, kind: JobKind) -> String {
    match kind {
        JobKind::Video => video_key(job_id),
        _ => preview_prefix(job_id, kind),
    }
}
