//! Job orchestration metrics.

use metrics::{counter, gauge, histogram};

pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "reel_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "reel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reel_jobs_failed_total";
    pub const JOBS_IN_FLIGHT: &str = "reel_jobs_in_flight";
    pub const ADMISSION_REJECTIONS_TOTAL: &str = "reel_admission_rejections_total";

    pub const RENDER_ATTEMPTS_TOTAL: &str = "reel_render_attempts_total";
    pub const RENDER_DURATION_SECONDS: &str = "reel_render_duration_seconds";
    pub const MODERATION_REPLACEMENTS_TOTAL: &str = "reel_moderation_replacements_total";
    pub const SANITIZED_BEATS_TOTAL: &str = "reel_sanitized_beats_total";

    pub const REUSE_HITS_TOTAL: &str = "reel_reuse_hits_total";
    pub const UPLOAD_RETRIES_TOTAL: &str = "reel_upload_retries_total";
    pub const UPLOADED_BYTES_TOTAL: &str = "reel_uploaded_bytes_total";

    pub const STATUS_WRITE_FAILURES_TOTAL: &str = "reel_status_write_failures_total";
}

pub fn record_job_started(kind: &str) {
    counter!(names::JOBS_STARTED_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_job_completed(kind: &str, reused: bool) {
    let labels = [("kind", kind.to_string()), ("reused", reused.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(kind: &str, reason: &str) {
    let labels = [("kind", kind.to_string()), ("reason", reason.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn record_admission_rejected() {
    counter!(names::ADMISSION_REJECTIONS_TOTAL).increment(1);
}

pub fn record_render_attempt(mode: &str, outcome: &str, duration_ms: u64) {
    let labels = [("mode", mode.to_string()), ("outcome", outcome.to_string())];
    counter!(names::RENDER_ATTEMPTS_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, "mode" => mode.to_string())
        .record(duration_ms as f64 / 1000.0);
}

pub fn record_moderation_replacements(count: usize) {
    counter!(names::MODERATION_REPLACEMENTS_TOTAL).increment(count as u64);
}

pub fn record_sanitized_beats(count: usize) {
    counter!(names::SANITIZED_BEATS_TOTAL).increment(count as u64);
}

pub fn record_reuse_hit(kind: &str) {
    counter!(names::REUSE_HITS_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_retry(operation: &str) {
    counter!(names::UPLOAD_RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_uploaded_bytes(bytes: u64) {
    counter!(names::UPLOADED_BYTES_TOTAL).increment(bytes);
}

pub fn record_status_write_failure(phase: &str) {
    counter!(names::STATUS_WRITE_FAILURES_TOTAL, "phase" => phase.to_string()).increment(1);
}
