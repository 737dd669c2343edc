//! Job lifecycle persistence.

use std::sync::Arc;

use reel_firestore::JobStatusStore;
use reel_models::{ArtifactSummary, JobId, JobKind, JobMetrics, JobPhase, JobStatusRecord};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::notify::{FailureNotice, OperatorNotifier};

/// Message recorded for jobs turned away by admission control.
pub const ADMISSION_REJECTED_MESSAGE: &str =
    "Rejected: the renderer is busy with other jobs (too many concurrent requests)";

/// Writes job phase transitions and notifies operators of video failures.
///
/// Write failures are logged and counted but never returned: a stale status
/// is preferred over aborting the job.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn JobStatusStore>,
    notifier: Option<Arc<dyn OperatorNotifier>>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn JobStatusStore>, notifier: Option<Arc<dyn OperatorNotifier>>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Arc<dyn JobStatusStore> {
        &self.store
    }

    pub async fn mark_queued(&self, job_id: JobId, kind: JobKind) {
        self.write(JobStatusRecord::new(job_id, Some(kind), JobPhase::Queued))
            .await;
    }

    pub async fn mark_processing(&self, job_id: JobId, kind: JobKind) {
        // Any phase may move to processing, so no read is needed.
        self.put(JobStatusRecord::new(job_id, Some(kind), JobPhase::Processing))
            .await;
    }

    pub async fn mark_completed(
        &self,
        job_id: JobId,
        kind: JobKind,
        summary: &ArtifactSummary,
        job_metrics: JobMetrics,
    ) {
        let mut record = JobStatusRecord::new(job_id, Some(kind), JobPhase::Completed);
        record.artifact_url = Some(summary.artifact_url.clone());
        record.metrics = Some(job_metrics);
        self.write(record).await;
    }

    /// Record a terminal failure; video failures also page an operator.
    pub async fn mark_failed(
        &self,
        job_id: JobId,
        kind: JobKind,
        title: &str,
        error: &str,
        job_metrics: Option<JobMetrics>,
    ) {
        let mut record = JobStatusRecord::new(job_id, Some(kind), JobPhase::Failed);
        record.error_message = Some(error.to_string());
        record.metrics = job_metrics;
        if !self.write(record).await {
            return;
        }

        if kind == JobKind::Video {
            if let Some(notifier) = &self.notifier {
                notifier
                    .notify_failure(&FailureNotice::new(job_id, title, error))
                    .await;
            }
        }
    }

    /// Fail a job that was turned away before it started.
    ///
    /// A job that is already processing or completed belongs to another
    /// submission and is left alone.
    pub async fn mark_rejected(&self, job_id: JobId, kind: Option<JobKind>) {
        match self.store.get(&job_id).await {
            Ok(Some(existing))
                if matches!(existing.phase, JobPhase::Processing | JobPhase::Completed) =>
            {
                info!(
                    job_id = %job_id,
                    phase = %existing.phase,
                    "Not overwriting status of an active job after admission rejection"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(job_id = %job_id, "Failed to read job status before rejection: {}", e);
            }
        }

        let mut record = JobStatusRecord::new(job_id, kind, JobPhase::Failed);
        record.error_message = Some(ADMISSION_REJECTED_MESSAGE.to_string());
        self.put(record).await;
    }

    /// Persist `record` unless the stored phase may not move to it.
    ///
    /// Returns false only when the write was skipped for that reason. An
    /// unreadable status is treated as absent.
    async fn write(&self, record: JobStatusRecord) -> bool {
        match self.store.get(&record.job_id).await {
            Ok(Some(existing)) if !existing.phase.can_transition_to(record.phase) => {
                info!(
                    job_id = %record.job_id,
                    from = %existing.phase,
                    to = %record.phase,
                    "Skipping status write the current phase does not allow"
                );
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(job_id = %record.job_id, "Failed to read job status before write: {}", e);
            }
        }
        self.put(record).await;
        true
    }

    async fn put(&self, record: JobStatusRecord) {
        match self.store.put(&record).await {
            Ok(()) => debug!(job_id = %record.job_id, phase = %record.phase, "Job status written"),
            Err(e) => {
                metrics::record_status_write_failure(record.phase.as_str());
                warn!(
                    job_id = %record.job_id,
                    phase = %record.phase,
                    "Failed to persist job status: {}", e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_firestore::{FirestoreError, FirestoreResult, InMemoryJobStatusStore};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<FailureNotice>>,
    }

    #[async_trait]
    impl OperatorNotifier for RecordingNotifier {
        async fn notify_failure(&self, notice: &FailureNotice) {
            self.notices.lock().unwrap().push(notice.clone());
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl JobStatusStore for BrokenStore {
        async fn put(&self, _record: &JobStatusRecord) -> FirestoreResult<()> {
            Err(FirestoreError::ServerError(503, "unavailable".to_string()))
        }

        async fn get(&self, _job_id: &JobId) -> FirestoreResult<Option<JobStatusRecord>> {
            Err(FirestoreError::ServerError(503, "unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_only_video_failures_notify() {
        let store = Arc::new(InMemoryJobStatusStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = StatusReporter::new(store.clone(), Some(notifier.clone()));

        let video = JobId::new();
        let preview = JobId::new();
        reporter.mark_failed(video, JobKind::Video, "Title", "boom", None).await;
        reporter
            .mark_failed(preview, JobKind::ImagePreview, "Title", "boom", None)
            .await;

        let notices = notifier.notices.lock().unwrap().clone();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].job_id, video);

        let record = store.get(&preview).await.unwrap().unwrap();
        assert_eq!(record.phase, JobPhase::Failed);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_rejection_does_not_clobber_active_job() {
        let store = Arc::new(InMemoryJobStatusStore::new());
        let reporter = StatusReporter::new(store.clone(), None);
        let active = JobId::new();
        let fresh = JobId::new();

        reporter.mark_processing(active, JobKind::Video).await;
        reporter.mark_queued(fresh, JobKind::Video).await;
        reporter.mark_rejected(active, Some(JobKind::Video)).await;
        reporter.mark_rejected(fresh, Some(JobKind::Video)).await;

        assert_eq!(store.get(&active).await.unwrap().unwrap().phase, JobPhase::Processing);
        let rejected = store.get(&fresh).await.unwrap().unwrap();
        assert_eq!(rejected.phase, JobPhase::Failed);
        assert_eq!(rejected.error_message.as_deref(), Some(ADMISSION_REJECTED_MESSAGE));
    }

    #[tokio::test]
    async fn test_completed_job_is_not_failed_afterwards() {
        let store = Arc::new(InMemoryJobStatusStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = StatusReporter::new(store.clone(), Some(notifier.clone()));
        let id = JobId::new();
        let summary = ArtifactSummary::new("https://cdn.example.com/video/out.mp4", Vec::new(), false);

        reporter.mark_processing(id, JobKind::Video).await;
        reporter
            .mark_completed(id, JobKind::Video, &summary, JobMetrics::default())
            .await;
        reporter.mark_failed(id, JobKind::Video, "Title", "late failure", None).await;

        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.phase, JobPhase::Completed);
        assert_eq!(record.artifact_url.as_deref(), Some(summary.artifact_url.as_str()));
        assert!(record.error_message.is_none());
        assert!(notifier.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_errors_are_swallowed() {
        let reporter = StatusReporter::new(Arc::new(BrokenStore), None);
        let id = JobId::new();

        reporter.mark_processing(id, JobKind::AudioPreview).await;
        reporter.mark_rejected(id, None).await;
        reporter
            .mark_failed(id, JobKind::AudioPreview, "", "boom", None)
            .await;
    }
}
