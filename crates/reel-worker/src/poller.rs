//! Waiting for a job to reach a terminal phase.

use std::sync::Arc;
use std::time::Duration;

use reel_firestore::{FirestoreError, JobStatusStore};
use reel_models::{JobId, JobStatusRecord};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Job did not finish after {polls} polls")]
    Exhausted { polls: u32 },

    #[error("Failed to read job status: {0}")]
    Store(#[from] FirestoreError),
}

/// Bounded, fixed-interval poll of persisted job status.
#[derive(Clone)]
pub struct CompletionPoller {
    store: Arc<dyn JobStatusStore>,
    max_polls: u32,
    interval: Duration,
}

impl CompletionPoller {
    pub fn new(store: Arc<dyn JobStatusStore>, max_polls: u32, interval: Duration) -> Self {
        Self {
            store,
            max_polls: max_polls.max(1),
            interval,
        }
    }

    /// Poll until the job is `Completed` or `Failed`.
    ///
    /// Read errors abort the wait; a missing record counts as not finished.
    pub async fn wait(&self, job_id: &JobId) -> Result<JobStatusRecord, PollError> {
        for poll in 1..=self.max_polls {
            if let Some(record) = self.store.get(job_id).await? {
                if record.is_terminal() {
                    return Ok(record);
                }
                debug!(job_id = %job_id, poll, phase = %record.phase, "Job still running");
            }
            if poll < self.max_polls {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(PollError::Exhausted {
            polls: self.max_polls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_firestore::InMemoryJobStatusStore;
    use reel_models::{JobKind, JobPhase};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_polls() {
        let store = Arc::new(InMemoryJobStatusStore::new());
        let id = JobId::new();
        store
            .put(&JobStatusRecord::new(id, Some(JobKind::Video), JobPhase::Processing))
            .await
            .unwrap();

        let poller = CompletionPoller::new(store, 60, Duration::from_secs(5));
        let started = Instant::now();
        let result = poller.wait(&id).await;

        assert!(matches!(result, Err(PollError::Exhausted { polls: 60 })));
        assert_eq!(started.elapsed(), Duration::from_secs(5 * 59));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_terminal_record() {
        let store = Arc::new(InMemoryJobStatusStore::new());
        let id = JobId::new();
        store
            .put(&JobStatusRecord::new(id, Some(JobKind::AudioPreview), JobPhase::Processing))
            .await
            .unwrap();

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            let mut done = JobStatusRecord::new(id, Some(JobKind::AudioPreview), JobPhase::Completed);
            done.artifact_url = Some("https://cdn.example.com/videos/x/".to_string());
            writer.put(&done).await.unwrap();
        });

        let poller = CompletionPoller::new(store, 60, Duration::from_secs(5));
        let record = poller.wait(&id).await.unwrap();

        assert_eq!(record.phase, JobPhase::Completed);
        assert!(record.artifact_url.is_some());
    }
}
