//! Job status persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reel_models::{JobId, JobKind, JobMetrics, JobPhase, JobStatusRecord};
use tokio::sync::RwLock;
use tracing::debug;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue, Value};

/// Default collection holding one document per job.
pub const DEFAULT_JOBS_COLLECTION: &str = "generation_jobs";

/// Keyed store of job status records.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Write the full record for its job id.
    async fn put(&self, record: &JobStatusRecord) -> FirestoreResult<()>;

    /// Read the record for a job, if any.
    async fn get(&self, job_id: &JobId) -> FirestoreResult<Option<JobStatusRecord>>;
}

/// Job status records stored as Firestore documents keyed by job id.
#[derive(Clone)]
pub struct FirestoreJobStatusStore {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreJobStatusStore {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    /// Create from environment variables (`JOBS_COLLECTION` plus client config).
    pub async fn from_env() -> FirestoreResult<Self> {
        let client = FirestoreClient::from_env().await?;
        let collection = std::env::var("JOBS_COLLECTION")
            .ok()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_JOBS_COLLECTION.to_string());
        Ok(Self::new(client, collection))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl JobStatusStore for FirestoreJobStatusStore {
    async fn put(&self, record: &JobStatusRecord) -> FirestoreResult<()> {
        let doc_id = record.job_id.to_string();
        let fields = record_to_fields(record);

        self.client
            .with_retry("put_job_status", || {
                self.client
                    .update_document(&self.collection, &doc_id, fields.clone(), None)
            })
            .await?;

        debug!(job_id = %record.job_id, phase = %record.phase, "Stored job status");
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> FirestoreResult<Option<JobStatusRecord>> {
        let doc_id = job_id.to_string();
        let doc = self
            .client
            .with_retry("get_job_status", || {
                self.client.get_document(&self.collection, &doc_id)
            })
            .await?;

        doc.map(|d| record_from_document(&d)).transpose()
    }
}

/// Process-local store, for tests and single-node development.
#[derive(Clone, Default)]
pub struct InMemoryJobStatusStore {
    records: Arc<RwLock<HashMap<JobId, JobStatusRecord>>>,
}

impl InMemoryJobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record.
    pub async fn all(&self) -> Vec<JobStatusRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobStatusStore for InMemoryJobStatusStore {
    async fn put(&self, record: &JobStatusRecord) -> FirestoreResult<()> {
        self.records
            .write()
            .await
            .insert(record.job_id, record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> FirestoreResult<Option<JobStatusRecord>> {
        Ok(self.records.read().await.get(job_id).cloned())
    }
}

fn record_to_fields(record: &JobStatusRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("jobId".to_string(), record.job_id.to_string().to_firestore_value());
    fields.insert(
        "kind".to_string(),
        record.kind.map(|k| k.as_str()).to_firestore_value(),
    );
    fields.insert("phase".to_string(), record.phase.as_str().to_firestore_value());
    fields.insert("artifactUrl".to_string(), record.artifact_url.to_firestore_value());
    fields.insert("errorMessage".to_string(), record.error_message.to_firestore_value());
    fields.insert(
        "metrics".to_string(),
        match &record.metrics {
            Some(m) => metrics_to_value(m),
            None => Value::NullValue(()),
        },
    );
    fields.insert("updatedAt".to_string(), record.updated_at.to_firestore_value());
    fields
}

fn metrics_to_value(m: &JobMetrics) -> Value {
    let mut fields = HashMap::new();
    fields.insert("renderAttempts".to_string(), m.render_attempts.to_firestore_value());
    fields.insert("replacedBeats".to_string(), m.replaced_beats.to_firestore_value());
    fields.insert("sanitizedBeats".to_string(), m.sanitized_beats.to_firestore_value());
    fields.insert("reused".to_string(), m.reused.to_firestore_value());
    fields.insert("fileCount".to_string(), m.file_count.to_firestore_value());
    fields.insert("totalBytes".to_string(), m.total_bytes.to_firestore_value());
    fields.insert("renderDurationMs".to_string(), m.render_duration_ms.to_firestore_value());
    fields.insert("durationSecs".to_string(), m.duration_secs.to_firestore_value());
    fields.insert("width".to_string(), m.width.to_firestore_value());
    fields.insert("height".to_string(), m.height.to_firestore_value());
    Value::map(fields)
}

fn metrics_from_value(value: &Value) -> Option<JobMetrics> {
    let fields = value.as_map()?;
    let get = |name: &str| fields.get(name);

    Some(JobMetrics {
        render_attempts: get("renderAttempts").and_then(u32::from_firestore_value).unwrap_or(0),
        replaced_beats: get("replacedBeats")
            .and_then(Vec::<usize>::from_firestore_value)
            .unwrap_or_default(),
        sanitized_beats: get("sanitizedBeats")
            .and_then(Vec::<usize>::from_firestore_value)
            .unwrap_or_default(),
        reused: get("reused").and_then(bool::from_firestore_value).unwrap_or(false),
        file_count: get("fileCount").and_then(u32::from_firestore_value).unwrap_or(0),
        total_bytes: get("totalBytes").and_then(u64::from_firestore_value).unwrap_or(0),
        render_duration_ms: get("renderDurationMs")
            .and_then(u64::from_firestore_value)
            .unwrap_or(0),
        duration_secs: get("durationSecs").and_then(f64::from_firestore_value),
        width: get("width").and_then(u32::from_firestore_value),
        height: get("height").and_then(u32::from_firestore_value),
    })
}

fn record_from_document(doc: &Document) -> FirestoreResult<JobStatusRecord> {
    let job_id = doc
        .get::<String>("jobId")
        .and_then(|s| JobId::parse(&s).ok())
        .ok_or_else(|| FirestoreError::invalid_response("job status without a valid jobId"))?;

    let phase = doc
        .get::<String>("phase")
        .and_then(|s| JobPhase::parse(&s))
        .ok_or_else(|| FirestoreError::invalid_response(format!("job {} has no valid phase", job_id)))?;

    let metrics = doc
        .fields
        .as_ref()
        .and_then(|f| f.get("metrics"))
        .and_then(metrics_from_value);

    Ok(JobStatusRecord {
        job_id,
        kind: doc.get::<String>("kind").and_then(|s| JobKind::parse(&s)),
        phase,
        artifact_url: doc.get("artifactUrl"),
        error_message: doc.get("errorMessage"),
        metrics,
        updated_at: doc.get("updatedAt").unwrap_or_else(chrono::Utc::now),
    })
}
