//! In-memory collaborators for orchestrator tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reel_firestore::InMemoryJobStatusStore;
use reel_models::{JobSubmission, ScriptDocument};
use reel_render::{RenderMode, RenderOutcome, RenderRequest, Renderer, RendererConfig};
use reel_storage::{ArtifactStore, StorageError, StorageResult, StoreEntry};
use reel_worker::{
    FailureNotice, JobOrchestrator, OperatorNotifier, StatusReporter, WorkerConfig,
};
use serde_json::json;
use tokio::time::Instant;
use uuid::Uuid;

pub const PUBLIC_BASE: &str = "https://cdn.test";
pub const FALLBACK: &str = "https://cdn.test/fallback/safe.png";

/// Object store kept in a map, with injectable upload failures.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    upload_failures: Mutex<VecDeque<StorageError>>,
    fail_all_uploads: Mutex<Option<fn() -> StorageError>>,
    failing_downloads: Mutex<BTreeSet<String>>,
    extra_dirs: Mutex<BTreeMap<String, Vec<String>>>,
    upload_calls: Mutex<Vec<(String, Instant)>>,
    download_calls: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, key: &str, bytes: &[u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Fail the next uploads with these errors, in order.
    pub fn fail_next_uploads(&self, errors: Vec<StorageError>) {
        self.upload_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_every_upload(&self, make: fn() -> StorageError) {
        *self.fail_all_uploads.lock().unwrap() = Some(make);
    }

    pub fn fail_download(&self, key: &str) {
        self.failing_downloads.lock().unwrap().insert(key.to_string());
    }

    /// Make `prefix` list `child` as a sub-directory even with no objects.
    pub fn add_listed_dir(&self, prefix: &str, child: &str) {
        self.extra_dirs
            .lock()
            .unwrap()
            .entry(prefix.to_string())
            .or_default()
            .push(child.to_string());
    }

    pub fn upload_calls(&self) -> Vec<(String, Instant)> {
        self.upload_calls.lock().unwrap().clone()
    }

    pub fn download_calls(&self) -> Vec<String> {
        self.download_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn upload_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        self.upload_calls
            .lock()
            .unwrap()
            .push((key.to_string(), Instant::now()));

        if let Some(make) = *self.fail_all_uploads.lock().unwrap() {
            return Err(make());
        }
        if let Some(err) = self.upload_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let bytes = std::fs::read(path)?;
        self.insert(key, &bytes);
        Ok(())
    }

    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        self.download_calls.lock().unwrap().push(key.to_string());
        if self.failing_downloads.lock().unwrap().contains(key) {
            return Err(StorageError::DownloadFailed(format!("connection reset: {}", key)));
        }
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<StoreEntry>> {
        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();

        for (key, bytes) in self.objects.lock().unwrap().iter() {
            let Some(rest) = key.strip_prefix(prefix) else { continue };
            match rest.find('/') {
                Some(idx) => {
                    dirs.insert(format!("{}{}", prefix, &rest[..=idx]));
                }
                None => entries.push(StoreEntry::File {
                    key: key.clone(),
                    size: bytes.len() as u64,
                }),
            }
        }
        if let Some(extra) = self.extra_dirs.lock().unwrap().get(prefix) {
            dirs.extend(extra.iter().cloned());
        }

        let mut listed: Vec<StoreEntry> = dirs
            .into_iter()
            .map(|prefix| StoreEntry::Directory { prefix })
            .collect();
        listed.extend(entries);
        Ok(listed)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", PUBLIC_BASE, key)
    }
}

/// What the fake renderer does on one call.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Block(Vec<usize>),
    Fail(String),
    Panic,
}

/// Renderer that plays back steps and writes plausible output on success.
pub struct FakeRenderer {
    steps: Mutex<VecDeque<Step>>,
    repeat: Step,
    seen: Mutex<Vec<(PathBuf, ScriptDocument)>>,
}

impl FakeRenderer {
    pub fn new(steps: Vec<Step>, repeat: Step) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            repeat,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(vec![], Step::Succeed)
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<(PathBuf, ScriptDocument)> {
        self.seen.lock().unwrap().clone()
    }

    fn write_output(request: &RenderRequest) -> std::io::Result<PathBuf> {
        match request.mode {
            RenderMode::Movie => {
                std::fs::write(&request.desired_output, b"fake mp4 bytes")?;
                Ok(request.desired_output.clone())
            }
            RenderMode::Images => {
                let dir = request.output_dir.join("images").join("script");
                std::fs::create_dir_all(&dir)?;
                std::fs::write(dir.join("0.png"), b"png0")?;
                std::fs::write(dir.join("1.png"), b"png1")?;
                Ok(dir)
            }
            RenderMode::Audio => {
                let dir = request.output_dir.join("audio").join("script");
                std::fs::create_dir_all(&dir)?;
                std::fs::write(dir.join("0.mp3"), b"mp3")?;
                Ok(dir)
            }
        }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> RenderOutcome {
        let bytes = std::fs::read(&request.script_path).expect("script variant written");
        let doc: ScriptDocument = serde_json::from_slice(&bytes).expect("script variant is JSON");
        self.seen
            .lock()
            .unwrap()
            .push((request.script_path.clone(), doc));

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.repeat.clone());

        match step {
            Step::Succeed => match Self::write_output(request) {
                Ok(artifact) => RenderOutcome::Success { artifact },
                Err(e) => RenderOutcome::failure(e.to_string()),
            },
            Step::Block(beats) => RenderOutcome::ModerationBlocked {
                failed_beats: beats.into_iter().collect(),
                message: "Error: moderation_blocked".to_string(),
            },
            Step::Fail(message) => RenderOutcome::failure(message),
            Step::Panic => panic!("renderer crashed"),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<FailureNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<FailureNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperatorNotifier for RecordingNotifier {
    async fn notify_failure(&self, notice: &FailureNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

pub struct Harness {
    pub root: tempfile::TempDir,
    pub orchestrator: Arc<JobOrchestrator>,
    pub store: Arc<MemoryStore>,
    pub renderer: Arc<FakeRenderer>,
    pub statuses: Arc<InMemoryJobStatusStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(renderer: Arc<FakeRenderer>) -> Self {
        Self::with_store(renderer, MemoryStore::new())
    }

    pub fn with_store(renderer: Arc<FakeRenderer>, store: Arc<MemoryStore>) -> Self {
        let root = tempfile::TempDir::new().unwrap();
        let mut config = WorkerConfig::new(RendererConfig::new(root.path()));
        config.fallback_image_url = FALLBACK.to_string();
        config.upload_base_delay = Duration::from_millis(5);
        config.upload_max_delay = Duration::from_millis(20);

        let statuses = Arc::new(InMemoryJobStatusStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = StatusReporter::new(statuses.clone(), Some(notifier.clone()));
        let orchestrator = Arc::new(JobOrchestrator::new(
            config,
            store.clone(),
            renderer.clone(),
            reporter,
        ));

        Self {
            root,
            orchestrator,
            store,
            renderer,
            statuses,
            notifier,
        }
    }

    pub fn workdir(&self, job_id: &str) -> PathBuf {
        self.root.path().join("jobs").join(job_id)
    }
}

pub fn script(beats: usize) -> ScriptDocument {
    let beats: Vec<_> = (0..beats)
        .map(|i| {
            json!({
                "speaker": if i % 2 == 0 { "Narrator" } else { "Hero" },
                "text": format!("Line number {}", i),
                "imagePrompt": format!("a watercolor landscape, scene {}", i),
                "duration": 4
            })
        })
        .collect();
    serde_json::from_value(json!({
        "beats": beats,
        "speechConfig": {"provider": "tts", "voice": "calm"},
        "imageConfig": {"style": "watercolor"}
    }))
    .unwrap()
}

pub fn submission(job_id: &str, script: ScriptDocument) -> JobSubmission {
    JobSubmission {
        job_id: Some(job_id.to_string()),
        parent_id: Some(Uuid::new_v4().to_string()),
        owner_id: Some(Uuid::new_v4().to_string()),
        title: "The lighthouse keeper".to_string(),
        script: Some(script),
    }
}

pub fn new_job_id() -> String {
    Uuid::new_v4().to_string()
}
