//! Per-job orchestration.
//!
//! Every kind runs the same sequence: validate, mark processing, sanitize,
//! reuse or render (with moderation recovery), upload, persist the result.
//! Failures become a `Failed` status here and are not propagated further.
//! The working directory is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reel_models::{
    ArtifactSummary, JobId, JobKind, JobMetrics, JobRequest, JobSubmission, ScriptDocument,
    UploadedFile,
};
use reel_render::{probe_video, RenderMode, Renderer};
use reel_storage::layout::{preview_output_prefix, video_key, OUTPUT_DIR};
use reel_storage::ArtifactStore;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{warn, Instrument};

use crate::admission::AdmissionSlot;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::recovery::{ModerationRecovery, RenderPlan};
use crate::retry::RetryConfig;
use crate::reuse::ReuseResolver;
use crate::safety;
use crate::status::StatusReporter;
use crate::upload::UploadManager;
use crate::workdir::{walk_files, WorkingDirectory};

/// What happened to one submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub kind: JobKind,
    /// The job reached `Completed`
    pub success: bool,
    /// The job reached a terminal phase (`Completed` or `Failed`)
    pub completed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ArtifactSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<JobMetrics>,
}

impl JobReport {
    fn rejected(job_id: Option<JobId>, kind: JobKind, error: &WorkerError) -> Self {
        Self {
            job_id,
            kind,
            success: false,
            completed: false,
            message: format!("{} job was not accepted", kind),
            error: Some(error.to_string()),
            result: None,
            metrics: None,
        }
    }

    fn finished(job_id: JobId, kind: JobKind, summary: ArtifactSummary, job_metrics: JobMetrics) -> Self {
        let message = if summary.reused {
            format!("{} job served from an existing artifact", kind)
        } else {
            format!("{} job completed", kind)
        };
        Self {
            job_id: Some(job_id),
            kind,
            success: true,
            completed: true,
            message,
            error: None,
            result: Some(summary),
            metrics: Some(job_metrics),
        }
    }

    fn failed(job_id: JobId, kind: JobKind, error: &WorkerError, job_metrics: JobMetrics) -> Self {
        Self {
            job_id: Some(job_id),
            kind,
            success: false,
            completed: true,
            message: format!("{} job failed", kind),
            error: Some(error.to_string()),
            result: None,
            metrics: Some(job_metrics),
        }
    }

    /// Report for a job whose task died before it could report itself.
    pub fn crashed(job_id: Option<JobId>, kind: JobKind, error: impl Into<String>) -> Self {
        Self {
            job_id,
            kind,
            success: false,
            completed: true,
            message: format!("{} job failed", kind),
            error: Some(error.into()),
            result: None,
            metrics: None,
        }
    }
}

/// Runs jobs of every kind against shared collaborators.
pub struct JobOrchestrator {
    config: WorkerConfig,
    store: Arc<dyn ArtifactStore>,
    renderer: Arc<dyn Renderer>,
    reporter: StatusReporter,
    uploads: UploadManager,
    reuse: ReuseResolver,
}

impl JobOrchestrator {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ArtifactStore>,
        renderer: Arc<dyn Renderer>,
        reporter: StatusReporter,
    ) -> Self {
        let retry = RetryConfig::new("artifact_upload")
            .with_max_retries(config.upload_max_retries)
            .with_base_delay(config.upload_base_delay)
            .with_max_delay(config.upload_max_delay);
        let uploads = UploadManager::new(store.clone(), retry, config.upload_max_concurrent);
        let reuse = ReuseResolver::new(store.clone());

        Self {
            config,
            store,
            renderer,
            reporter,
            uploads,
            reuse,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    /// Run an admitted job on its own task so that a dropped caller does not
    /// cancel a render in progress. The slot is released when the task ends,
    /// including by panic.
    pub fn spawn(self: &Arc<Self>, slot: AdmissionSlot, kind: JobKind, submission: JobSubmission) -> JoinHandle<JobReport> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let _slot = slot;
            orchestrator.run(kind, submission).await
        })
    }

    /// Run one submission to a terminal state.
    pub async fn run(&self, kind: JobKind, submission: JobSubmission) -> JobReport {
        let fallback_id = submission.parsed_job_id();
        let request = match submission.validate(kind) {
            Ok(request) => request,
            Err(e) => {
                let error = WorkerError::from(e);
                let id = fallback_id.map(|id| id.to_string()).unwrap_or_default();
                JobLogger::from_string(&id, kind.as_str()).log_error(&error.to_string());
                metrics::record_job_failed(kind.as_str(), error.kind_label());
                if let Some(job_id) = fallback_id {
                    self.reporter
                        .mark_failed(job_id, kind, "", &error.to_string(), None)
                        .await;
                }
                return JobReport::rejected(fallback_id, kind, &error);
            }
        };

        let logger = JobLogger::new(&request.job_id, kind);
        let span = logger.create_span();
        self.run_validated(request, logger).instrument(span).await
    }

    async fn run_validated(&self, request: JobRequest, logger: JobLogger) -> JobReport {
        let job_id = request.job_id;
        let kind = request.kind;
        logger.log_start(&format!("\"{}\"", request.title));
        metrics::record_job_started(kind.as_str());
        self.reporter.mark_processing(job_id, kind).await;

        let mut job_metrics = JobMetrics::default();
        let outcome = match WorkingDirectory::create(&self.config.renderer.work_root(), &job_id).await {
            Ok(workdir) => {
                let outcome = self.execute(&request, &workdir, &logger, &mut job_metrics).await;
                workdir.cleanup().await;
                outcome
            }
            Err(e) => Err(WorkerError::from(e)),
        };

        match outcome {
            Ok(summary) => {
                job_metrics.file_count = summary.file_count;
                job_metrics.total_bytes = summary.total_bytes();
                if let Some(video) = &summary.video {
                    job_metrics.duration_secs = Some(video.duration_secs);
                    job_metrics.width = Some(video.width);
                    job_metrics.height = Some(video.height);
                }
                self.reporter
                    .mark_completed(job_id, kind, &summary, job_metrics.clone())
                    .await;
                metrics::record_job_completed(kind.as_str(), summary.reused);
                logger.log_completion(&format!(
                    "{} file(s) at {}",
                    summary.file_count, summary.artifact_url
                ));
                JobReport::finished(job_id, kind, summary, job_metrics)
            }
            Err(error) => {
                logger.log_error(&error.to_string());
                metrics::record_job_failed(kind.as_str(), error.kind_label());
                self.reporter
                    .mark_failed(
                        job_id,
                        kind,
                        &request.title,
                        &error.to_string(),
                        Some(job_metrics.clone()),
                    )
                    .await;
                JobReport::failed(job_id, kind, &error, job_metrics)
            }
        }
    }

    async fn execute(
        &self,
        request: &JobRequest,
        workdir: &WorkingDirectory,
        logger: &JobLogger,
        job_metrics: &mut JobMetrics,
    ) -> WorkerResult<ArtifactSummary> {
        let script = request
            .script
            .as_ref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| WorkerError::validation("script has no beats"))?;

        let (sanitized, removed) = safety::sanitize(script);
        if !removed.is_empty() {
            logger.log_warning(&format!("removed unsafe image prompts from beats {:?}", removed));
            metrics::record_sanitized_beats(removed.len());
        }
        job_metrics.sanitized_beats = removed;

        if let Some(prefix) = self.reuse.find_existing(&request.job_id, request.kind).await {
            if self.reuse.materialize(&prefix, workdir.path()).await {
                logger.log_progress(&format!("reusing stored artifact at {}", prefix));
                metrics::record_reuse_hit(request.kind.as_str());
                job_metrics.reused = true;
                return self.summarize_reused(request, workdir).await;
            }
            logger.log_warning("stored artifact could not be mirrored, rendering again");
        }

        let artifact = self.render(request, &sanitized, workdir, job_metrics).await?;
        self.upload(request, workdir, &artifact).await
    }

    async fn render(
        &self,
        request: &JobRequest,
        script: &ScriptDocument,
        workdir: &WorkingDirectory,
        job_metrics: &mut JobMetrics,
    ) -> WorkerResult<PathBuf> {
        let plan = RenderPlan {
            mode: RenderMode::for_kind(request.kind),
            workdir: workdir.path().to_path_buf(),
            output_dir: workdir.join(OUTPUT_DIR),
            desired_output: desired_video_path(workdir.path(), &request.job_id),
            caption_lang: script.caption_lang().map(str::to_string),
        };

        let report = ModerationRecovery::new(
            self.renderer.as_ref(),
            &self.config.fallback_image_url,
            self.config.moderation_max_attempts,
        )
        .run(script, &plan)
        .await;

        job_metrics.render_attempts = report.attempts.len() as u32;
        job_metrics.render_duration_ms = report.render_duration_ms();
        job_metrics.replaced_beats = if report.all_fallback {
            (0..script.beats.len()).collect()
        } else {
            report.replaced_beats.iter().copied().collect()
        };
        report.result
    }

    async fn upload(
        &self,
        request: &JobRequest,
        workdir: &WorkingDirectory,
        artifact: &Path,
    ) -> WorkerResult<ArtifactSummary> {
        if request.kind.is_single_file() {
            let key = video_key(&request.job_id);
            let file = self.uploads.upload_primary(artifact, &key).await?;
            let mut summary = ArtifactSummary::new(file.url.clone(), vec![file], false);
            summary.video = self.probe(artifact).await;
            return Ok(summary);
        }

        let prefix = preview_output_prefix(&request.job_id, request.kind);
        let files = self.uploads.upload_tree(&workdir.join(OUTPUT_DIR), &prefix).await?;
        Ok(ArtifactSummary::new(self.store.public_url(&prefix), files, false))
    }

    /// Describe a mirrored artifact from what landed in the working directory.
    async fn summarize_reused(
        &self,
        request: &JobRequest,
        workdir: &WorkingDirectory,
    ) -> WorkerResult<ArtifactSummary> {
        if request.kind.is_single_file() {
            let local = desired_video_path(workdir.path(), &request.job_id);
            let key = video_key(&request.job_id);
            let size = tokio::fs::metadata(&local).await?.len();
            let url = self.store.public_url(&key);
            let file = UploadedFile {
                path: key,
                url: url.clone(),
                size,
            };
            let mut summary = ArtifactSummary::new(url, vec![file], true);
            summary.video = self.probe(&local).await;
            return Ok(summary);
        }

        let prefix = preview_output_prefix(&request.job_id, request.kind);
        let output = workdir.join(OUTPUT_DIR);
        let files = walk_files(&output)
            .await?
            .into_iter()
            .map(|f| UploadedFile {
                url: self.store.public_url(&format!("{}{}", prefix, f.relative)),
                path: f.relative,
                size: f.size,
            })
            .collect();
        Ok(ArtifactSummary::new(self.store.public_url(&prefix), files, true))
    }

    async fn probe(&self, path: &Path) -> Option<reel_models::VideoMetadata> {
        match probe_video(path).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("Failed to probe {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Canonical local path of a rendered or mirrored video.
pub fn desired_video_path(workdir: &Path, job_id: &JobId) -> PathBuf {
    workdir.join(format!("{}.mp4", job_id))
}
