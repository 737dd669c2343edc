//! Moderation recovery loop.
//!
//! A render blocked by image moderation is retried with the offending beats'
//! images swapped for a known-safe fallback. Replaced beats accumulate across
//! attempts and are never restored. After the selective budget is spent, or
//! when the renderer cannot say which beats failed, one final attempt runs
//! with every image replaced.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use reel_models::ScriptDocument;
use reel_render::{RenderMode, RenderOutcome, RenderRequest, Renderer};
use tracing::{info, warn};

use crate::error::WorkerError;
use crate::metrics;

/// Script file for the first attempt.
pub const SCRIPT_FILE: &str = "script.json";

/// Script file name for an attempt.
pub fn variant_file_name(attempt: u32) -> String {
    if attempt <= 1 {
        SCRIPT_FILE.to_string()
    } else {
        format!("script_attempt_{}.json", attempt)
    }
}

/// One renderer invocation and what came of it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderAttempt {
    pub attempt_number: u32,
    /// Script file sent to the renderer
    pub script_variant: PathBuf,
    pub outcome: RenderOutcome,
    pub duration_ms: u64,
}

/// Where a job renders.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub mode: RenderMode,
    /// Directory that receives the script variants
    pub workdir: PathBuf,
    pub output_dir: PathBuf,
    pub desired_output: PathBuf,
    pub caption_lang: Option<String>,
}

/// Images to substitute in the next variant.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Variant {
    /// The listed beats get the fallback; empty means the script as sanitized
    Selective(BTreeSet<usize>),
    /// Every beat gets the fallback
    AllFallback,
}

#[derive(Debug)]
enum State {
    Start(Variant),
    Done(PathBuf),
    Failed(WorkerError),
}

/// Result of the loop, with the attempt history kept for metrics.
#[derive(Debug)]
pub struct RecoveryReport {
    pub result: Result<PathBuf, WorkerError>,
    pub attempts: Vec<RenderAttempt>,
    /// Every beat index ever replaced selectively, ascending
    pub replaced_beats: BTreeSet<usize>,
    /// Whether the all-fallback variant was rendered
    pub all_fallback: bool,
}

impl RecoveryReport {
    pub fn render_duration_ms(&self) -> u64 {
        self.attempts.iter().map(|a| a.duration_ms).sum()
    }
}

/// Drives renders until success, a non-moderation failure, or exhaustion.
pub struct ModerationRecovery<'a> {
    renderer: &'a dyn Renderer,
    fallback_image_url: &'a str,
    /// Renders allowed before the final all-fallback attempt
    max_attempts: u32,
}

impl<'a> ModerationRecovery<'a> {
    pub fn new(renderer: &'a dyn Renderer, fallback_image_url: &'a str, max_attempts: u32) -> Self {
        Self {
            renderer,
            fallback_image_url,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Render `script` (already sanitized) according to `plan`.
    pub async fn run(&self, script: &ScriptDocument, plan: &RenderPlan) -> RecoveryReport {
        let mut attempts: Vec<RenderAttempt> = Vec::new();
        let mut replaced = BTreeSet::new();
        let mut all_fallback = false;
        let mut state = State::Start(Variant::Selective(BTreeSet::new()));

        loop {
            let variant = match state {
                State::Start(variant) => variant,
                State::Done(artifact) => {
                    return RecoveryReport {
                        result: Ok(artifact),
                        attempts,
                        replaced_beats: replaced,
                        all_fallback,
                    }
                }
                State::Failed(error) => {
                    return RecoveryReport {
                        result: Err(error),
                        attempts,
                        replaced_beats: replaced,
                        all_fallback,
                    }
                }
            };

            let attempt_number = attempts.len() as u32 + 1;
            if variant == Variant::AllFallback {
                all_fallback = true;
            }

            let attempt = match self.attempt(script, plan, &variant, attempt_number).await {
                Ok(attempt) => attempt,
                Err(e) => {
                    state = State::Failed(e);
                    continue;
                }
            };
            let outcome = attempt.outcome.clone();
            attempts.push(attempt);

            state = match outcome {
                RenderOutcome::Success { artifact } => State::Done(artifact),
                RenderOutcome::Failure { message, timed_out: true } => {
                    State::Failed(WorkerError::RenderTimeout(message))
                }
                RenderOutcome::Failure { message, .. } => State::Failed(WorkerError::RenderFailed(message)),
                RenderOutcome::ModerationBlocked { failed_beats, message } => {
                    self.next_after_block(
                        &variant,
                        failed_beats,
                        message,
                        attempt_number,
                        script.beats.len(),
                        &mut replaced,
                    )
                }
            };
        }
    }

    fn next_after_block(
        &self,
        variant: &Variant,
        failed_beats: BTreeSet<usize>,
        message: String,
        attempt_number: u32,
        beat_count: usize,
        replaced: &mut BTreeSet<usize>,
    ) -> State {
        if *variant == Variant::AllFallback {
            return State::Failed(WorkerError::ModerationExhausted {
                attempts: attempt_number,
                message,
            });
        }

        if attempt_number >= self.max_attempts {
            warn!(
                attempt = attempt_number,
                "Moderation retries exhausted, replacing every image"
            );
            return State::Start(Variant::AllFallback);
        }

        let valid: BTreeSet<usize> = failed_beats.into_iter().filter(|i| *i < beat_count).collect();
        if valid.is_empty() {
            warn!(
                attempt = attempt_number,
                "Moderation block without beat indices, replacing every image"
            );
            return State::Start(Variant::AllFallback);
        }

        info!(
            attempt = attempt_number,
            beats = ?valid,
            "Replacing moderated images"
        );
        replaced.extend(valid);
        State::Start(Variant::Selective(replaced.clone()))
    }

    async fn attempt(
        &self,
        script: &ScriptDocument,
        plan: &RenderPlan,
        variant: &Variant,
        attempt_number: u32,
    ) -> Result<RenderAttempt, WorkerError> {
        let mut document = script.clone();
        match variant {
            Variant::Selective(beats) => {
                let changed = document.replace_beat_images(beats, self.fallback_image_url);
                if attempt_number > 1 {
                    metrics::record_moderation_replacements(changed);
                }
            }
            Variant::AllFallback => {
                document.replace_all_images(self.fallback_image_url);
                metrics::record_moderation_replacements(document.beats.len());
            }
        }

        let script_path = write_variant(&plan.workdir, attempt_number, &document).await?;
        let request = RenderRequest {
            mode: plan.mode,
            script_path: script_path.clone(),
            output_dir: plan.output_dir.clone(),
            desired_output: plan.desired_output.clone(),
            caption_lang: plan.caption_lang.clone(),
            timeout: None,
        };

        let started = Instant::now();
        let outcome = self.renderer.render(&request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        metrics::record_render_attempt(plan.mode.as_arg(), outcome.label(), duration_ms);
        info!(
            attempt = attempt_number,
            outcome = outcome.label(),
            duration_ms,
            script = %script_path.display(),
            "Render attempt finished"
        );

        Ok(RenderAttempt {
            attempt_number,
            script_variant: script_path,
            outcome,
            duration_ms,
        })
    }
}

async fn write_variant(
    workdir: &Path,
    attempt_number: u32,
    document: &ScriptDocument,
) -> Result<PathBuf, WorkerError> {
    let path = workdir.join(variant_file_name(attempt_number));
    let bytes = serde_json::to_vec_pretty(document)?;
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const FALLBACK: &str = "https://cdn.example.com/safe.png";

    /// Plays back outcomes and keeps every script it was given.
    struct ScriptedRenderer {
        outcomes: Mutex<VecDeque<RenderOutcome>>,
        repeat: RenderOutcome,
        seen: Mutex<Vec<(PathBuf, ScriptDocument)>>,
    }

    impl ScriptedRenderer {
        fn new(outcomes: Vec<RenderOutcome>, repeat: RenderOutcome) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                repeat,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<(PathBuf, ScriptDocument)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Renderer for ScriptedRenderer {
        async fn render(&self, request: &RenderRequest) -> RenderOutcome {
            let bytes = std::fs::read(&request.script_path).unwrap();
            let doc: ScriptDocument = serde_json::from_slice(&bytes).unwrap();
            self.seen.lock().unwrap().push((request.script_path.clone(), doc));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.repeat.clone())
        }
    }

    fn blocked(beats: &[usize]) -> RenderOutcome {
        RenderOutcome::ModerationBlocked {
            failed_beats: beats.iter().copied().collect(),
            message: "moderation_blocked".to_string(),
        }
    }

    fn success(dir: &Path) -> RenderOutcome {
        RenderOutcome::Success {
            artifact: dir.join("job.mp4"),
        }
    }

    fn script(beats: usize) -> ScriptDocument {
        let beats: Vec<_> = (0..beats)
            .map(|i| json!({"speaker": "N", "text": format!("line {}", i), "imagePrompt": format!("scene {}", i)}))
            .collect();
        serde_json::from_value(json!({ "beats": beats })).unwrap()
    }

    fn plan(dir: &Path) -> RenderPlan {
        RenderPlan {
            mode: RenderMode::Movie,
            workdir: dir.to_path_buf(),
            output_dir: dir.join("output"),
            desired_output: dir.join("job.mp4"),
            caption_lang: None,
        }
    }

    #[test]
    fn test_variant_file_names() {
        assert_eq!(variant_file_name(1), "script.json");
        assert_eq!(variant_file_name(3), "script_attempt_3.json");
    }

    #[tokio::test]
    async fn test_replacements_accumulate() {
        let dir = TempDir::new().unwrap();
        let renderer = ScriptedRenderer::new(
            vec![blocked(&[1]), blocked(&[3])],
            success(dir.path()),
        );
        let original = script(5);

        let report = ModerationRecovery::new(&renderer, FALLBACK, 5)
            .run(&original, &plan(dir.path()))
            .await;

        assert!(report.result.is_ok());
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.replaced_beats.into_iter().collect::<Vec<_>>(), vec![1, 3]);

        let seen = renderer.seen();
        let last = &seen[2].1;
        assert_eq!(last.beats[1].image.as_ref().and_then(|i| i.url()), Some(FALLBACK));
        assert_eq!(last.beats[3].image.as_ref().and_then(|i| i.url()), Some(FALLBACK));
        assert_eq!(last.beats[0], original.beats[0]);
        assert!(seen[2].0.ends_with("script_attempt_3.json"));
        assert!(dir.path().join("script.json").exists());
        assert!(dir.path().join("script_attempt_2.json").exists());
    }

    #[tokio::test]
    async fn test_out_of_range_indices_fall_back_to_all() {
        let dir = TempDir::new().unwrap();
        let renderer = ScriptedRenderer::new(vec![blocked(&[42])], success(dir.path()));

        let report = ModerationRecovery::new(&renderer, FALLBACK, 5)
            .run(&script(3), &plan(dir.path()))
            .await;

        assert!(report.result.is_ok());
        assert!(report.all_fallback);
        let seen = renderer.seen();
        assert!(seen[1].1.beats.iter().all(|b| b.image.as_ref().and_then(|i| i.url()) == Some(FALLBACK)));
    }

    #[tokio::test]
    async fn test_blocked_all_fallback_is_exhausted() {
        let dir = TempDir::new().unwrap();
        let renderer = ScriptedRenderer::new(vec![], blocked(&[]));

        let report = ModerationRecovery::new(&renderer, FALLBACK, 5)
            .run(&script(3), &plan(dir.path()))
            .await;

        assert_eq!(report.attempts.len(), 2);
        assert!(matches!(
            report.result,
            Err(WorkerError::ModerationExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_stops_the_loop() {
        let dir = TempDir::new().unwrap();
        let renderer = ScriptedRenderer::new(
            vec![
                blocked(&[0]),
                RenderOutcome::Failure {
                    message: "renderer timed out after 600 seconds".to_string(),
                    timed_out: true,
                },
            ],
            success(dir.path()),
        );

        let report = ModerationRecovery::new(&renderer, FALLBACK, 5)
            .run(&script(2), &plan(dir.path()))
            .await;

        assert_eq!(report.attempts.len(), 2);
        assert!(matches!(report.result, Err(WorkerError::RenderTimeout(_))));
    }

    #[tokio::test]
    async fn test_render_ceiling() {
        let dir = TempDir::new().unwrap();
        let renderer = ScriptedRenderer::new(vec![], blocked(&[0]));

        let report = ModerationRecovery::new(&renderer, FALLBACK, 5)
            .run(&script(4), &plan(dir.path()))
            .await;

        assert_eq!(report.attempts.len(), 6);
        assert!(report.all_fallback);
        assert!(report.result.is_err());
    }
}
