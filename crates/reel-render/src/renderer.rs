//! The renderer interface and its CLI implementation.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reel_models::JobKind;
use tracing::{info, warn};

use crate::command::{relative_to_root, resolve_program, run_captured, RenderCommand};
use crate::config::RendererConfig;
use crate::moderation::{failed_image_indices, is_moderation_blocked};
use crate::output::{
    clear_previous_output, resolve_preview_output, resolve_video_output, video_candidates,
};

/// Output lines kept in failure messages.
const FAILURE_TAIL_LINES: usize = 20;

/// What the renderer is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Narration audio per beat
    Audio,
    /// Images per beat
    Images,
    /// Full video
    Movie,
}

impl RenderMode {
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::Video => RenderMode::Movie,
            JobKind::ImagePreview => RenderMode::Images,
            JobKind::AudioPreview => RenderMode::Audio,
        }
    }

    /// Command-line mode argument.
    pub fn as_arg(&self) -> &'static str {
        match self {
            RenderMode::Audio => "audio",
            RenderMode::Images => "images",
            RenderMode::Movie => "movie",
        }
    }

    /// Subdirectory of the output dir holding preview files.
    pub fn preview_subdir(&self) -> Option<&'static str> {
        match self {
            RenderMode::Audio => Some("audio"),
            RenderMode::Images => Some("images"),
            RenderMode::Movie => None,
        }
    }

    /// File extensions a successful preview must contain.
    pub fn preview_extensions(&self) -> &'static [&'static str] {
        match self {
            RenderMode::Audio => &["mp3", "wav"],
            RenderMode::Images => &["png"],
            RenderMode::Movie => &[],
        }
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// One renderer invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub mode: RenderMode,
    /// Script file, inside the renderer root
    pub script_path: PathBuf,
    /// Output directory, inside the renderer root
    pub output_dir: PathBuf,
    /// Canonical location of the video (movie mode)
    pub desired_output: PathBuf,
    /// Caption language when captions are enabled
    pub caption_lang: Option<String>,
    /// Overrides the per-mode timeout from config
    pub timeout: Option<Duration>,
}

impl RenderRequest {
    fn script_basename(&self) -> String {
        self.script_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| crate::output::DEFAULT_BASENAME.to_string())
    }
}

/// Classified result of one renderer invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// The artifact exists at its canonical path (file or directory)
    Success { artifact: PathBuf },
    /// A moderation marker was seen; empty `failed_beats` means unknown beats
    ModerationBlocked {
        failed_beats: BTreeSet<usize>,
        message: String,
    },
    /// Anything else, including timeouts
    Failure { message: String, timed_out: bool },
}

impl RenderOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        RenderOutcome::Failure {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RenderOutcome::Success { .. } => "success",
            RenderOutcome::ModerationBlocked { .. } => "moderation_blocked",
            RenderOutcome::Failure { timed_out: true, .. } => "timeout",
            RenderOutcome::Failure { .. } => "failure",
        }
    }
}

/// Something that turns a script file into an artifact.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> RenderOutcome;
}

/// Renderer driven as an external command-line process.
#[derive(Debug, Clone)]
pub struct CliRenderer {
    config: RendererConfig,
}

impl CliRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    fn build_command(&self, request: &RenderRequest) -> Result<RenderCommand, String> {
        let root = &self.config.root;
        let script = relative_to_root(root, &request.script_path).map_err(|e| e.to_string())?;
        let output = relative_to_root(root, &request.output_dir).map_err(|e| e.to_string())?;

        Ok(RenderCommand::new(&self.config.program, request.mode.as_arg())
            .prefix_args(self.config.args_prefix.iter().cloned())
            .script(script)
            .output(output))
    }

    async fn locate_output(&self, request: &RenderRequest) -> Result<Option<PathBuf>, String> {
        let basename = request.script_basename();
        let located = match request.mode.preview_subdir() {
            None => {
                resolve_video_output(
                    &request.output_dir,
                    &basename,
                    request.caption_lang.as_deref(),
                    &request.desired_output,
                )
                .await
            }
            Some(subdir) => {
                resolve_preview_output(
                    &request.output_dir,
                    subdir,
                    &basename,
                    request.mode.preview_extensions(),
                )
                .await
            }
        };
        located.map_err(|e| format!("failed to collect renderer output: {}", e))
    }
}

#[async_trait]
impl Renderer for CliRenderer {
    async fn render(&self, request: &RenderRequest) -> RenderOutcome {
        let command = match self.build_command(request) {
            Ok(cmd) => cmd,
            Err(message) => return RenderOutcome::failure(message),
        };
        let program = match resolve_program(command.program(), &self.config.root) {
            Ok(p) => p,
            Err(e) => return RenderOutcome::failure(e.to_string()),
        };
        if let Err(e) = tokio::fs::create_dir_all(&request.output_dir).await {
            return RenderOutcome::failure(format!(
                "failed to create output dir {}: {}",
                request.output_dir.display(),
                e
            ));
        }

        let stale = video_candidates(
            &request.output_dir,
            &request.script_basename(),
            request.caption_lang.as_deref(),
            &request.desired_output,
        );
        if let Err(e) = clear_previous_output(&request.output_dir, request.mode.preview_subdir(), &stale).await {
            return RenderOutcome::failure(format!("failed to clear previous output: {}", e));
        }

        let timeout = request
            .timeout
            .unwrap_or_else(|| self.config.timeout_for(request.mode));
        let started = Instant::now();
        info!(
            mode = %request.mode,
            script = %request.script_path.display(),
            timeout_secs = timeout.as_secs(),
            "Invoking renderer"
        );

        let process = match run_captured(&program, &command.build_args(), &self.config.root, timeout).await {
            Ok(p) => p,
            Err(e) => return RenderOutcome::failure(format!("failed to run renderer: {}", e)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if process.timed_out {
            warn!(mode = %request.mode, elapsed_ms, "Renderer timed out");
            return RenderOutcome::Failure {
                message: format!("renderer timed out after {} seconds", timeout.as_secs()),
                timed_out: true,
            };
        }

        if process.success() {
            match self.locate_output(request).await {
                Ok(Some(artifact)) => {
                    info!(mode = %request.mode, elapsed_ms, artifact = %artifact.display(), "Render succeeded");
                    return RenderOutcome::Success { artifact };
                }
                Ok(None) => {}
                Err(message) => return RenderOutcome::failure(message),
            }
        }

        if is_moderation_blocked(&process.output) {
            let failed_beats = failed_image_indices(&process.output);
            warn!(
                mode = %request.mode,
                failed_beats = ?failed_beats,
                "Renderer output reports a moderation block"
            );
            return RenderOutcome::ModerationBlocked {
                failed_beats,
                message: process.tail(FAILURE_TAIL_LINES),
            };
        }

        let message = match process.exit_code {
            Some(0) => format!(
                "renderer exited successfully but produced no output in {}",
                request.output_dir.display()
            ),
            Some(code) => format!(
                "renderer exited with code {}: {}",
                code,
                process.tail(FAILURE_TAIL_LINES)
            ),
            None => format!(
                "renderer terminated by signal: {}",
                process.tail(FAILURE_TAIL_LINES)
            ),
        };
        RenderOutcome::failure(message)
    }
}
