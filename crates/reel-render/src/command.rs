//! Renderer command builder and runner.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{RenderError, RenderResult};

/// How long output is still collected after the renderer exits.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Builder for one renderer invocation:
/// `<program> <prefix...> <mode> <script> -o <output>`.
#[derive(Debug, Clone)]
pub struct RenderCommand {
    program: String,
    args_prefix: Vec<String>,
    mode: String,
    script: PathBuf,
    output: PathBuf,
}

impl RenderCommand {
    pub fn new(program: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args_prefix: Vec::new(),
            mode: mode.into(),
            script: PathBuf::new(),
            output: PathBuf::new(),
        }
    }

    /// Arguments placed before the mode.
    pub fn prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args_prefix.extend(args.into_iter().map(Into::into));
        self
    }

    /// Script path, relative to the renderer root.
    pub fn script(mut self, path: impl AsRef<Path>) -> Self {
        self.script = path.as_ref().to_path_buf();
        self
    }

    /// Output directory, relative to the renderer root.
    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.output = path.as_ref().to_path_buf();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.args_prefix.clone();
        args.push(self.mode.clone());
        args.push(self.script.to_string_lossy().to_string());
        args.push("-o".to_string());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Captured result of a finished (or killed) process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed or terminated by a signal
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr lines
    pub output: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Last `n` lines of output, for error messages.
    pub fn tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self.output.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

/// Run a command from `cwd`, capturing combined output and killing it after `timeout`.
pub async fn run_captured(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> RenderResult<ProcessOutput> {
    debug!("Running renderer: {} {}", program.display(), args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
    }
    drop(tx);

    let collector = tokio::spawn(async move {
        let mut combined = String::new();
        while let Some(line) = rx.recv().await {
            combined.push_str(&line);
            combined.push('\n');
        }
        combined
    });

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            warn!(
                "Renderer timed out after {} seconds, killing process",
                timeout.as_secs()
            );
            if let Err(e) = child.kill().await {
                warn!("Failed to kill renderer process: {}", e);
            }
            (None, true)
        }
    };

    // Background processes left by the renderer can hold the pipes open
    // indefinitely, so draining is bounded too.
    let drain_deadline = tokio::time::Instant::now() + OUTPUT_DRAIN_GRACE;
    for mut reader in readers {
        if timed_out {
            reader.abort();
            continue;
        }
        if tokio::time::timeout_at(drain_deadline, &mut reader).await.is_err() {
            debug!("Renderer output still open after exit, abandoning reader");
            reader.abort();
        }
    }
    let output = collector.await.unwrap_or_default();

    Ok(ProcessOutput {
        exit_code,
        output,
        timed_out,
    })
}

async fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).is_err() {
            break;
        }
    }
}

/// Express `path` relative to `root`, refusing anything that escapes it.
pub fn relative_to_root(root: &Path, path: &Path) -> RenderResult<PathBuf> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root)
            .map_err(|_| RenderError::outside_root(path, root))?
            .to_path_buf()
    } else {
        path.to_path_buf()
    };

    let escapes = relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes || relative.as_os_str().is_empty() {
        return Err(RenderError::outside_root(path, root));
    }

    Ok(relative)
}

/// Locate the renderer program.
///
/// Bare names are looked up on PATH; paths are resolved against `root`.
pub fn resolve_program(program: &str, root: &Path) -> RenderResult<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        return if resolved.exists() {
            Ok(resolved)
        } else {
            Err(RenderError::ProgramNotFound(program.to_string()))
        };
    }

    which::which(program).map_err(|_| RenderError::ProgramNotFound(program.to_string()))
}
