//! Error types for renderer operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while driving the renderer or probing its output.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer program not found: {0}")]
    ProgramNotFound(String),

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Path {path} is outside the renderer root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Renderer timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid renderer configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl RenderError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn outside_root(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self::OutsideRoot {
            path: path.into(),
            root: root.into(),
        }
    }
}
