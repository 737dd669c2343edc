//! Renderer configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RenderError, RenderResult};
use crate::renderer::RenderMode;

/// How to reach the external renderer.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Renderer working root; all paths handed to it are relative to this
    pub root: PathBuf,
    /// Program to execute
    pub program: String,
    /// Arguments inserted before the mode (e.g. `["run", "cli"]`)
    pub args_prefix: Vec<String>,
    /// Subdirectory of `root` holding per-job working directories
    pub work_subdir: String,
    pub audio_timeout: Duration,
    pub images_timeout: Duration,
    pub video_timeout: Duration,
}

impl RendererConfig {
    /// Defaults for a renderer rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            program: "render".to_string(),
            args_prefix: Vec::new(),
            work_subdir: "jobs".to_string(),
            audio_timeout: Duration::from_secs(600),
            images_timeout: Duration::from_secs(600),
            video_timeout: Duration::from_secs(1800),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> RenderResult<Self> {
        let root = std::env::var("RENDERER_ROOT")
            .map_err(|_| RenderError::config("RENDERER_ROOT not set"))?;
        let defaults = Self::new(root);

        Ok(Self {
            program: std::env::var("RENDERER_PROGRAM")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.program.clone()),
            args_prefix: std::env::var("RENDERER_ARGS")
                .map(|a| a.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            work_subdir: std::env::var("RENDERER_WORK_SUBDIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.work_subdir.clone()),
            audio_timeout: env_secs("RENDER_AUDIO_TIMEOUT_SECS").unwrap_or(defaults.audio_timeout),
            images_timeout: env_secs("RENDER_IMAGES_TIMEOUT_SECS").unwrap_or(defaults.images_timeout),
            video_timeout: env_secs("RENDER_VIDEO_TIMEOUT_SECS").unwrap_or(defaults.video_timeout),
            root: defaults.root,
        })
    }

    /// Timeout ceiling for a render mode.
    pub fn timeout_for(&self, mode: RenderMode) -> Duration {
        match mode {
            RenderMode::Audio => self.audio_timeout,
            RenderMode::Images => self.images_timeout,
            RenderMode::Movie => self.video_timeout,
        }
    }

    /// Directory holding per-job working directories.
    pub fn work_root(&self) -> PathBuf {
        self.root.join(&self.work_subdir)
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_timeouts_per_mode() {
        let config = RendererConfig::new("/srv/renderer");
        assert_eq!(config.timeout_for(RenderMode::Audio), Duration::from_secs(600));
        assert_eq!(config.timeout_for(RenderMode::Movie), Duration::from_secs(1800));
        assert_eq!(config.work_root(), PathBuf::from("/srv/renderer/jobs"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("RENDERER_ROOT", "/srv/renderer");
        std::env::set_var("RENDERER_ARGS", "run  cli");
        std::env::set_var("RENDER_VIDEO_TIMEOUT_SECS", "60");

        let config = RendererConfig::from_env().unwrap();
        assert_eq!(config.program, "render");
        assert_eq!(config.args_prefix, vec!["run", "cli"]);
        assert_eq!(config.video_timeout, Duration::from_secs(60));
        assert_eq!(config.images_timeout, Duration::from_secs(600));

        std::env::remove_var("RENDERER_ROOT");
        std::env::remove_var("RENDERER_ARGS");
        std::env::remove_var("RENDER_VIDEO_TIMEOUT_SECS");
    }
}
