//! Worker configuration.

use std::time::Duration;

use reel_render::RendererConfig;
use url::Url;

use crate::error::{WorkerError, WorkerResult};

/// Placeholder used when `FALLBACK_IMAGE_URL` is not set.
pub const DEFAULT_FALLBACK_IMAGE_URL: &str =
    "https://storage.googleapis.com/reelforge-public/fallback/safe-placeholder.png";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// External renderer settings
    pub renderer: RendererConfig,
    /// Jobs allowed in flight at once
    pub admission_capacity: usize,
    /// Selective moderation retries before the all-fallback attempt
    pub moderation_max_attempts: u32,
    /// Known-safe image substituted for blocked beats
    pub fallback_image_url: String,
    /// Upload retries after the first attempt
    pub upload_max_retries: u32,
    pub upload_base_delay: Duration,
    pub upload_max_delay: Duration,
    /// Concurrent primary-artifact uploads
    pub upload_max_concurrent: usize,
    /// Completion poller settings
    pub poll_max_attempts: u32,
    pub poll_interval: Duration,
    /// Operator webhook; `None` disables notifications
    pub operator_webhook_url: Option<String>,
}

impl WorkerConfig {
    /// Defaults around a renderer config.
    pub fn new(renderer: RendererConfig) -> Self {
        Self {
            renderer,
            admission_capacity: 1,
            moderation_max_attempts: 5,
            fallback_image_url: DEFAULT_FALLBACK_IMAGE_URL.to_string(),
            upload_max_retries: 3,
            upload_base_delay: Duration::from_millis(1000),
            upload_max_delay: Duration::from_millis(30_000),
            upload_max_concurrent: 2,
            poll_max_attempts: 60,
            poll_interval: Duration::from_secs(5),
            operator_webhook_url: None,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let renderer = RendererConfig::from_env()?;
        let defaults = Self::new(renderer);

        let fallback_image_url = std::env::var("FALLBACK_IMAGE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| defaults.fallback_image_url.clone());
        Url::parse(&fallback_image_url).map_err(|e| {
            WorkerError::config_error(format!("FALLBACK_IMAGE_URL is not a valid URL: {}", e))
        })?;

        let operator_webhook_url = match std::env::var("OPERATOR_WEBHOOK_URL") {
            Ok(u) if !u.trim().is_empty() => {
                Url::parse(&u).map_err(|e| {
                    WorkerError::config_error(format!("OPERATOR_WEBHOOK_URL is not a valid URL: {}", e))
                })?;
                Some(u)
            }
            _ => None,
        };

        Ok(Self {
            admission_capacity: env_parse("ADMISSION_CAPACITY")
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.admission_capacity),
            moderation_max_attempts: env_parse("MODERATION_MAX_ATTEMPTS")
                .unwrap_or(defaults.moderation_max_attempts),
            fallback_image_url,
            upload_max_retries: env_parse("UPLOAD_MAX_RETRIES").unwrap_or(defaults.upload_max_retries),
            upload_base_delay: env_parse("UPLOAD_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.upload_base_delay),
            upload_max_delay: env_parse("UPLOAD_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.upload_max_delay),
            upload_max_concurrent: env_parse("UPLOAD_MAX_CONCURRENT")
                .filter(|c: &usize| *c > 0)
                .unwrap_or(defaults.upload_max_concurrent),
            poll_max_attempts: env_parse("POLL_MAX_ATTEMPTS").unwrap_or(defaults.poll_max_attempts),
            poll_interval: env_parse("POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            operator_webhook_url,
            renderer: defaults.renderer,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "RENDERER_ROOT",
        "ADMISSION_CAPACITY",
        "MODERATION_MAX_ATTEMPTS",
        "FALLBACK_IMAGE_URL",
        "UPLOAD_MAX_CONCURRENT",
        "OPERATOR_WEBHOOK_URL",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        std::env::set_var("RENDERER_ROOT", "/srv/renderer");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.admission_capacity, 1);
        assert_eq!(config.moderation_max_attempts, 5);
        assert_eq!(config.upload_max_retries, 3);
        assert_eq!(config.upload_max_concurrent, 2);
        assert_eq!(config.poll_max_attempts, 60);
        assert!(config.operator_webhook_url.is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides_and_zero_capacity() {
        clear_env();
        std::env::set_var("RENDERER_ROOT", "/srv/renderer");
        std::env::set_var("ADMISSION_CAPACITY", "0");
        std::env::set_var("MODERATION_MAX_ATTEMPTS", "2");
        std::env::set_var("OPERATOR_WEBHOOK_URL", "https://hooks.example.com/alerts");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.admission_capacity, 1);
        assert_eq!(config.moderation_max_attempts, 2);
        assert_eq!(
            config.operator_webhook_url.as_deref(),
            Some("https://hooks.example.com/alerts")
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_fallback_url() {
        clear_env();
        std::env::set_var("RENDERER_ROOT", "/srv/renderer");
        std::env::set_var("FALLBACK_IMAGE_URL", "not a url");

        assert!(matches!(
            WorkerConfig::from_env(),
            Err(WorkerError::ConfigError(_))
        ));
        clear_env();
    }
}
