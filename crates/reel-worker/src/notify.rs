//! Out-of-band operator notifications.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reel_models::JobId;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// A terminal job failure worth a human's attention.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureNotice {
    pub job_id: JobId,
    pub title: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureNotice {
    pub fn new(job_id: JobId, title: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id,
            title: title.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Human-readable summary line.
    pub fn text(&self) -> String {
        let title = if self.title.is_empty() { "(untitled)" } else { &self.title };
        format!(
            "Video generation failed for \"{}\" (job {}): {}",
            title, self.job_id, self.error
        )
    }
}

/// Delivers operator notifications. Delivery failures are never fatal.
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify_failure(&self, notice: &FailureNotice);
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody<'a> {
    text: String,
    job_id: &'a JobId,
    title: &'a str,
    error: &'a str,
    timestamp: &'a DateTime<Utc>,
}

/// Posts notices as JSON to a chat-style incoming webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, url: url.into() })
    }
}

#[async_trait]
impl OperatorNotifier for WebhookNotifier {
    async fn notify_failure(&self, notice: &FailureNotice) {
        let body = WebhookBody {
            text: notice.text(),
            job_id: &notice.job_id,
            title: &notice.title,
            error: &notice.error,
            timestamp: &notice.timestamp,
        };

        match self.http.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(job_id = %notice.job_id, "Operator notified of failure");
            }
            Ok(resp) => {
                warn!(job_id = %notice.job_id, status = %resp.status(), "Operator webhook rejected notification");
            }
            Err(e) => {
                warn!(job_id = %notice.job_id, "Failed to notify operator: {}", e);
            }
        }
    }
}
