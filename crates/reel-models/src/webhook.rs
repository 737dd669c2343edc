//! Inbound webhook envelope.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobKind, JobSubmission};

/// Webhook event types and the job kind each one triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookType {
    VideoGeneration,
    ImagePreview,
    AudioPreview,
}

impl WebhookType {
    /// Parse the wire name. The audio preview name is hyphenated on the wire.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video_generation" => Some(WebhookType::VideoGeneration),
            "image_preview" => Some(WebhookType::ImagePreview),
            "audio-preview" => Some(WebhookType::AudioPreview),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookType::VideoGeneration => "video_generation",
            WebhookType::ImagePreview => "image_preview",
            WebhookType::AudioPreview => "audio-preview",
        }
    }

    pub fn job_kind(&self) -> JobKind {
        match self {
            WebhookType::VideoGeneration => JobKind::Video,
            WebhookType::ImagePreview => JobKind::ImagePreview,
            WebhookType::AudioPreview => JobKind::AudioPreview,
        }
    }

    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::Video => WebhookType::VideoGeneration,
            JobKind::ImagePreview => WebhookType::ImagePreview,
            JobKind::AudioPreview => WebhookType::AudioPreview,
        }
    }
}

/// `POST /webhook` body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: JobSubmission,
}

impl WebhookEnvelope {
    pub fn new(kind: JobKind, payload: JobSubmission) -> Self {
        Self {
            event_type: WebhookType::for_kind(kind).as_str().to_string(),
            payload,
        }
    }

    pub fn webhook_type(&self) -> Option<WebhookType> {
        WebhookType::parse(&self.event_type)
    }
}
