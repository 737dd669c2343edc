//! Artifact descriptors returned to callers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One file stored in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UploadedFile {
    /// Path relative to the uploaded root (forward slashes)
    pub path: String,
    /// Public URL
    pub url: String,
    /// Size in bytes
    pub size: u64,
}

/// Probed properties of a rendered video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    /// Primary URL: the video file, or the preview tree root
    pub artifact_url: String,
    pub files: Vec<UploadedFile>,
    pub file_count: u32,
    /// Served from a previous run instead of rendered
    pub reused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoMetadata>,
}

impl ArtifactSummary {
    /// Build a summary, deriving the count from the file list.
    pub fn new(artifact_url: impl Into<String>, files: Vec<UploadedFile>, reused: bool) -> Self {
        let file_count = files.len() as u32;
        Self {
            artifact_url: artifact_url.into(),
            files,
            file_count,
            reused,
            video: None,
        }
    }

    /// Total bytes across all files.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Sorted list of file URLs.
    pub fn urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.files.iter().map(|f| f.url.as_str()).collect();
        urls.sort_unstable();
        urls
    }
}
