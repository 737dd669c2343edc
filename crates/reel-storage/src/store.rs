//! Artifact store interface.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// One entry of a single-level listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEntry {
    /// A key prefix that groups further entries (ends with `/`)
    Directory { prefix: String },
    /// A stored object
    File { key: String, size: u64 },
}

impl StoreEntry {
    pub fn key(&self) -> &str {
        match self {
            StoreEntry::Directory { prefix } => prefix,
            StoreEntry::File { key, .. } => key,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, StoreEntry::Directory { .. })
    }
}

/// Typed interface over the blob store holding rendered artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload a local file under `key`.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;

    /// Download `key` to a local path, creating parent directories.
    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// List the entries directly under `prefix`.
    ///
    /// When `prefix` ends with `/` it is treated as a directory; otherwise it
    /// matches keys starting with it at the same level.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<StoreEntry>>;

    /// Public URL for an object key.
    fn public_url(&self, key: &str) -> String;
}

/// Content type for an artifact, derived from its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("json") => "application/json",
        Some("srt") | Some("txt") => "text/plain",
        Some("vtt") => "text/vtt",
        _ => "application/octet-stream",
    }
}
