//! Artifact uploads with retry.

use std::path::Path;
use std::sync::Arc;

use reel_models::UploadedFile;
use reel_storage::{content_type_for, ArtifactStore, StorageError};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::retry::{retry_async, RetryConfig};
use crate::workdir::walk_files;

/// Uploads finished artifacts to the store.
///
/// Single files retry transient failures with exponential backoff. Primary
/// artifact uploads additionally share a concurrency cap; tree uploads do not.
#[derive(Clone)]
pub struct UploadManager {
    store: Arc<dyn ArtifactStore>,
    retry: RetryConfig,
    primary_slots: Arc<Semaphore>,
}

impl UploadManager {
    pub fn new(store: Arc<dyn ArtifactStore>, retry: RetryConfig, max_concurrent: usize) -> Self {
        Self {
            store,
            retry,
            primary_slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Upload one file and return its public URL.
    pub async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> WorkerResult<String> {
        let result = retry_async(&self.retry, StorageError::is_transient, || {
            self.store.upload_file(path, key, content_type)
        })
        .await;

        match result.into_result() {
            Ok(()) => {
                debug!(key = %key, "Uploaded {}", path.display());
                Ok(self.store.public_url(key))
            }
            Err((error, attempts)) => {
                if error.is_unexpected_response() {
                    warn!(key = %key, attempts, "Storage backend answered with a non-API page: {}", error);
                }
                if error.is_transient() {
                    Err(WorkerError::UploadTransient {
                        key: key.to_string(),
                        attempts,
                        message: error.to_string(),
                    })
                } else {
                    Err(WorkerError::UploadFatal {
                        key: key.to_string(),
                        message: error.to_string(),
                    })
                }
            }
        }
    }

    /// Upload the primary artifact of a job, waiting for a free slot first.
    pub async fn upload_primary(&self, path: &Path, key: &str) -> WorkerResult<UploadedFile> {
        let _slot = self
            .primary_slots
            .acquire()
            .await
            .map_err(|_| WorkerError::UploadFatal {
                key: key.to_string(),
                message: "upload limiter closed".to_string(),
            })?;

        let size = tokio::fs::metadata(path).await?.len();
        let url = self.upload_file(path, key, content_type_for(path)).await?;
        metrics::record_uploaded_bytes(size);
        info!(key = %key, bytes = size, "Uploaded primary artifact");

        Ok(UploadedFile {
            path: key.to_string(),
            url,
            size,
        })
    }

    /// Upload every file under `dir` to `prefix/<relative path>`.
    ///
    /// The first failing file aborts the whole tree.
    pub async fn upload_tree(&self, dir: &Path, prefix: &str) -> WorkerResult<Vec<UploadedFile>> {
        let files = walk_files(dir).await?;
        let prefix = prefix.trim_end_matches('/');
        let mut uploaded = Vec::with_capacity(files.len());

        for file in files {
            let key = format!("{}/{}", prefix, file.relative);
            let url = self
                .upload_file(&file.path, &key, content_type_for(&file.path))
                .await?;
            metrics::record_uploaded_bytes(file.size);
            uploaded.push(UploadedFile {
                path: file.relative,
                url,
                size: file.size,
            });
        }

        info!(prefix = %prefix, files = uploaded.len(), "Uploaded artifact tree");
        Ok(uploaded)
    }

    /// Free primary upload slots.
    pub fn available_slots(&self) -> usize {
        self.primary_slots.available_permits()
    }
}
