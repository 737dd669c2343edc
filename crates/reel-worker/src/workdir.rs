//! Per-job working directory.

use std::path::{Path, PathBuf};

use reel_models::JobId;
use tokio::fs;
use tracing::{debug, warn};

/// Scratch directory owned by one job, removed when the job ends.
///
/// Call [`WorkingDirectory::cleanup`] on every normal exit. If the owner is
/// dropped without it (panic, cancelled task), `Drop` removes the directory
/// synchronously.
#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    removed: bool,
}

impl WorkingDirectory {
    /// Create `<base>/<jobId>`, clearing anything left by an earlier run.
    pub async fn create(base: &Path, job_id: &JobId) -> std::io::Result<Self> {
        let path = base.join(job_id.to_string());
        if fs::metadata(&path).await.is_ok() {
            debug!("Removing stale working directory {}", path.display());
            fs::remove_dir_all(&path).await?;
        }
        fs::create_dir_all(&path).await?;
        Ok(Self { path, removed: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    /// Remove the directory tree.
    pub async fn cleanup(mut self) {
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!("Removed working directory {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove working directory {}: {}", self.path.display(), e),
        }
        self.removed = true;
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove working directory {}: {}", self.path.display(), e);
            }
        }
    }
}

/// A regular file found under a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    /// Path relative to the walked directory, with `/` separators
    pub relative: String,
    pub size: u64,
}

/// Every regular file under `dir`, sorted by relative path.
pub async fn walk_files(dir: &Path) -> std::io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let size = entry.metadata().await?.len();
                let relative = relative_key(dir, &path);
                files.push(LocalFile { path, relative, size });
            }
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

fn relative_key(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
