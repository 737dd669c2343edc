//! Artifact reuse.
//!
//! A job id that already has stored output is served from the store instead
//! of being rendered again. Mirroring is best effort: individual download
//! failures are logged and skipped.

use std::collections::{HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use reel_models::{JobId, JobKind};
use reel_storage::layout::{artifact_prefix, ARTIFACT_ROOT};
use reel_storage::{ArtifactStore, StoreEntry};
use tracing::{debug, info, warn};

/// Finds and mirrors previously produced artifacts.
#[derive(Clone)]
pub struct ReuseResolver {
    store: Arc<dyn ArtifactStore>,
}

impl ReuseResolver {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Storage prefix of an existing artifact for `(job_id, kind)`.
    ///
    /// Listing errors mean "not available" and fall through to a render.
    pub async fn find_existing(&self, job_id: &JobId, kind: JobKind) -> Option<String> {
        let prefix = artifact_prefix(job_id, kind);
        let entries = match self.store.list(&prefix).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(job_id = %job_id, prefix = %prefix, "Reuse check failed: {}", e);
                return None;
            }
        };

        let found = if is_directory_prefix(&prefix) {
            !entries.is_empty()
        } else {
            entries
                .iter()
                .any(|e| matches!(e, StoreEntry::File { key, .. } if *key == prefix))
        };

        if found {
            debug!(job_id = %job_id, prefix = %prefix, "Existing artifact found");
            Some(prefix)
        } else {
            None
        }
    }

    /// Mirror everything under `prefix` into `dest_dir`.
    ///
    /// Keys land at their path relative to the prefix; a single-object prefix
    /// lands at its file name. Returns whether at least one file was written.
    pub async fn materialize(&self, prefix: &str, dest_dir: &Path) -> bool {
        let base = mirror_base(prefix);
        let single_object = !is_directory_prefix(prefix);

        let mut pending = VecDeque::from([prefix.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut materialized = 0usize;

        while let Some(current) = pending.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }

            let entries = match self.store.list(&current).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(prefix = %current, "Failed to list artifact prefix: {}", e);
                    continue;
                }
            };

            for entry in entries {
                match entry {
                    StoreEntry::Directory { prefix: child } => {
                        if single_object || visited.contains(&child) || !child.starts_with(&base) {
                            continue;
                        }
                        pending.push_back(child);
                    }
                    StoreEntry::File { key, .. } => {
                        if single_object && key != prefix {
                            continue;
                        }
                        let Some(local) = local_path(dest_dir, &base, &key) else {
                            warn!(key = %key, "Skipping key outside the artifact prefix");
                            continue;
                        };
                        match self.store.download_file(&key, &local).await {
                            Ok(()) => materialized += 1,
                            Err(e) => warn!(key = %key, "Failed to download artifact file: {}", e),
                        }
                    }
                }
            }
        }

        info!(prefix = %prefix, files = materialized, "Mirrored stored artifact");
        materialized > 0
    }
}

fn is_directory_prefix(prefix: &str) -> bool {
    prefix.ends_with('/')
}

/// Key prefix stripped from mirrored keys.
fn mirror_base(prefix: &str) -> String {
    if is_directory_prefix(prefix) {
        return prefix.to_string();
    }
    match prefix.rfind('/') {
        Some(idx) => prefix[..=idx].to_string(),
        None => format!("{}/", ARTIFACT_ROOT),
    }
}

/// Local destination for `key`, refusing anything that escapes `dest_dir`.
fn local_path(dest_dir: &Path, base: &str, key: &str) -> Option<PathBuf> {
    let relative = Path::new(key.strip_prefix(base)?);
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(dest_dir.join(relative))
}
