//! Locating and canonicalising renderer output.
//!
//! The renderer names its output after the script file, with a language
//! suffix when captions are on, and falls back to its own defaults. Whatever
//! it produced is relocated to one canonical path by copy-then-remove, which
//! also works when the renderer root and the working directory sit on
//! different filesystems.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::RenderResult;

/// Renderer's default basename when it ignores the script name.
pub const DEFAULT_BASENAME: &str = "script";

/// Candidate video paths, in resolution order.
pub fn video_candidates(
    output_dir: &Path,
    basename: &str,
    caption_lang: Option<&str>,
    desired: &Path,
) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(4);
    if let Some(lang) = caption_lang {
        candidates.push(output_dir.join(format!("{}__{}.mp4", basename, lang)));
    }
    candidates.push(output_dir.join(format!("{}.mp4", basename)));
    candidates.push(output_dir.join(format!("{}.mp4", DEFAULT_BASENAME)));
    candidates.push(desired.to_path_buf());
    candidates.dedup();
    candidates
}

/// Find the rendered video and make `desired` the only copy.
pub async fn resolve_video_output(
    output_dir: &Path,
    basename: &str,
    caption_lang: Option<&str>,
    desired: &Path,
) -> RenderResult<Option<PathBuf>> {
    for candidate in video_candidates(output_dir, basename, caption_lang, desired) {
        if !is_file(&candidate).await {
            continue;
        }
        if candidate != desired {
            debug!("Relocating {} to {}", candidate.display(), desired.display());
            copy_then_remove(&candidate, desired).await?;
        }
        return Ok(Some(desired.to_path_buf()));
    }
    Ok(None)
}

/// Find a preview directory under `<output>/<subdir>` and canonicalise it to
/// `<output>/<subdir>/script`.
///
/// A directory only counts when it holds at least one file with one of the
/// `extensions`.
pub async fn resolve_preview_output(
    output_dir: &Path,
    subdir: &str,
    basename: &str,
    extensions: &[&str],
) -> RenderResult<Option<PathBuf>> {
    let parent = output_dir.join(subdir);
    let canonical = parent.join(DEFAULT_BASENAME);

    let mut candidates = vec![parent.join(basename)];
    if basename != DEFAULT_BASENAME {
        candidates.push(canonical.clone());
    }

    for candidate in candidates {
        if !contains_extension(&candidate, extensions).await? {
            continue;
        }
        if candidate != canonical {
            if fs::metadata(&canonical).await.is_ok() {
                fs::remove_dir_all(&canonical).await?;
            }
            debug!("Relocating {} to {}", candidate.display(), canonical.display());
            copy_dir(&candidate, &canonical).await?;
            if let Err(e) = fs::remove_dir_all(&candidate).await {
                warn!("Failed to remove {} after copy: {}", candidate.display(), e);
            }
        }
        return Ok(Some(canonical));
    }
    Ok(None)
}

/// Remove leftovers of earlier attempts that a later attempt could be
/// mistaken for: the whole `<output>/<subdir>` tree for previews, or every
/// video candidate for movies.
pub async fn clear_previous_output(
    output_dir: &Path,
    subdir: Option<&str>,
    video_candidates: &[PathBuf],
) -> RenderResult<()> {
    match subdir {
        Some(subdir) => {
            let parent = output_dir.join(subdir);
            if fs::metadata(&parent).await.is_ok() {
                debug!("Clearing previous preview output {}", parent.display());
                fs::remove_dir_all(&parent).await?;
            }
        }
        None => {
            for candidate in video_candidates {
                if is_file(candidate).await {
                    debug!("Clearing previous video output {}", candidate.display());
                    fs::remove_file(candidate).await?;
                }
            }
        }
    }
    Ok(())
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn contains_extension(dir: &Path, extensions: &[&str]) -> RenderResult<bool> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if matches && entry.file_type().await?.is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Copy a file to `dst`, then delete the source.
pub async fn copy_then_remove(src: &Path, dst: &Path) -> RenderResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(src, dst).await?;

    if let Err(e) = fs::remove_file(src).await {
        warn!("Failed to remove {} after copy: {}", src.display(), e);
    }
    Ok(())
}

/// Recursively copy a directory tree.
pub async fn copy_dir(src: &Path, dst: &Path) -> RenderResult<()> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), &target).await?;
            }
        }
    }
    Ok(())
}
