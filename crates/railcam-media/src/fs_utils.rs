//! Filesystem helpers for segment promotion.
//!
//! Segments are recorded on a RAM-backed filesystem and promoted to disk,
//! so moves routinely cross devices.

use std::path::Path;

use tokio::fs;
use tracing::{debug, error, warn};

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, falling back to copy+delete across devices.
///
/// The copy lands in a temporary sibling of `dst` first and is renamed into
/// place, so readers of the destination directory never see a partial file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !fs::try_exists(src).await.unwrap_or(false) {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }
    ensure_parent(dst).await?;

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            debug!(
                "Cross-device rename, copying: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Remove a file, treating an already missing file as success.
///
/// Returns whether a file was removed.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> MediaResult<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn ensure_parent(path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(nix::errno::Errno::EXDEV as i32)
}

#[cfg(not(unix))]
fn is_cross_device_error(e: &std::io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    e.raw_os_error() == Some(17)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp_dst = dst.with_extension("part");

    if let Err(e) = fs::copy(src, &tmp_dst).await {
        error!(
            "Failed to copy segment: {} -> {}: {}",
            src.display(),
            tmp_dst.display(),
            e
        );
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        error!(
            "Failed to rename copied segment: {} -> {}: {}",
            tmp_dst.display(),
            dst.display(),
            e
        );
        return Err(e.into());
    }

    // The copy is complete; a leftover source only wastes RAM
    if let Err(e) = fs::remove_file(src).await {
        warn!("Failed to remove source after copy: {}: {}", src.display(), e);
    }
    Ok(())
}
