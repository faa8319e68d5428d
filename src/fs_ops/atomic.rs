//! Atomic rename helper.
//! - On Windows, removes an existing destination file first (MoveFileEx without
//!   REPLACE_EXISTING won't overwrite).
//! - On Unix, best-effort fsync of the destination directory after rename.

use std::fs;
use std::io;
use std::path::Path;
use tracing::trace;

use super::util::fsync_dir;

/// Rename `src` to `dst`, replacing a destination file if one is present.
pub(crate) fn replace(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if dst.is_file() {
            if let Err(e) = fs::remove_file(dst) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e);
                }
            }
        }
    }

    fs::rename(src, dst)?;
    trace!(src = %src.display(), dst = %dst.display(), "renamed");

    if let Some(parent) = dst.parent() {
        // Ignore fsync errors to avoid turning a successful rename into a failure.
        let _ = fsync_dir(parent);
    }
    Ok(())
}

/// Async counterpart of [`replace`].
pub(crate) async fn replace_async(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if tokio::fs::metadata(dst).await.map(|m| m.is_file()).unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(dst).await {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e);
                }
            }
        }
    }

    tokio::fs::rename(src, dst).await?;
    trace!(src = %src.display(), dst = %dst.display(), "renamed");

    if let Some(parent) = dst.parent() {
        let parent = parent.to_path_buf();
        let _ = tokio::task::spawn_blocking(move || fsync_dir(&parent)).await;
    }
    Ok(())
}
