//! Filesystem operations: modularized.

mod atomic;
pub(crate) mod helpers;
pub(crate) mod io_copy;
mod metadata;
pub(crate) mod tree;
pub mod names;
pub mod probe;
pub mod relocate;
pub mod resolve;
pub(crate) mod util;

pub use io_copy::buffer_size_for;
pub use names::{NameKind, normalize_path, validate_name};
pub use probe::{wait_available, wait_available_async};
pub use relocate::{CrossVolumeMove, MoveState};
pub use resolve::resolve_destination;

pub(crate) use atomic::{replace, replace_async};
pub(crate) use metadata::preserve_metadata;

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, StorageError};

/// Stat the source of an operation, mapping absence to [`StorageError::NotFound`].
pub(crate) fn stat_source(path: &Path) -> Result<fs::Metadata> {
    match fs::metadata(path) {
        Ok(m) => Ok(m),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn stat_source_async(path: &Path) -> Result<fs::Metadata> {
    match tokio::fs::metadata(path).await {
        Ok(m) => Ok(m),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

/// Final component of an entity path.
pub(crate) fn entry_name(path: &Path) -> Result<&OsStr> {
    path.file_name().ok_or_else(|| StorageError::InvalidPath {
        path: path.to_string_lossy().into_owned(),
        reason: "path has no final component",
    })
}

/// `name` next to `path`, in the same parent.
pub(crate) fn sibling(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

pub(crate) fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(StorageError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run blocking filesystem work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Io(io::Error::other(e)))?
}
