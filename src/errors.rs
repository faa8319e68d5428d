//! Typed error definitions for storage_ops.
//! Provides a small set of well-known failure modes for better logs and tests.
//!
//! Raw `io::Error`s travel inside [`StorageError::Io`] while an operation runs and are
//! converted to [`StorageError::OperationFailed`] at the operation boundary, so callers
//! only ever see one I/O failure shape.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fs_ops::helpers::hint_for;

/// Convenience alias used across the crate.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Public operation names carried by [`StorageError::OperationFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Copy,
    Move,
    Rename,
    Delete,
    Write,
    Metadata,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Copy => "copy",
            Operation::Move => "move",
            Operation::Rename => "rename",
            Operation::Delete => "delete",
            Operation::Write => "write",
            Operation::Metadata => "metadata",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("expected a directory but found a file: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("timed out waiting for exclusive access to {}", .0.display())]
    Busy(PathBuf),

    #[error("{op} failed for '{}'{}: {source}{hint}", .path.display(), DestSuffix(.dest.as_deref()))]
    OperationFailed {
        op: Operation,
        path: PathBuf,
        dest: Option<PathBuf>,
        hint: String,
        #[source]
        source: io::Error,
    },

    #[error("storage object has been disposed: {}", .0.display())]
    Disposed(PathBuf),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

struct DestSuffix<'a>(Option<&'a Path>);

impl fmt::Display for DestSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(d) => write!(f, " -> '{}'", d.display()),
            None => Ok(()),
        }
    }
}

impl StorageError {
    /// Wrap an I/O error with the attempted operation, the paths involved and an OS hint.
    pub fn operation_failed(op: Operation, path: &Path, dest: Option<&Path>, source: io::Error) -> Self {
        StorageError::OperationFailed {
            op,
            path: path.to_path_buf(),
            dest: dest.map(Path::to_path_buf),
            hint: hint_for(&source),
            source,
        }
    }

    /// Normalize an error leaving an operation: raw I/O becomes `OperationFailed`,
    /// everything else (including `Cancelled`) passes through untouched.
    pub fn at_boundary(self, op: Operation, path: &Path, dest: Option<&Path>) -> Self {
        match self {
            StorageError::Io(e) => StorageError::operation_failed(op, path, dest, e),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled)
    }

    /// Stable numeric code for logs and process exit status.
    pub fn code(&self) -> i32 {
        match self {
            StorageError::InvalidPath { .. } | StorageError::InvalidName { .. } => 2,
            StorageError::NotFound(_) => 3,
            StorageError::NotADirectory(_) => 4,
            StorageError::AlreadyExists(_) => 5,
            StorageError::Busy(_) => 6,
            StorageError::OperationFailed { .. } | StorageError::Io(_) => 7,
            StorageError::Disposed(_) => 8,
            StorageError::Cancelled => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_wraps_io_with_paths() {
        let err = StorageError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        let wrapped = err.at_boundary(Operation::Copy, Path::new("/a/b.txt"), Some(Path::new("/c")));
        match &wrapped {
            StorageError::OperationFailed { op, path, dest, .. } => {
                assert_eq!(*op, Operation::Copy);
                assert_eq!(path, Path::new("/a/b.txt"));
                assert_eq!(dest.as_deref(), Some(Path::new("/c")));
            }
            other => panic!("unexpected: {other:?}"),
        }
        let msg = wrapped.to_string();
        assert!(msg.starts_with("copy failed for '/a/b.txt' -> '/c': nope"), "{msg}");
    }

    #[test]
    fn boundary_keeps_cancellation_unwrapped() {
        let err = StorageError::Cancelled.at_boundary(Operation::Write, Path::new("/x"), None);
        assert!(err.is_cancelled());
        assert_eq!(err.code(), 130);
    }
}
