//! Platform-specific helpers.
//! This module hides OS differences (Unix/Windows) behind a uniform API so
//! the rest of the codebase can remain platform-agnostic. All `unsafe`/FFI
//! lives here; the copy/move logic never touches it.

#[cfg(unix)]
mod unix;
#[cfg(not(unix))]
mod windows;

#[cfg(unix)]
pub use unix::{
    file_attributes, is_hidden, open_log_file_secure_append, owner_of, probe_handle,
    set_dir_mode_0700, volume_of, write_new_file_0600,
};

#[cfg(not(unix))]
pub use windows::{
    file_attributes, is_hidden, open_log_file_secure_append, owner_of, probe_handle,
    set_dir_mode_0700, volume_of, write_new_file_0600,
};

use std::io;
use std::path::Path;

/// Nearest existing ancestor of `path` (itself included). Used when asking about
/// a destination that has not been created yet.
pub(crate) fn nearest_existing(path: &Path) -> io::Result<&Path> {
    let mut cur = Some(path);
    while let Some(p) = cur {
        if p.exists() {
            return Ok(p);
        }
        cur = p.parent();
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no existing ancestor for {}", path.display()),
    ))
}
