//! I/O helper utilities.
//!
//! Turns an io::Error into a short actionable hint that `StorageError::OperationFailed`
//! appends to its message, e.g. "; cross-filesystem, atomic rename not possible [os code: 18]".

use std::io;

/// Platform-aware hint for an I/O failure. Empty when nothing useful can be said.
pub(crate) fn hint_for(e: &io::Error) -> String {
    let mut msg = String::new();

    if let Some(code) = e.raw_os_error() {
        #[cfg(unix)]
        {
            let hint = match code {
                libc::EACCES | libc::EPERM => "permission denied; check ownership and write permissions",
                libc::EXDEV => "cross-filesystem; atomic rename not possible",
                libc::EBUSY => "resource busy; ensure no other process is writing",
                libc::ENOENT => "path not found; verify it exists",
                libc::EEXIST => "already exists; pick a unique name or remove the target",
                libc::ENOSPC => "insufficient space on device",
                libc::EROFS => "read-only filesystem; cannot write here",
                libc::ELOOP => "too many symbolic link levels; possible symlink cycle",
                libc::ENAMETOOLONG => "filename or path too long; shorten path segments",
                libc::ENOTEMPTY => "directory not empty",
                libc::EMFILE => "process file descriptor limit reached; close files or raise limits",
                libc::ENFILE => "system-wide file table overflow; reduce open files",
                _ => "",
            };
            if !hint.is_empty() {
                msg.push_str("; ");
                msg.push_str(hint);
            }
        }
        #[cfg(windows)]
        {
            let hint = match code {
                5 => "access denied; check permissions",            // ERROR_ACCESS_DENIED
                17 => "not same device; cross-filesystem move",     // ERROR_NOT_SAME_DEVICE
                32 => "sharing violation; file is in use",          // ERROR_SHARING_VIOLATION
                33 => "lock violation; another process holds a lock", // ERROR_LOCK_VIOLATION
                2 | 3 => "path not found; verify it exists",        // FILE/PATH NOT FOUND
                80 | 183 => "already exists; pick a unique name",   // ERROR_FILE_EXISTS / ALREADY_EXISTS
                112 => "insufficient disk space",                   // ERROR_DISK_FULL
                19 => "write protected / read-only media",          // ERROR_WRITE_PROTECT
                145 => "directory not empty",                       // ERROR_DIR_NOT_EMPTY
                206 => "filename or path too long",                 // ERROR_FILENAME_EXCED_RANGE
                _ => "",
            };
            if !hint.is_empty() {
                msg.push_str("; ");
                msg.push_str(hint);
            }
        }
        msg.push_str(&format!(" [os code: {}]", code));
    } else {
        let hint = match e.kind() {
            io::ErrorKind::PermissionDenied => "permission denied; check ownership and write permissions",
            io::ErrorKind::NotFound => "path not found; verify it exists",
            io::ErrorKind::AlreadyExists => "already exists; remove or choose a unique name",
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                "busy/timed out; retry after the current writer finishes"
            }
            _ => "",
        };
        if !hint.is_empty() {
            msg.push_str("; ");
            msg.push_str(hint);
        }
    }

    msg
}
