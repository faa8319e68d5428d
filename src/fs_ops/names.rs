//! Path and name validation.
//!
//! All checks here run before any I/O:
//! - paths must be non-empty, not whitespace-only and NUL-free, and are made absolute
//!   with `.`/`..` folded lexically (symlinks are not resolved);
//! - entry names (for rename) must be a single path component.

use std::path::{Component, Path, PathBuf};

use crate::errors::{Result, StorageError};

/// Which rule set a name is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    File,
    Directory,
}

#[cfg(windows)]
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

fn invalid_path(path: &Path, reason: &'static str) -> StorageError {
    StorageError::InvalidPath {
        path: path.to_string_lossy().into_owned(),
        reason,
    }
}

/// Validate `raw` and turn it into an absolute, lexically normalized path.
pub fn normalize_path(raw: &Path) -> Result<PathBuf> {
    let text = raw.to_string_lossy();
    if text.trim().is_empty() {
        return Err(invalid_path(raw, "path is empty"));
    }
    if text.contains('\0') {
        return Err(invalid_path(raw, "path contains a NUL byte"));
    }
    #[cfg(windows)]
    {
        for comp in raw.components() {
            if let Component::Normal(seg) = comp {
                let seg = seg.to_string_lossy();
                if seg.chars().any(|c| RESERVED_CHARS.contains(&c) || (c as u32) < 32) {
                    return Err(invalid_path(raw, "path contains characters not allowed on this platform"));
                }
            }
        }
    }

    let absolute = std::path::absolute(raw)?;
    let mut out = PathBuf::new();
    for comp in absolute.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => out.push(comp.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // Never climb above the root.
                if out.parent().is_some() {
                    out.pop();
                }
            }
            Component::Normal(seg) => out.push(seg),
        }
    }
    Ok(dunce::simplified(&out).to_path_buf())
}

/// Validate a bare entry name used for rename.
pub fn validate_name(name: &str, kind: NameKind) -> Result<()> {
    let fail = |reason: &'static str| {
        Err(StorageError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.trim().is_empty() {
        return fail("name is empty");
    }
    if name == "." || name == ".." {
        return fail("name is a relative path marker");
    }
    if name.contains('\0') {
        return fail("name contains a NUL byte");
    }
    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        return fail(match kind {
            NameKind::File => "file name contains a path separator",
            NameKind::Directory => "directory name contains a path separator",
        });
    }
    #[cfg(windows)]
    {
        if name.chars().any(|c| RESERVED_CHARS.contains(&c) || (c as u32) < 32) {
            return fail("name contains characters not allowed on this platform");
        }
        // Explorer silently strips these, which makes the result unreachable by name.
        if kind == NameKind::File && (name.ends_with('.') || name.ends_with(' ')) {
            return fail("file name ends with a dot or space");
        }
    }
    Ok(())
}
