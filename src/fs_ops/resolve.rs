//! Destination-name resolution.
//!
//! Policy:
//! - overwrite: return `dst_dir/name` as-is; the caller replaces whatever is there.
//! - no overwrite: return `dst_dir/name` if free, else append " (n)" before the
//!   extension, n = 1, 2, ... until a free name is found.
//!
//! Notes:
//! - The target directory chain is created when missing; a regular file in its place
//!   is an error.
//! - This only decides the path based on current filesystem state. Callers still hold
//!   the entity lock to avoid racing other mutators of the same source.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::errors::{Result, StorageError};

const MAX_TRIES: u64 = 10_000;

/// True when something (including a dangling symlink) occupies `p`.
pub(crate) fn occupied(p: &Path) -> bool {
    fs::symlink_metadata(p).is_ok()
}

/// Make sure `dir` exists as a directory, creating the chain if needed.
fn ensure_target_dir(dir: &Path) -> Result<()> {
    match fs::metadata(dir) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(StorageError::NotADirectory(dir.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir)?;
            trace!(dir = %dir.display(), "created destination directory chain");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Compute the destination path for `name` inside `dst_dir`.
pub fn resolve_destination(dst_dir: &Path, name: &OsStr, overwrite: bool) -> Result<PathBuf> {
    ensure_target_dir(dst_dir)?;

    let base = Path::new(name);
    let stem_os: OsString = base
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from(name));
    let ext_os: Option<OsString> = base.extension().map(|e| e.to_os_string());

    // Path-length awareness: first, ensure the base name (without suffix) fits.
    let adjusted = build_name_with_suffix(&stem_os, ext_os.as_deref(), "");
    let candidate = dst_dir.join(&adjusted);
    if overwrite || !occupied(&candidate) {
        return Ok(candidate);
    }

    unique_with_numeric_suffix(dst_dir, &stem_os, ext_os.as_deref())
}

/// Return a unique path by appending " (n)" before extension until no collision.
///
/// Examples:
/// - "movie.mkv" -> "movie (1).mkv", "movie (2).mkv", ...
/// - ".env" -> ".env (1)"
/// - "archive.tar.gz" -> "archive.tar (1).gz"
fn unique_with_numeric_suffix(dst_dir: &Path, stem: &OsStr, ext: Option<&OsStr>) -> Result<PathBuf> {
    let mut collisions = 0u32;
    for n in 1..=MAX_TRIES {
        let suffix = format!(" ({n})");
        let candidate = dst_dir.join(build_name_with_suffix(stem, ext, &suffix));
        if !occupied(&candidate) {
            return Ok(candidate);
        }
        collisions = collisions.saturating_add(1);
        if collisions == 3 {
            trace!(stem = ?stem, dir = %dst_dir.display(), "duplicate: multiple collisions, still searching for a free suffix");
        }
    }
    Err(StorageError::AlreadyExists(
        dst_dir.join(build_name_with_suffix(stem, ext, "")),
    ))
}

// Conservative filename limits (bytes/characters, platform-specific and approximate).
#[cfg(windows)]
const MAX_FILENAME_LEN: usize = 240; // leave headroom for legacy MAX_PATH
#[cfg(not(windows))]
const MAX_FILENAME_LEN: usize = 255; // typical POSIX/EXT limits

/// Measure the approximate length of an OsStr for filename budgeting.
#[cfg(unix)]
fn name_len_units(s: &OsStr) -> usize {
    use std::os::unix::ffi::OsStrExt;
    s.as_bytes().len()
}

#[cfg(not(unix))]
fn name_len_units(s: &OsStr) -> usize {
    s.to_string_lossy().len()
}

/// Truncate the stem if needed to ensure `stem + suffix + ["." + ext]` fits within MAX_FILENAME_LEN.
fn build_name_with_suffix(stem: &OsStr, ext: Option<&OsStr>, suffix: &str) -> OsString {
    let mut overhead = name_len_units(OsStr::new(suffix));
    let mut ext_part = OsString::new();
    if let Some(e) = ext {
        overhead = overhead.saturating_add(1 + name_len_units(e)); // dot + ext
        ext_part.push(".");
        ext_part.push(e);
    }

    let mut stem_os = stem.to_os_string();
    if name_len_units(&stem_os) + overhead > MAX_FILENAME_LEN {
        let budget = MAX_FILENAME_LEN.saturating_sub(overhead).max(1);
        // Char-boundary-aware truncation; non-UTF8 stems fall back to lossy text.
        let text = stem.to_string_lossy();
        let mut acc = String::new();
        for ch in text.chars() {
            acc.push(ch);
            if name_len_units(OsStr::new(&acc)) > budget {
                acc.pop();
                break;
            }
        }
        if acc.is_empty() {
            acc.push('f');
        }
        stem_os = OsString::from(acc);
    }

    let mut new_name = OsString::new();
    new_name.push(&stem_os);
    new_name.push(suffix);
    new_name.push(&ext_part);
    new_name
}
