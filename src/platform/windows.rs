//! Windows implementations of platform helpers (best-effort, minimal ACL awareness).
//!
//! Notes:
//! - Windows lacks POSIX mode semantics; we do not attempt ACL management here.
//! - Volume identity comes from GetVolumePathNameW so mount points are honored.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::iter::once;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::os::windows::fs::MetadataExt;
use std::path::{Path, PathBuf};

use windows_sys::Win32::Storage::FileSystem::GetVolumePathNameW;

use crate::metadata::VolumeId;

use super::nearest_existing;

const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;

/// Open log file for appending (best-effort; no symlink defense available via std on Windows).
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Create a brand-new file; fails if the target already exists. No ACL changes.
pub fn write_new_file_0600(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
    f.write_all(contents)?;
    f.sync_all()
}

/// No-op on Windows; POSIX-style directory modes are not applicable.
pub fn set_dir_mode_0700(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Storage root identity: the volume mount path containing `path`.
pub fn volume_of(path: &Path) -> io::Result<VolumeId> {
    let existing = nearest_existing(path)?;
    let wide: Vec<u16> = existing.as_os_str().encode_wide().chain(once(0)).collect();
    let mut buf = vec![0u16; 1024];
    let ok = unsafe { GetVolumePathNameW(wide.as_ptr(), buf.as_mut_ptr(), buf.len() as u32) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
    let root = PathBuf::from(std::ffi::OsString::from_wide(&buf[..len]));
    Ok(VolumeId::Mount(root))
}

/// Raw attribute bits: FILE_ATTRIBUTE_*.
pub fn file_attributes(meta: &fs::Metadata) -> u32 {
    meta.file_attributes()
}

pub fn is_hidden(_path: &Path, meta: &fs::Metadata) -> bool {
    meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

/// Owner lookup needs security descriptor APIs; not reported.
pub fn owner_of(_meta: &fs::Metadata) -> Option<String> {
    None
}

/// Handle suitable for an advisory exclusive lock. Directories cannot be opened
/// through std without backup semantics, so the caller falls back to `read_dir`.
pub fn probe_handle(path: &Path) -> io::Result<Option<File>> {
    if path.is_dir() {
        return Ok(None);
    }
    OpenOptions::new().read(true).write(true).open(path).map(Some)
}
