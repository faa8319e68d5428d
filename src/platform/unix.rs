//! Unix implementations of platform helpers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::metadata::VolumeId;

use super::nearest_existing;

/// Open log file for appending; set 0600 only when creating a new file.
/// If the file already exists, we preserve its existing permissions to avoid
/// clobbering administrator adjustments (e.g. group-readable for log shipping).
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600) // applies on create
        .open(path)
}

/// Create a brand-new file with mode 0600, refusing to follow a symlink or clobber.
pub fn write_new_file_0600(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)?;
    f.write_all(contents)?;
    f.sync_all()
}

/// POSIX chmod 0700 for directories.
pub fn set_dir_mode_0700(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

/// Storage root identity: the device id of the path (or its nearest existing ancestor).
pub fn volume_of(path: &Path) -> io::Result<VolumeId> {
    let existing = nearest_existing(path)?;
    Ok(VolumeId::Device(fs::metadata(existing)?.dev()))
}

/// Raw attribute bits: the POSIX mode.
pub fn file_attributes(meta: &fs::Metadata) -> u32 {
    meta.mode()
}

/// Dotfiles are hidden by convention.
pub fn is_hidden(path: &Path, _meta: &fs::Metadata) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Owner as "uid:gid".
pub fn owner_of(meta: &fs::Metadata) -> Option<String> {
    Some(format!("{}:{}", meta.uid(), meta.gid()))
}

/// Handle suitable for an advisory exclusive lock. flock works on directory
/// descriptors too, so both kinds are returned.
pub fn probe_handle(path: &Path) -> io::Result<Option<File>> {
    File::open(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn volume_of_missing_child_uses_parent_device() {
        let td = tempdir().unwrap();
        let missing = td.path().join("a").join("b").join("c.txt");
        assert_eq!(volume_of(&missing).unwrap(), volume_of(td.path()).unwrap());
    }

    #[test]
    fn new_file_is_private_and_never_clobbers() {
        let td = tempdir().unwrap();
        let p = td.path().join("secret.xml");
        write_new_file_0600(&p, b"<config/>").unwrap();
        let mode = fs::metadata(&p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let err = write_new_file_0600(&p, b"again").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn dotfiles_are_hidden() {
        let td = tempdir().unwrap();
        let p = td.path().join(".env");
        fs::write(&p, b"x").unwrap();
        let meta = fs::metadata(&p).unwrap();
        assert!(is_hidden(&p, &meta));
    }
}
