//! Metadata snapshots and the collaborator traits that produce them.
//!
//! - [`MetadataProvider`] is the native-metadata collaborator. [`NativeMetadata`] is the
//!   default, backed by `std::fs` plus the per-OS bits in `platform`.
//! - [`ContentClassifier`] is the content-identification collaborator. It only feeds
//!   the descriptive [`MetadataSnapshot::content`] field.
//! - [`CachedMetadata`] pairs a snapshot with its capture time for TTL checks.

use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::platform;

/// Identifier of the storage root a path lives on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VolumeId {
    /// Unix device number (`st_dev`).
    Device(u64),
    /// Volume mount path (Windows), or any caller-defined root label.
    Mount(PathBuf),
}

/// Normalized attribute view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub is_file: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub readonly: bool,
    pub hidden: bool,
    /// Platform bits: POSIX mode on Unix, FILE_ATTRIBUTE_* on Windows.
    pub raw: u32,
}

/// One candidate answer from a content classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentMatch {
    pub candidate_type: String,
    pub mime_type: String,
    pub extension: String,
    /// 0.0 ..= 1.0
    pub confidence: f32,
}

/// Point-in-time description of a filesystem entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataSnapshot {
    pub path: PathBuf,
    pub attributes: FileAttributes,
    /// Byte length for files; 0 for directories.
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    pub owner: Option<String>,
    pub link_target: Option<PathBuf>,
    /// Best classifier match, if a classifier is configured and recognized the content.
    pub content: Option<ContentMatch>,
}

impl MetadataSnapshot {
    pub fn is_dir(&self) -> bool {
        self.attributes.is_dir
    }
}

/// Native metadata collaborator.
pub trait MetadataProvider: Send + Sync {
    /// Read a fresh snapshot of `path`.
    fn snapshot(&self, path: &Path) -> io::Result<MetadataSnapshot>;

    /// Storage root `path` lives on. Must accept paths that do not exist yet.
    fn volume_of(&self, path: &Path) -> io::Result<VolumeId>;
}

/// Content-identification collaborator.
pub trait ContentClassifier: Send + Sync {
    /// Candidate types for the file at `path`, in any order.
    fn classify(&self, path: &Path) -> Vec<ContentMatch>;
}

/// Classifier that never recognizes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClassifier;

impl ContentClassifier for NoClassifier {
    fn classify(&self, _path: &Path) -> Vec<ContentMatch> {
        Vec::new()
    }
}

/// Highest-confidence match, if any.
pub fn best_match(mut matches: Vec<ContentMatch>) -> Option<ContentMatch> {
    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    matches.into_iter().next()
}

/// `std::fs` backed provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeMetadata;

fn to_utc(t: io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    t.ok().map(DateTime::<Utc>::from)
}

impl MetadataProvider for NativeMetadata {
    fn snapshot(&self, path: &Path) -> io::Result<MetadataSnapshot> {
        let lmeta = fs::symlink_metadata(path)?;
        let is_symlink = lmeta.file_type().is_symlink();
        let link_target = if is_symlink { fs::read_link(path).ok() } else { None };
        // Report what the link points at; fall back to the link itself when dangling.
        let meta = if is_symlink {
            fs::metadata(path).unwrap_or(lmeta)
        } else {
            lmeta
        };

        Ok(MetadataSnapshot {
            path: path.to_path_buf(),
            attributes: FileAttributes {
                is_file: meta.is_file(),
                is_dir: meta.is_dir(),
                is_symlink,
                readonly: meta.permissions().readonly(),
                hidden: platform::is_hidden(path, &meta),
                raw: platform::file_attributes(&meta),
            },
            size: if meta.is_file() { meta.len() } else { 0 },
            created: to_utc(meta.created()),
            modified: to_utc(meta.modified()),
            accessed: to_utc(meta.accessed()),
            owner: platform::owner_of(&meta),
            link_target,
            content: None,
        })
    }

    fn volume_of(&self, path: &Path) -> io::Result<VolumeId> {
        platform::volume_of(path)
    }
}

/// Snapshot plus the instant it was captured.
#[derive(Debug, Clone)]
pub struct CachedMetadata {
    snapshot: MetadataSnapshot,
    captured_at: Instant,
}

impl CachedMetadata {
    pub fn new(snapshot: MetadataSnapshot) -> Self {
        Self {
            snapshot,
            captured_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> &MetadataSnapshot {
        &self.snapshot
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.captured_at.elapsed() < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn native_snapshot_of_file_and_dir() {
        let td = tempdir().unwrap();
        let f = td.path().join("a.txt");
        fs::write(&f, b"hello").unwrap();

        let snap = NativeMetadata.snapshot(&f).unwrap();
        assert!(snap.attributes.is_file);
        assert_eq!(snap.size, 5);
        assert!(snap.modified.is_some());

        let dsnap = NativeMetadata.snapshot(td.path()).unwrap();
        assert!(dsnap.is_dir());
        assert_eq!(dsnap.size, 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_reports_target() {
        let td = tempdir().unwrap();
        let real = td.path().join("real.bin");
        fs::write(&real, b"12").unwrap();
        let link = td.path().join("link.bin");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let snap = NativeMetadata.snapshot(&link).unwrap();
        assert!(snap.attributes.is_symlink);
        assert_eq!(snap.link_target.as_deref(), Some(real.as_path()));
        assert_eq!(snap.size, 2);
    }

    #[test]
    fn best_match_prefers_confidence() {
        let m = |t: &str, c: f32| ContentMatch {
            candidate_type: t.into(),
            mime_type: format!("application/{t}"),
            extension: t.into(),
            confidence: c,
        };
        let best = best_match(vec![m("zip", 0.4), m("docx", 0.9), m("jar", 0.5)]).unwrap();
        assert_eq!(best.candidate_type, "docx");
        assert!(best_match(Vec::new()).is_none());
    }

    #[test]
    fn cache_expires() {
        let td = tempdir().unwrap();
        let snap = NativeMetadata.snapshot(td.path()).unwrap();
        let cached = CachedMetadata::new(snap);
        assert!(cached.is_fresh(Duration::from_secs(60)));
        assert!(!cached.is_fresh(Duration::ZERO));
    }
}
