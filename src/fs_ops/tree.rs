//! Directory tree enumeration for recursive copy.
//! - Directories come first (parents before children) so every target folder,
//!   including empty ones, can be created before any file lands.
//! - Symlinks are not followed into directories; a link to a file is copied as the
//!   file it points at. Dangling links are skipped with a warning.
//! - Staging files of copies still in flight are left out.
//! - [`CopyFootprint`] records what a copy adds at its destination so a failed copy
//!   or move can take back exactly that and leave entries that were already there.

use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};
use walkdir::WalkDir;

use super::resolve::occupied;
use super::util::is_temp_name;
use crate::errors::{Result, StorageError};

/// A file to copy: absolute source path plus its path relative to the tree root.
#[derive(Debug, Clone)]
pub(crate) struct PlannedFile {
    pub source: PathBuf,
    pub relative: PathBuf,
}

#[derive(Debug, Default)]
pub(crate) struct TreePlan {
    /// Relative directory paths, parents before children.
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PlannedFile>,
    pub total_bytes: u64,
}

/// Walk `root` and collect what a recursive copy needs.
pub(crate) fn plan_tree(root: &Path) -> Result<TreePlan> {
    let mut plan = TreePlan::default();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| StorageError::InvalidPath {
                path: entry.path().to_string_lossy().into_owned(),
                reason: "entry escaped the directory being copied",
            })?
            .to_path_buf();
        let ft = entry.file_type();
        if !ft.is_dir() && is_temp_name(&entry.file_name().to_string_lossy()) {
            trace!(path = %entry.path().display(), "skipping in-flight staging file");
            continue;
        }
        if ft.is_dir() {
            plan.dirs.push(relative);
        } else if ft.is_file() {
            plan.files.push(PlannedFile { source: entry.into_path(), relative });
        } else {
            match fs::metadata(entry.path()) {
                Ok(m) if m.is_file() => {
                    plan.files.push(PlannedFile { source: entry.into_path(), relative });
                }
                Ok(_) => warn!(path = %entry.path().display(), "skipping symlink to a directory"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping unreadable or dangling entry"),
            }
        }
    }

    plan.total_bytes = plan
        .files
        .par_iter()
        .map(|f| fs::metadata(&f.source).map(|m| m.len()).unwrap_or(0))
        .sum();
    trace!(root = %root.display(), dirs = plan.dirs.len(), files = plan.files.len(), bytes = plan.total_bytes, "planned tree copy");
    Ok(plan)
}

/// Entries a tree copy into `root` is about to add.
#[derive(Debug, Clone)]
pub(crate) struct CopyFootprint {
    pub root: PathBuf,
    /// The copy creates `root` itself, so everything under it is new.
    pub created_root: bool,
    /// Absolute directory paths, parents before children.
    pub added_dirs: Vec<PathBuf>,
    pub added_files: Vec<PathBuf>,
}

impl CopyFootprint {
    /// Compare `plan` against what already exists under `root`. Files that will be
    /// overwritten in place are not additions.
    pub fn measure(root: &Path, plan: &TreePlan) -> Self {
        if !occupied(root) {
            return Self {
                root: root.to_path_buf(),
                created_root: true,
                added_dirs: Vec::new(),
                added_files: Vec::new(),
            };
        }
        let added_dirs = plan
            .dirs
            .iter()
            .map(|d| root.join(d))
            .filter(|p| !occupied(p))
            .collect();
        let added_files = plan
            .files
            .iter()
            .map(|f| root.join(&f.relative))
            .filter(|p| !occupied(p))
            .collect();
        Self {
            root: root.to_path_buf(),
            created_root: false,
            added_dirs,
            added_files,
        }
    }

    /// Remove what the copy added. Entries already gone are skipped; the first other
    /// failure stops the undo.
    pub fn undo(&self) -> Result<()> {
        if self.created_root {
            return ignore_missing(fs::remove_dir_all(&self.root));
        }
        for file in &self.added_files {
            ignore_missing(fs::remove_file(file))?;
        }
        for dir in self.added_dirs.iter().rev() {
            ignore_missing(fs::remove_dir(dir))?;
        }
        trace!(root = %self.root.display(), files = self.added_files.len(), dirs = self.added_dirs.len(), "removed entries added by a merged copy");
        Ok(())
    }
}

fn ignore_missing(res: io::Result<()>) -> Result<()> {
    match res {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Reject copying or moving a directory into its own subtree.
pub(crate) fn reject_nested(src: &Path, target: &Path) -> Result<()> {
    if target.starts_with(src) {
        return Err(StorageError::InvalidPath {
            path: target.to_string_lossy().into_owned(),
            reason: "destination lies inside the source directory",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn plan_lists_empty_dirs_and_sums_sizes() {
        let td = tempdir().unwrap();
        let root = td.path();
        fs::create_dir_all(root.join("a/empty")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a/one.txt"), b"123").unwrap();
        fs::write(root.join("b/two.txt"), b"4567").unwrap();
        fs::write(root.join("top.bin"), b"").unwrap();
        fs::write(root.join("b/.storage_ops.1.2.3.tmp"), b"partial").unwrap();

        let plan = plan_tree(root).unwrap();
        assert_eq!(
            plan.dirs,
            vec![PathBuf::from("a"), PathBuf::from("a/empty"), PathBuf::from("b")]
        );
        assert_eq!(plan.files.len(), 3);
        assert_eq!(plan.total_bytes, 7);
    }

    #[test]
    fn undo_of_merged_copy_keeps_existing_entries() {
        let td = tempdir().unwrap();
        let src = td.path().join("src");
        fs::create_dir_all(src.join("old")).unwrap();
        fs::create_dir_all(src.join("new/deep")).unwrap();
        fs::write(src.join("old/shared.txt"), b"s").unwrap();
        fs::write(src.join("new/deep/fresh.txt"), b"f").unwrap();

        let dest = td.path().join("dest");
        fs::create_dir_all(dest.join("old")).unwrap();
        fs::write(dest.join("old/shared.txt"), b"before").unwrap();
        fs::write(dest.join("keep.txt"), b"k").unwrap();

        let plan = plan_tree(&src).unwrap();
        let footprint = CopyFootprint::measure(&dest, &plan);
        assert!(!footprint.created_root);
        assert_eq!(footprint.added_files, vec![dest.join("new/deep/fresh.txt")]);
        assert_eq!(footprint.added_dirs, vec![dest.join("new"), dest.join("new/deep")]);

        fs::create_dir_all(dest.join("new/deep")).unwrap();
        fs::write(dest.join("new/deep/fresh.txt"), b"f").unwrap();
        footprint.undo().unwrap();

        assert!(!dest.join("new").exists());
        assert!(dest.join("old/shared.txt").exists());
        assert_eq!(fs::read(dest.join("keep.txt")).unwrap(), b"k");
    }

    #[test]
    fn undo_of_fresh_root_removes_it() {
        let td = tempdir().unwrap();
        let src = td.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();

        let dest = td.path().join("dest");
        let footprint = CopyFootprint::measure(&dest, &plan_tree(&src).unwrap());
        assert!(footprint.created_root);
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("a.txt"), b"a").unwrap();
        footprint.undo().unwrap();
        assert!(!dest.exists());
    }

    #[test]
    fn nested_target_is_rejected() {
        assert!(reject_nested(Path::new("/x/src"), Path::new("/x/src/inner/src")).is_err());
        assert!(reject_nested(Path::new("/x/src"), Path::new("/x/src2")).is_ok());
    }
}
