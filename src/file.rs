//! File handler: copy, move, rename, delete and write for a single file.
//!
//! Every operation exists as a blocking method and an `_async` twin taking a
//! [`CancellationToken`]. Blocking methods must not be called from inside an async
//! runtime context (they park the thread on the entity lock).

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{Operation, Result, StorageError};
use crate::fs_ops::io_copy::{self, CopyOptions};
use crate::fs_ops::probe::{ensure_available, ensure_available_async};
use crate::fs_ops::resolve::occupied;
use crate::fs_ops::util::is_cross_device;
use crate::fs_ops::{
    CrossVolumeMove, NameKind, blocking, check_cancel, entry_name, normalize_path,
    preserve_metadata, replace, replace_async, resolve_destination, sibling, stat_source,
    stat_source_async, validate_name,
};
use crate::metadata::MetadataSnapshot;
use crate::object::{
    ChangeKind, ChangeNotification, EntityKind, StorageContext, StorageObject, SubscriptionId,
};
use crate::progress::{Progress, report_single_tick};

pub struct FileHandler {
    obj: StorageObject,
}

impl FileHandler {
    /// Open `path` with default settings, creating an empty file if it is absent.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_context(path, StorageContext::default())
    }

    pub fn with_context(path: impl AsRef<Path>, ctx: StorageContext) -> Result<Self> {
        Ok(Self {
            obj: StorageObject::open(path.as_ref(), EntityKind::File, ctx)?,
        })
    }

    /// Wrap an existing file without creating it.
    pub(crate) fn attach(path: &Path, ctx: StorageContext) -> Result<Self> {
        Ok(Self {
            obj: StorageObject::attach(path, EntityKind::File, ctx)?,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.obj.path()
    }

    pub fn name(&self) -> String {
        self.obj.name()
    }

    pub fn parent(&self) -> Option<PathBuf> {
        self.obj.parent()
    }

    /// Snapshot of the file, served from cache while it is fresh.
    pub fn metadata(&self) -> Result<MetadataSnapshot> {
        self.obj.metadata()
    }

    pub fn is_disposed(&self) -> bool {
        self.obj.is_disposed()
    }

    /// Detach from the file. The file itself is left alone.
    pub fn dispose(&self) {
        self.obj.dispose()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeNotification) + Send + Sync + 'static,
    {
        self.obj.subscribe(Arc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.obj.unsubscribe(id)
    }

    // ---------------------------------------------------------------- copy

    /// Copy into `dest_dir`. Without `overwrite`, a taken name gets a " (n)" suffix.
    /// Returns the snapshot of the new copy.
    ///
    /// # Panics
    ///
    /// Panics when called on a thread that is driving an async runtime. Use the
    /// `_async` twin there, or run this through `tokio::task::spawn_blocking`.
    pub fn copy(
        &self,
        dest_dir: impl AsRef<Path>,
        overwrite: bool,
        progress: Option<Progress>,
    ) -> Result<MetadataSnapshot> {
        let dest_dir = normalize_path(dest_dir.as_ref())?;
        let guard = self.obj.lock_blocking();
        let src = self.obj.ensure_live()?;
        let (copied, _) = self
            .copy_locked(&src, &dest_dir, overwrite, progress)
            .map_err(|e| e.at_boundary(Operation::Copy, &src, Some(&dest_dir)))?;
        let note = self
            .obj
            .apply_change(ChangeKind::Modified, None, self.obj.snapshot_of(&src).ok());
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %copied.path.display(), bytes = copied.size, "Copied file");
        Ok(copied)
    }

    /// Returns the new copy and whether it replaced a file that was already there.
    fn copy_locked(
        &self,
        src: &Path,
        dest_dir: &Path,
        overwrite: bool,
        progress: Option<Progress>,
    ) -> Result<(MetadataSnapshot, bool)> {
        let cfg = self.obj.config();
        let src_meta = stat_source(src)?;
        let dest = resolve_destination(dest_dir, entry_name(src)?, overwrite)?;
        ensure_available(src, cfg)?;
        let replaced = occupied(&dest);
        if replaced {
            ensure_available(&dest, cfg)?;
        }
        let mut reader = File::open(src)?;
        let opts = CopyOptions::new(src_meta.len(), overwrite, cfg.durability);
        io_copy::copy_stream(&mut reader, src_meta.len(), &dest, &opts, progress)?;
        if cfg.preserve_metadata {
            preserve_metadata(&dest, &src_meta);
        }
        Ok((self.obj.snapshot_of(&dest)?, replaced))
    }

    pub async fn copy_async(
        &self,
        dest_dir: impl AsRef<Path>,
        overwrite: bool,
        progress: Option<Progress>,
        cancel: &CancellationToken,
    ) -> Result<MetadataSnapshot> {
        let dest_dir = normalize_path(dest_dir.as_ref())?;
        let guard = self.obj.lock().await;
        let src = self.obj.ensure_live()?;
        let (copied, _) = self
            .copy_locked_async(&src, &dest_dir, overwrite, progress, cancel)
            .await
            .map_err(|e| e.at_boundary(Operation::Copy, &src, Some(&dest_dir)))?;
        let refreshed = self.obj.snapshot_of_async(&src).await.ok();
        let note = self.obj.apply_change(ChangeKind::Modified, None, refreshed);
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %copied.path.display(), bytes = copied.size, "Copied file");
        Ok(copied)
    }

    async fn copy_locked_async(
        &self,
        src: &Path,
        dest_dir: &Path,
        overwrite: bool,
        progress: Option<Progress>,
        cancel: &CancellationToken,
    ) -> Result<(MetadataSnapshot, bool)> {
        check_cancel(cancel)?;
        let cfg = self.obj.config();
        let src_meta = stat_source_async(src).await?;
        let dest = {
            let (dir, name) = (dest_dir.to_path_buf(), entry_name(src)?.to_os_string());
            blocking(move || resolve_destination(&dir, &name, overwrite)).await?
        };
        ensure_available_async(src, cfg, cancel).await?;
        let replaced = tokio::fs::symlink_metadata(&dest).await.is_ok();
        if replaced {
            ensure_available_async(&dest, cfg, cancel).await?;
        }
        check_cancel(cancel)?;
        let mut reader = tokio::fs::File::open(src).await?;
        let opts = CopyOptions::new(src_meta.len(), overwrite, cfg.durability);
        io_copy::copy_stream_async(&mut reader, src_meta.len(), &dest, &opts, progress, cancel).await?;
        if cfg.preserve_metadata {
            let target = dest.clone();
            blocking(move || {
                preserve_metadata(&target, &src_meta);
                Ok(())
            })
            .await?;
        }
        Ok((self.obj.snapshot_of_async(&dest).await?, replaced))
    }

    // ---------------------------------------------------------------- move

    /// Move into `dest_dir`: an atomic rename on the same storage root (one `{1, 1}`
    /// progress tick), copy then delete across roots.
    ///
    /// # Panics
    ///
    /// Panics when called on a thread that is driving an async runtime. Use the
    /// `_async` twin there, or run this through `tokio::task::spawn_blocking`.
    pub fn move_to(
        &self,
        dest_dir: impl AsRef<Path>,
        overwrite: bool,
        progress: Option<Progress>,
    ) -> Result<MetadataSnapshot> {
        let dest_dir = normalize_path(dest_dir.as_ref())?;
        let src = self.obj.ensure_live()?;
        let boundary = |e: StorageError| e.at_boundary(Operation::Move, &src, Some(&dest_dir));

        if self.obj.same_root(&src, &dest_dir).map_err(boundary)? {
            let guard = self.obj.lock_blocking();
            let src = self.obj.ensure_live()?;
            match self.rename_into(&src, &dest_dir, overwrite) {
                Ok(snap) => {
                    report_single_tick(progress.as_ref());
                    let note = self.obj.apply_change(ChangeKind::Relocated, Some(snap.path.clone()), Some(snap.clone()));
                    drop(guard);
                    self.obj.notify(&note);
                    info!(src = %src.display(), dest = %snap.path.display(), "Renamed file atomically");
                    return Ok(snap);
                }
                Err(StorageError::Io(e)) if is_cross_device(&e) => {
                    debug!(src = %src.display(), error = %e, "rename crossed devices; falling back to copy and delete");
                }
                Err(e) => return Err(boundary(e)),
            }
        }
        self.move_across(&dest_dir, overwrite, progress)
    }

    fn rename_into(&self, src: &Path, dest_dir: &Path, overwrite: bool) -> Result<MetadataSnapshot> {
        let cfg = self.obj.config();
        stat_source(src)?;
        // Already in place; the resolver would otherwise see the file itself as a collision.
        if dest_dir.join(entry_name(src)?) == src {
            return self.obj.snapshot_of(src);
        }
        let dest = resolve_destination(dest_dir, entry_name(src)?, overwrite)?;
        ensure_available(src, cfg)?;
        if overwrite && occupied(&dest) {
            ensure_available(&dest, cfg)?;
        }
        replace(src, &dest)?;
        self.obj.snapshot_of(&dest)
    }

    fn move_across(&self, dest_dir: &Path, overwrite: bool, progress: Option<Progress>) -> Result<MetadataSnapshot> {
        let src = self.obj.ensure_live()?;
        let mut mover = CrossVolumeMove::new(&src);
        let (moved, _) = mover
            .run(
                || {
                    let _guard = self.obj.lock_blocking();
                    let src = self.obj.ensure_live()?;
                    self.copy_locked(&src, dest_dir, overwrite, progress)
                },
                || {
                    let _guard = self.obj.lock_blocking();
                    let src = self.obj.ensure_live()?;
                    self.remove_locked(&src)
                },
                |(copied, replaced): &(MetadataSnapshot, bool)| {
                    if *replaced {
                        debug!(dest = %copied.path.display(), "destination predates the move; keeping it");
                        return Ok(());
                    }
                    fs::remove_file(&copied.path).map_err(StorageError::from)
                },
            )
            .map_err(|e| e.at_boundary(Operation::Move, &src, Some(dest_dir)))?;

        let guard = self.obj.lock_blocking();
        let note = self.obj.apply_change(ChangeKind::Relocated, Some(moved.path.clone()), Some(moved.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %moved.path.display(), "Copied file across volumes and removed source");
        Ok(moved)
    }

    pub async fn move_async(
        &self,
        dest_dir: impl AsRef<Path>,
        overwrite: bool,
        progress: Option<Progress>,
        cancel: &CancellationToken,
    ) -> Result<MetadataSnapshot> {
        let dest_dir = normalize_path(dest_dir.as_ref())?;
        let src = self.obj.ensure_live()?;
        check_cancel(cancel)?;
        let boundary = |e: StorageError| e.at_boundary(Operation::Move, &src, Some(&dest_dir));

        if self.obj.same_root_async(&src, &dest_dir).await.map_err(boundary)? {
            let guard = self.obj.lock().await;
            let src = self.obj.ensure_live()?;
            match self.rename_into_async(&src, &dest_dir, overwrite, cancel).await {
                Ok(snap) => {
                    report_single_tick(progress.as_ref());
                    let note = self.obj.apply_change(ChangeKind::Relocated, Some(snap.path.clone()), Some(snap.clone()));
                    drop(guard);
                    self.obj.notify(&note);
                    info!(src = %src.display(), dest = %snap.path.display(), "Renamed file atomically");
                    return Ok(snap);
                }
                Err(StorageError::Io(e)) if is_cross_device(&e) => {
                    debug!(src = %src.display(), error = %e, "rename crossed devices; falling back to copy and delete");
                }
                Err(e) => return Err(boundary(e)),
            }
        }
        self.move_across_async(&dest_dir, overwrite, progress, cancel).await
    }

    async fn rename_into_async(
        &self,
        src: &Path,
        dest_dir: &Path,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<MetadataSnapshot> {
        let cfg = self.obj.config();
        stat_source_async(src).await?;
        if dest_dir.join(entry_name(src)?) == src {
            return self.obj.snapshot_of_async(src).await;
        }
        let dest = {
            let (dir, name) = (dest_dir.to_path_buf(), entry_name(src)?.to_os_string());
            blocking(move || resolve_destination(&dir, &name, overwrite)).await?
        };
        ensure_available_async(src, cfg, cancel).await?;
        if overwrite && tokio::fs::symlink_metadata(&dest).await.is_ok() {
            ensure_available_async(&dest, cfg, cancel).await?;
        }
        check_cancel(cancel)?;
        replace_async(src, &dest).await?;
        self.obj.snapshot_of_async(&dest).await
    }

    async fn move_across_async(
        &self,
        dest_dir: &Path,
        overwrite: bool,
        progress: Option<Progress>,
        cancel: &CancellationToken,
    ) -> Result<MetadataSnapshot> {
        let src = self.obj.ensure_live()?;
        let mut mover = CrossVolumeMove::new(&src);
        let (moved, _) = mover
            .run_async(
                move || async move {
                    let _guard = self.obj.lock().await;
                    let src = self.obj.ensure_live()?;
                    self.copy_locked_async(&src, dest_dir, overwrite, progress, cancel).await
                },
                move || async move {
                    let _guard = self.obj.lock().await;
                    let src = self.obj.ensure_live()?;
                    self.remove_locked_async(&src, cancel).await
                },
                |(copied, replaced): &(MetadataSnapshot, bool)| {
                    let (path, replaced) = (copied.path.clone(), *replaced);
                    async move {
                        if replaced {
                            debug!(dest = %path.display(), "destination predates the move; keeping it");
                            return Ok(());
                        }
                        tokio::fs::remove_file(&path).await.map_err(StorageError::from)
                    }
                },
            )
            .await
            .map_err(|e| e.at_boundary(Operation::Move, &src, Some(dest_dir)))?;

        let guard = self.obj.lock().await;
        let note = self.obj.apply_change(ChangeKind::Relocated, Some(moved.path.clone()), Some(moved.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %moved.path.display(), "Copied file across volumes and removed source");
        Ok(moved)
    }

    // ---------------------------------------------------------------- rename

    /// Rename within the current parent. An existing entry with that name is an error.
    ///
    /// # Panics
    ///
    /// Panics when called on a thread that is driving an async runtime. Use the
    /// `_async` twin there, or run this through `tokio::task::spawn_blocking`.
    pub fn rename(&self, new_name: &str) -> Result<MetadataSnapshot> {
        self.obj.ensure_live()?;
        validate_name(new_name, NameKind::File)?;
        let guard = self.obj.lock_blocking();
        let src = self.obj.ensure_live()?;
        let dest = sibling(&src, new_name);
        let snap = self
            .rename_locked(&src, &dest)
            .map_err(|e| e.at_boundary(Operation::Rename, &src, Some(&dest)))?;
        let note = self.obj.apply_change(ChangeKind::Relocated, Some(dest), Some(snap.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %snap.path.display(), "Renamed file");
        Ok(snap)
    }

    fn rename_locked(&self, src: &Path, dest: &Path) -> Result<MetadataSnapshot> {
        if dest == src {
            return self.obj.snapshot_of(src);
        }
        if occupied(dest) {
            return Err(StorageError::AlreadyExists(dest.to_path_buf()));
        }
        stat_source(src)?;
        ensure_available(src, self.obj.config())?;
        replace(src, dest)?;
        self.obj.snapshot_of(dest)
    }

    pub async fn rename_async(&self, new_name: &str, cancel: &CancellationToken) -> Result<MetadataSnapshot> {
        self.obj.ensure_live()?;
        validate_name(new_name, NameKind::File)?;
        let guard = self.obj.lock().await;
        let src = self.obj.ensure_live()?;
        let dest = sibling(&src, new_name);
        let snap = self
            .rename_locked_async(&src, &dest, cancel)
            .await
            .map_err(|e| e.at_boundary(Operation::Rename, &src, Some(&dest)))?;
        let note = self.obj.apply_change(ChangeKind::Relocated, Some(dest), Some(snap.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %snap.path.display(), "Renamed file");
        Ok(snap)
    }

    async fn rename_locked_async(&self, src: &Path, dest: &Path, cancel: &CancellationToken) -> Result<MetadataSnapshot> {
        check_cancel(cancel)?;
        if dest == src {
            return self.obj.snapshot_of_async(src).await;
        }
        if tokio::fs::symlink_metadata(dest).await.is_ok() {
            return Err(StorageError::AlreadyExists(dest.to_path_buf()));
        }
        stat_source_async(src).await?;
        ensure_available_async(src, self.obj.config(), cancel).await?;
        replace_async(src, dest).await?;
        self.obj.snapshot_of_async(dest).await
    }

    // ---------------------------------------------------------------- delete

    /// Delete the file and dispose the handler. A file that is already gone counts
    /// as deleted.
    ///
    /// # Panics
    ///
    /// Panics when called on a thread that is driving an async runtime. Use the
    /// `_async` twin there, or run this through `tokio::task::spawn_blocking`.
    pub fn delete(&self) -> Result<()> {
        let guard = self.obj.lock_blocking();
        let src = self.obj.ensure_live()?;
        self.remove_locked(&src)
            .map_err(|e| e.at_boundary(Operation::Delete, &src, None))?;
        let note = self.obj.apply_change(ChangeKind::Deleted, None, None);
        drop(guard);
        self.obj.notify(&note);
        info!(path = %src.display(), "Deleted file");
        Ok(())
    }

    fn remove_locked(&self, src: &Path) -> Result<()> {
        ensure_available(src, self.obj.config())?;
        match fs::remove_file(src) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %src.display(), "already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_async(&self, cancel: &CancellationToken) -> Result<()> {
        let guard = self.obj.lock().await;
        let src = self.obj.ensure_live()?;
        self.remove_locked_async(&src, cancel)
            .await
            .map_err(|e| e.at_boundary(Operation::Delete, &src, None))?;
        let note = self.obj.apply_change(ChangeKind::Deleted, None, None);
        drop(guard);
        self.obj.notify(&note);
        info!(path = %src.display(), "Deleted file");
        Ok(())
    }

    async fn remove_locked_async(&self, src: &Path, cancel: &CancellationToken) -> Result<()> {
        ensure_available_async(src, self.obj.config(), cancel).await?;
        check_cancel(cancel)?;
        match tokio::fs::remove_file(src).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %src.display(), "already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ---------------------------------------------------------------- write

    /// Replace the file's content with everything in `reader`, read from its start.
    /// Without `overwrite`, a file that already holds data is left untouched and
    /// `AlreadyExists` is returned.
    ///
    /// # Panics
    ///
    /// Panics when called on a thread that is driving an async runtime. Use the
    /// `_async` twin there, or run this through `tokio::task::spawn_blocking`.
    pub fn write<R: Read + Seek>(
        &self,
        mut reader: R,
        overwrite: bool,
        progress: Option<Progress>,
    ) -> Result<MetadataSnapshot> {
        let guard = self.obj.lock_blocking();
        let target = self.obj.ensure_live()?;
        let snap = self
            .write_locked(&target, &mut reader, overwrite, progress)
            .map_err(|e| e.at_boundary(Operation::Write, &target, None))?;
        let note = self.obj.apply_change(ChangeKind::Modified, None, Some(snap.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(path = %target.display(), bytes = snap.size, "Wrote file");
        Ok(snap)
    }

    fn write_locked<R: Read + Seek>(
        &self,
        target: &Path,
        reader: &mut R,
        overwrite: bool,
        progress: Option<Progress>,
    ) -> Result<MetadataSnapshot> {
        let cfg = self.obj.config();
        if !overwrite && has_content(fs::metadata(target)) {
            return Err(StorageError::AlreadyExists(target.to_path_buf()));
        }
        ensure_available(target, cfg)?;
        let total = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let opts = CopyOptions::new(total, true, cfg.durability);
        io_copy::copy_stream(reader, total, target, &opts, progress)?;
        self.obj.snapshot_of(target)
    }

    pub async fn write_async<R>(
        &self,
        mut reader: R,
        overwrite: bool,
        progress: Option<Progress>,
        cancel: &CancellationToken,
    ) -> Result<MetadataSnapshot>
    where
        R: AsyncRead + AsyncSeek + Unpin,
    {
        let guard = self.obj.lock().await;
        let target = self.obj.ensure_live()?;
        let snap = self
            .write_locked_async(&target, &mut reader, overwrite, progress, cancel)
            .await
            .map_err(|e| e.at_boundary(Operation::Write, &target, None))?;
        let note = self.obj.apply_change(ChangeKind::Modified, None, Some(snap.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(path = %target.display(), bytes = snap.size, "Wrote file");
        Ok(snap)
    }

    async fn write_locked_async<R>(
        &self,
        target: &Path,
        reader: &mut R,
        overwrite: bool,
        progress: Option<Progress>,
        cancel: &CancellationToken,
    ) -> Result<MetadataSnapshot>
    where
        R: AsyncRead + AsyncSeek + Unpin,
    {
        check_cancel(cancel)?;
        let cfg = self.obj.config();
        if !overwrite && has_content(tokio::fs::metadata(target).await) {
            return Err(StorageError::AlreadyExists(target.to_path_buf()));
        }
        ensure_available_async(target, cfg, cancel).await?;
        let total = reader.seek(SeekFrom::End(0)).await?;
        reader.seek(SeekFrom::Start(0)).await?;
        let opts = CopyOptions::new(total, true, cfg.durability);
        io_copy::copy_stream_async(reader, total, target, &opts, progress, cancel).await?;
        self.obj.snapshot_of_async(target).await
    }
}

fn has_content(meta: io::Result<fs::Metadata>) -> bool {
    meta.map(|m| m.len() > 0).unwrap_or(false)
}

impl std::fmt::Debug for FileHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandler")
            .field("path", &self.obj.path())
            .field("disposed", &self.obj.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[test]
    fn new_creates_empty_file() {
        let td = tempdir().unwrap();
        let p = td.path().join("nested").join("new.txt");
        let fh = FileHandler::new(&p).unwrap();
        assert!(p.is_file());
        assert_eq!(fh.metadata().unwrap().size, 0);
        assert_eq!(fh.name(), "new.txt");
    }

    #[test]
    fn write_fills_placeholder_then_refuses_without_overwrite() {
        let td = tempdir().unwrap();
        let fh = FileHandler::new(td.path().join("w.txt")).unwrap();
        fh.write(Cursor::new(b"hello".to_vec()), false, None).unwrap();
        assert_eq!(fs::read(fh.path()).unwrap(), b"hello");

        let err = fh.write(Cursor::new(b"bye".to_vec()), false, None).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(fs::read(fh.path()).unwrap(), b"hello");

        let snap = fh.write(Cursor::new(b"bye".to_vec()), true, None).unwrap();
        assert_eq!(snap.size, 3);
    }

    #[test]
    fn write_reads_from_the_start() {
        let td = tempdir().unwrap();
        let fh = FileHandler::new(td.path().join("s.txt")).unwrap();
        let mut cur = Cursor::new(b"abcdef".to_vec());
        cur.set_position(4);
        fh.write(cur, true, None).unwrap();
        assert_eq!(fs::read(fh.path()).unwrap(), b"abcdef");
    }

    #[test]
    fn rename_collision_is_reported() {
        let td = tempdir().unwrap();
        fs::write(td.path().join("taken.txt"), b"x").unwrap();
        let fh = FileHandler::new(td.path().join("mine.txt")).unwrap();
        let err = fh.rename("taken.txt").unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert!(fh.path().ends_with("mine.txt"));

        let err = fh.rename("../escape.txt").unwrap_err();
        assert!(matches!(err, StorageError::InvalidName { .. }));

        let snap = fh.rename("renamed.txt").unwrap();
        assert_eq!(fh.path(), td.path().join("renamed.txt"));
        assert_eq!(snap.path, fh.path());
        assert!(!td.path().join("mine.txt").exists());
    }

    #[test]
    fn notifications_follow_operations() {
        let td = tempdir().unwrap();
        let fh = FileHandler::new(td.path().join("n.txt")).unwrap();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let k = Arc::clone(&kinds);
        fh.subscribe(move |n| k.lock().unwrap().push(n.kind));

        fh.write(Cursor::new(b"data".to_vec()), true, None).unwrap();
        fh.rename("m.txt").unwrap();
        fh.delete().unwrap();
        assert_eq!(
            *kinds.lock().unwrap(),
            vec![ChangeKind::Modified, ChangeKind::Relocated, ChangeKind::Deleted]
        );
        assert!(fh.is_disposed());
    }

    #[test]
    fn copy_onto_missing_source_is_not_found() {
        let td = tempdir().unwrap();
        let fh = FileHandler::new(td.path().join("gone.txt")).unwrap();
        fs::remove_file(fh.path()).unwrap();
        let err = fh.copy(td.path().join("out"), false, None).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn async_copy_and_delete() {
        let td = tempdir().unwrap();
        let src = td.path().join("src.bin");
        fs::write(&src, vec![9u8; 5000]).unwrap();
        let fh = FileHandler::new(&src).unwrap();
        let token = CancellationToken::new();

        let copied = fh.copy_async(td.path().join("out"), false, None, &token).await.unwrap();
        assert_eq!(copied.size, 5000);
        assert_eq!(copied.path, td.path().join("out").join("src.bin"));

        fh.delete_async(&token).await.unwrap();
        assert!(!src.exists());
        let err = fh.delete_async(&token).await.unwrap_err();
        assert!(matches!(err, StorageError::Disposed(_)));
    }
}
