//! Directory handler: recursive copy, move, rename and delete.
//!
//! Copies create the whole folder skeleton first so empty directories survive, then
//! hand each file to a [`FileHandler`]. The blocking copy walks files one by one;
//! the async copy fans out into a `JoinSet`, optionally bounded by
//! `EngineConfig::max_concurrent_copies`. A failed or cancelled copy removes what it
//! added at the destination; when it merged into an existing tree the entries that
//! were already there stay. A cross-root move whose source delete fails takes back
//! the same footprint.
//!
//! Blocking methods park the calling thread on the entity lock and panic when that
//! thread drives an async runtime; the `_async` twins are the runtime-side API.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{Operation, Result, StorageError};
use crate::file::FileHandler;
use crate::fs_ops::probe::{ensure_available, ensure_available_async};
use crate::fs_ops::resolve::occupied;
use crate::fs_ops::tree::{CopyFootprint, TreePlan, plan_tree, reject_nested};
use crate::fs_ops::util::is_cross_device;
use crate::fs_ops::{
    CrossVolumeMove, NameKind, blocking, check_cancel, entry_name, normalize_path, replace,
    replace_async, resolve_destination, sibling, validate_name,
};
use crate::metadata::MetadataSnapshot;
use crate::object::{
    ChangeKind, ChangeNotification, EntityKind, StorageContext, StorageObject, SubscriptionId,
};
use crate::progress::{AggregateProgress, Progress, report_single_tick};

pub struct DirectoryHandler {
    obj: StorageObject,
}

fn stat_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(StorageError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

async fn stat_dir_async(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(m) if m.is_dir() => Ok(()),
        Ok(_) => Err(StorageError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

fn target_dir_for(root: &Path, relative: &Path) -> PathBuf {
    match relative.parent() {
        Some(p) => root.join(p),
        None => root.to_path_buf(),
    }
}

impl DirectoryHandler {
    /// Open `path` with default settings, creating the directory chain if absent.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_context(path, StorageContext::default())
    }

    pub fn with_context(path: impl AsRef<Path>, ctx: StorageContext) -> Result<Self> {
        Ok(Self {
            obj: StorageObject::open(path.as_ref(), EntityKind::Directory, ctx)?,
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

    pub fn metadata(&self) -> Result<MetadataSnapshot> {
        self.obj.metadata()
    }

    pub fn is_disposed(&self) -> bool {
        self.obj.is_disposed()
    }

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

    /// Copy the tree to `dest_dir/<name>`, suffixing the root name on collision unless
    /// `overwrite` is set. Progress aggregates over all files.
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
        info!(src = %src.display(), dest = %copied.path.display(), "Copied directory");
        Ok(copied)
    }

    fn copy_locked(
        &self,
        src: &Path,
        dest_dir: &Path,
        overwrite: bool,
        progress: Option<Progress>,
    ) -> Result<(MetadataSnapshot, CopyFootprint)> {
        stat_dir(src)?;
        let root = resolve_destination(dest_dir, entry_name(src)?, overwrite)?;
        reject_nested(src, &root)?;
        ensure_available(src, self.obj.config())?;
        let plan = plan_tree(src)?;
        let footprint = CopyFootprint::measure(&root, &plan);

        if let Err(e) = self.populate(&root, &plan, overwrite, progress) {
            if let Err(undo) = footprint.undo() {
                warn!(root = %root.display(), error = %undo, "could not remove partially copied tree");
            } else {
                debug!(root = %root.display(), "removed partially copied tree");
            }
            return Err(e);
        }
        Ok((self.obj.snapshot_of(&root)?, footprint))
    }

    fn populate(&self, root: &Path, plan: &TreePlan, overwrite: bool, progress: Option<Progress>) -> Result<()> {
        fs::create_dir_all(root)?;
        for dir in &plan.dirs {
            fs::create_dir_all(root.join(dir))?;
        }
        let agg = AggregateProgress::new(plan.total_bytes, progress);
        for file in &plan.files {
            let fh = FileHandler::attach(&file.source, self.obj.context().clone())?;
            fh.copy(target_dir_for(root, &file.relative), overwrite, Some(agg.file_tap()))?;
        }
        agg.finish();
        Ok(())
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
        info!(src = %src.display(), dest = %copied.path.display(), "Copied directory");
        Ok(copied)
    }

    async fn copy_locked_async(
        &self,
        src: &Path,
        dest_dir: &Path,
        overwrite: bool,
        progress: Option<Progress>,
        cancel: &CancellationToken,
    ) -> Result<(MetadataSnapshot, CopyFootprint)> {
        check_cancel(cancel)?;
        stat_dir_async(src).await?;
        let root = {
            let (dir, name) = (dest_dir.to_path_buf(), entry_name(src)?.to_os_string());
            blocking(move || resolve_destination(&dir, &name, overwrite)).await?
        };
        reject_nested(src, &root)?;
        ensure_available_async(src, self.obj.config(), cancel).await?;
        let (plan, footprint) = {
            let (src, root) = (src.to_path_buf(), root.clone());
            blocking(move || {
                let plan = plan_tree(&src)?;
                let footprint = CopyFootprint::measure(&root, &plan);
                Ok((plan, footprint))
            })
            .await?
        };
        check_cancel(cancel)?;

        if let Err(e) = self.populate_async(&root, plan, overwrite, progress, cancel).await {
            let undo = footprint.clone();
            match blocking(move || undo.undo()).await {
                Ok(()) => debug!(root = %root.display(), cancelled = e.is_cancelled(), "removed partially copied tree"),
                Err(undo) => warn!(root = %root.display(), error = %undo, "could not remove partially copied tree"),
            }
            return Err(e);
        }
        Ok((self.obj.snapshot_of_async(&root).await?, footprint))
    }

    async fn populate_async(
        &self,
        root: &Path,
        plan: TreePlan,
        overwrite: bool,
        progress: Option<Progress>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tokio::fs::create_dir_all(root).await?;
        for dir in &plan.dirs {
            tokio::fs::create_dir_all(root.join(dir)).await?;
        }

        let agg = AggregateProgress::new(plan.total_bytes, progress);
        let limiter = self
            .obj
            .config()
            .max_concurrent_copies
            .map(|n| Arc::new(Semaphore::new(n)));
        // Child token: a failing file stops its siblings without cancelling the caller.
        let stop = cancel.child_token();
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut first_error: Option<StorageError> = None;

        for file in plan.files {
            if stop.is_cancelled() {
                break;
            }
            let permit = match &limiter {
                Some(sem) => tokio::select! {
                    _ = stop.cancelled() => break,
                    p = Arc::clone(sem).acquire_owned() => Some(p.map_err(io::Error::other)?),
                },
                None => None,
            };
            let target_dir = target_dir_for(root, &file.relative);
            let ctx = self.obj.context().clone();
            let tap = agg.file_tap();
            let token = stop.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let fh = FileHandler::attach(&file.source, ctx)?;
                fh.copy_async(&target_dir, overwrite, Some(tap), &token).await.map(|_| ())
            });
            while let Some(res) = tasks.try_join_next() {
                record_outcome(res, &mut first_error, &stop);
            }
        }
        while let Some(res) = tasks.join_next().await {
            record_outcome(res, &mut first_error, &stop);
        }

        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if stop.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        agg.finish();
        Ok(())
    }

    // ---------------------------------------------------------------- move

    /// Move the tree into `dest_dir`: atomic rename on the same root (one `{1, 1}`
    /// tick), recursive copy then delete across roots.
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
                    info!(src = %src.display(), dest = %snap.path.display(), "Renamed directory atomically");
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
        stat_dir(src)?;
        if dest_dir.join(entry_name(src)?) == src {
            return self.obj.snapshot_of(src);
        }
        let target = resolve_destination(dest_dir, entry_name(src)?, overwrite)?;
        reject_nested(src, &target)?;
        ensure_available(src, self.obj.config())?;
        replace(src, &target)?;
        self.obj.snapshot_of(&target)
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
                |(_, footprint): &(MetadataSnapshot, CopyFootprint)| footprint.undo(),
            )
            .map_err(|e| e.at_boundary(Operation::Move, &src, Some(dest_dir)))?;

        let guard = self.obj.lock_blocking();
        let note = self.obj.apply_change(ChangeKind::Relocated, Some(moved.path.clone()), Some(moved.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %moved.path.display(), "Copied directory contents and removed source");
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
                    info!(src = %src.display(), dest = %snap.path.display(), "Renamed directory atomically");
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
        stat_dir_async(src).await?;
        if dest_dir.join(entry_name(src)?) == src {
            return self.obj.snapshot_of_async(src).await;
        }
        let target = {
            let (dir, name) = (dest_dir.to_path_buf(), entry_name(src)?.to_os_string());
            blocking(move || resolve_destination(&dir, &name, overwrite)).await?
        };
        reject_nested(src, &target)?;
        ensure_available_async(src, self.obj.config(), cancel).await?;
        check_cancel(cancel)?;
        replace_async(src, &target).await?;
        self.obj.snapshot_of_async(&target).await
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
                |(_, footprint): &(MetadataSnapshot, CopyFootprint)| {
                    let footprint = footprint.clone();
                    blocking(move || footprint.undo())
                },
            )
            .await
            .map_err(|e| e.at_boundary(Operation::Move, &src, Some(dest_dir)))?;

        let guard = self.obj.lock().await;
        let note = self.obj.apply_change(ChangeKind::Relocated, Some(moved.path.clone()), Some(moved.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %moved.path.display(), "Copied directory contents and removed source");
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
        validate_name(new_name, NameKind::Directory)?;
        let guard = self.obj.lock_blocking();
        let src = self.obj.ensure_live()?;
        let dest = sibling(&src, new_name);
        let snap = self
            .rename_locked(&src, &dest)
            .map_err(|e| e.at_boundary(Operation::Rename, &src, Some(&dest)))?;
        let note = self.obj.apply_change(ChangeKind::Relocated, Some(dest), Some(snap.clone()));
        drop(guard);
        self.obj.notify(&note);
        info!(src = %src.display(), dest = %snap.path.display(), "Renamed directory");
        Ok(snap)
    }

    fn rename_locked(&self, src: &Path, dest: &Path) -> Result<MetadataSnapshot> {
        if dest == src {
            return self.obj.snapshot_of(src);
        }
        if occupied(dest) {
            return Err(StorageError::AlreadyExists(dest.to_path_buf()));
        }
        stat_dir(src)?;
        ensure_available(src, self.obj.config())?;
        replace(src, dest)?;
        self.obj.snapshot_of(dest)
    }

    pub async fn rename_async(&self, new_name: &str, cancel: &CancellationToken) -> Result<MetadataSnapshot> {
        self.obj.ensure_live()?;
        validate_name(new_name, NameKind::Directory)?;
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
        info!(src = %src.display(), dest = %snap.path.display(), "Renamed directory");
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
        stat_dir_async(src).await?;
        ensure_available_async(src, self.obj.config(), cancel).await?;
        replace_async(src, dest).await?;
        self.obj.snapshot_of_async(dest).await
    }

    // ---------------------------------------------------------------- delete

    /// Recursively delete the directory and dispose the handler. A directory that is
    /// already gone counts as deleted.
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
        info!(path = %src.display(), "Deleted directory");
        Ok(())
    }

    fn remove_locked(&self, src: &Path) -> Result<()> {
        ensure_available(src, self.obj.config())?;
        match fs::remove_dir_all(src) {
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
        info!(path = %src.display(), "Deleted directory");
        Ok(())
    }

    async fn remove_locked_async(&self, src: &Path, cancel: &CancellationToken) -> Result<()> {
        ensure_available_async(src, self.obj.config(), cancel).await?;
        check_cancel(cancel)?;
        match tokio::fs::remove_dir_all(src).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %src.display(), "already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn record_outcome(
    res: std::result::Result<Result<()>, JoinError>,
    first_error: &mut Option<StorageError>,
    stop: &CancellationToken,
) {
    let err = match res {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(join) => StorageError::Io(io::Error::other(join)),
    };
    // Siblings stopped by `stop` report Cancelled; keep the error that caused it.
    if first_error.is_none() && !err.is_cancelled() {
        *first_error = Some(err);
    }
    stop.cancel();
}

impl std::fmt::Debug for DirectoryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryHandler")
            .field("path", &self.obj.path())
            .field("disposed", &self.obj.is_disposed())
            .finish()
    }
}
