//! State shared by file and directory handlers.
//!
//! A [`StorageObject`] owns:
//! - the tracked path and cached snapshot, in an `RwLock<EntryState>` so readers never
//!   wait behind a transfer;
//! - the operation lock, an async mutex that blocking callers take with
//!   `blocking_lock`, which keeps the two call families mutually exclusive;
//! - external change subscribers.
//!
//! After a mutation commits, the handler calls [`StorageObject::apply_change`] while it
//! still holds the operation lock, releases the lock, then calls
//! [`StorageObject::notify`], so subscriber callbacks may start new operations.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::errors::{Operation, Result, StorageError};
use crate::fs_ops::{blocking, normalize_path};
use crate::metadata::{
    CachedMetadata, ContentClassifier, MetadataProvider, MetadataSnapshot, NativeMetadata,
    NoClassifier, best_match,
};

/// Collaborators and settings shared by every handler built from it.
#[derive(Clone)]
pub struct StorageContext {
    pub config: Arc<EngineConfig>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub classifier: Arc<dyn ContentClassifier>,
}

impl Default for StorageContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl StorageContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            metadata: Arc::new(NativeMetadata),
            classifier: Arc::new(NoClassifier),
        }
    }

    pub fn with_metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = provider;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }
}

impl std::fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Relocated,
    Deleted,
}

/// Raised after every successful mutation.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    /// Path of the entity after the change.
    pub path: PathBuf,
    pub snapshot: Option<MetadataSnapshot>,
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type ChangeCallback = Arc<dyn Fn(&ChangeNotification) + Send + Sync>;

#[derive(Debug)]
struct EntryState {
    path: PathBuf,
    cached: Option<CachedMetadata>,
    disposed: bool,
}

pub(crate) struct StorageObject {
    kind: EntityKind,
    ctx: StorageContext,
    state: RwLock<EntryState>,
    op_lock: Mutex<()>,
    subscribers: RwLock<Vec<(SubscriptionId, ChangeCallback)>>,
    next_subscription: AtomicU64,
}

impl StorageObject {
    /// Validate `raw` and create the entity if it does not exist.
    pub(crate) fn open(raw: &Path, kind: EntityKind, ctx: StorageContext) -> Result<Self> {
        let path = entity_path(raw)?;
        bootstrap(&path, kind).map_err(|e| e.at_boundary(Operation::Create, &path, None))?;
        Ok(Self::from_parts(path, kind, ctx))
    }

    /// Wrap an entity that must already exist; never creates anything.
    pub(crate) fn attach(raw: &Path, kind: EntityKind, ctx: StorageContext) -> Result<Self> {
        let path = entity_path(raw)?;
        match fs::metadata(&path) {
            Ok(m) if kind == EntityKind::Directory && !m.is_dir() => {
                return Err(StorageError::NotADirectory(path));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StorageError::NotFound(path)),
            Err(e) => return Err(StorageError::operation_failed(Operation::Create, &path, None, e)),
        }
        Ok(Self::from_parts(path, kind, ctx))
    }

    fn from_parts(path: PathBuf, kind: EntityKind, ctx: StorageContext) -> Self {
        Self {
            kind,
            ctx,
            state: RwLock::new(EntryState {
                path,
                cached: None,
                disposed: false,
            }),
            op_lock: Mutex::new(()),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, EntryState> {
        // A panicking subscriber cannot leave EntryState half-written; recover the guard.
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EntryState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn context(&self) -> &StorageContext {
        &self.ctx
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub(crate) fn path(&self) -> PathBuf {
        self.read_state().path.clone()
    }

    pub(crate) fn name(&self) -> String {
        let st = self.read_state();
        st.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub(crate) fn parent(&self) -> Option<PathBuf> {
        self.read_state().path.parent().map(Path::to_path_buf)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.read_state().disposed
    }

    /// Current path, or `Disposed`.
    pub(crate) fn ensure_live(&self) -> Result<PathBuf> {
        let st = self.read_state();
        if st.disposed {
            Err(StorageError::Disposed(st.path.clone()))
        } else {
            Ok(st.path.clone())
        }
    }

    pub(crate) fn dispose(&self) {
        let mut st = self.write_state();
        if !st.disposed {
            st.disposed = true;
            st.cached = None;
            trace!(path = %st.path.display(), "disposed");
        }
        drop(st);
        self.subscribers.write().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Park the thread until the entity lock is free. Panics inside an async
    /// execution context; `spawn_blocking` threads are fine.
    pub(crate) fn lock_blocking(&self) -> MutexGuard<'_, ()> {
        self.op_lock.blocking_lock()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    /// Fresh snapshot of `path` using this object's collaborators. Not cached.
    pub(crate) fn snapshot_of(&self, path: &Path) -> Result<MetadataSnapshot> {
        let mut snap = match self.ctx.metadata.snapshot(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if snap.attributes.is_file {
            snap.content = best_match(self.ctx.classifier.classify(path));
        }
        Ok(snap)
    }

    /// [`snapshot_of`](Self::snapshot_of) on the blocking pool.
    pub(crate) async fn snapshot_of_async(&self, path: &Path) -> Result<MetadataSnapshot> {
        let provider = Arc::clone(&self.ctx.metadata);
        let classifier = Arc::clone(&self.ctx.classifier);
        let path = path.to_path_buf();
        blocking(move || {
            let mut snap = match provider.snapshot(&path) {
                Ok(s) => s,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StorageError::NotFound(path)),
                Err(e) => return Err(e.into()),
            };
            if snap.attributes.is_file {
                snap.content = best_match(classifier.classify(&path));
            }
            Ok(snap)
        })
        .await
    }

    /// Cached snapshot if still fresh, else a new one.
    pub(crate) fn metadata(&self) -> Result<MetadataSnapshot> {
        let path = {
            let st = self.read_state();
            if st.disposed {
                return Err(StorageError::Disposed(st.path.clone()));
            }
            if let Some(c) = &st.cached {
                if c.is_fresh(self.ctx.config.metadata_ttl) {
                    return Ok(c.snapshot().clone());
                }
            }
            st.path.clone()
        };
        let snap = self
            .snapshot_of(&path)
            .map_err(|e| e.at_boundary(Operation::Metadata, &path, None))?;
        let mut st = self.write_state();
        // A concurrent rename may have moved us; only cache what matches.
        if !st.disposed && st.path == path {
            st.cached = Some(CachedMetadata::new(snap.clone()));
        }
        Ok(snap)
    }

    /// Whether `dest` lives on the same storage root as this entity.
    pub(crate) fn same_root(&self, src: &Path, dest: &Path) -> Result<bool> {
        let a = self.ctx.metadata.volume_of(src)?;
        let b = self.ctx.metadata.volume_of(dest)?;
        Ok(a == b)
    }

    pub(crate) async fn same_root_async(&self, src: &Path, dest: &Path) -> Result<bool> {
        let provider = Arc::clone(&self.ctx.metadata);
        let (src, dest) = (src.to_path_buf(), dest.to_path_buf());
        blocking(move || Ok(provider.volume_of(&src)? == provider.volume_of(&dest)?)).await
    }

    /// Post-operation update of path and snapshot. Deleted disposes the object.
    pub(crate) fn apply_change(
        &self,
        kind: ChangeKind,
        new_path: Option<PathBuf>,
        snapshot: Option<MetadataSnapshot>,
    ) -> ChangeNotification {
        let mut st = self.write_state();
        match kind {
            ChangeKind::Deleted => {
                st.disposed = true;
                st.cached = None;
            }
            ChangeKind::Modified | ChangeKind::Relocated => {
                if let Some(p) = new_path {
                    st.path = p;
                }
                match &snapshot {
                    // Only cache snapshots describing this entity (copy reports the source).
                    Some(s) if s.path == st.path => st.cached = Some(CachedMetadata::new(s.clone())),
                    _ => st.cached = None,
                }
            }
        }
        debug!(kind = ?kind, kind_of_entity = ?self.kind, path = %st.path.display(), "entity updated");
        ChangeNotification {
            kind,
            path: st.path.clone(),
            snapshot,
        }
    }

    /// Deliver `note` to subscribers. Call without holding the operation lock.
    pub(crate) fn notify(&self, note: &ChangeNotification) {
        let subs: Vec<ChangeCallback> = self
            .subscribers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in subs {
            cb(note);
        }
        if note.kind == ChangeKind::Deleted {
            self.subscribers.write().unwrap_or_else(|p| p.into_inner()).clear();
        }
    }

    pub(crate) fn subscribe(&self, cb: ChangeCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, cb));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|p| p.into_inner());
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }
}

/// Normalized path of an entity; a bare root cannot be one.
fn entity_path(raw: &Path) -> Result<PathBuf> {
    let path = normalize_path(raw)?;
    if path.file_name().is_none() {
        return Err(StorageError::InvalidPath {
            path: raw.to_string_lossy().into_owned(),
            reason: "path has no final component",
        });
    }
    Ok(path)
}

/// Create the entity (and its parent chain) if absent.
fn bootstrap(path: &Path, kind: EntityKind) -> Result<()> {
    match (kind, fs::metadata(path)) {
        (EntityKind::File, Ok(m)) if m.is_dir() => Err(StorageError::InvalidPath {
            path: path.to_string_lossy().into_owned(),
            reason: "path names a directory, not a file",
        }),
        (EntityKind::Directory, Ok(m)) if !m.is_dir() => Err(StorageError::NotADirectory(path.to_path_buf())),
        (_, Ok(_)) => Ok(()),
        (EntityKind::File, Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            // create(true) without truncate: a file appearing concurrently is kept.
            OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
            trace!(path = %path.display(), "created empty file");
            Ok(())
        }
        (EntityKind::Directory, Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path)?;
            trace!(path = %path.display(), "created directory chain");
            Ok(())
        }
        (_, Err(e)) => Err(e.into()),
    }
}
