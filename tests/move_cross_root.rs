//! Moves between storage roots. A provider that reports two roots inside one temp
//! directory forces the copy-then-delete path without needing two real volumes.

use fs2::FileExt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

use storage_ops::{
    CancellationToken, CrossVolumeMove, DirectoryHandler, EngineConfig, FileHandler,
    MetadataProvider, MetadataSnapshot, MoveState, NativeMetadata, Progress, ProbeTimeoutPolicy,
    ProgressReport, StorageContext, StorageError, VolumeId, progress_fn,
};

struct SplitRoots {
    second: PathBuf,
}

impl MetadataProvider for SplitRoots {
    fn snapshot(&self, path: &Path) -> io::Result<MetadataSnapshot> {
        NativeMetadata.snapshot(path)
    }

    fn volume_of(&self, path: &Path) -> io::Result<VolumeId> {
        if path.starts_with(&self.second) {
            Ok(VolumeId::Mount(self.second.clone()))
        } else {
            Ok(VolumeId::Mount(PathBuf::from("first")))
        }
    }
}

fn split_context(second: &Path) -> StorageContext {
    StorageContext::new(EngineConfig::default()).with_metadata_provider(Arc::new(SplitRoots {
        second: second.to_path_buf(),
    }))
}

#[cfg(unix)]
/// Split roots plus a short probe that gives up, so a source held by another lock
/// makes the delete phase fail with `Busy`.
fn split_context_aborting(second: &Path) -> StorageContext {
    let cfg = EngineConfig {
        on_probe_timeout: ProbeTimeoutPolicy::Abort,
        ..EngineConfig::with_probe(Duration::from_millis(200), Duration::from_millis(20))
    };
    StorageContext::new(cfg).with_metadata_provider(Arc::new(SplitRoots {
        second: second.to_path_buf(),
    }))
}

#[cfg(unix)]
/// Progress callback that takes an exclusive lock on `target` at the first report,
/// i.e. after the copy phase has passed its own availability check.
fn lock_during_copy(target: &Path) -> (Progress, Arc<Mutex<Option<File>>>) {
    let held: Arc<Mutex<Option<File>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&held);
    let target = target.to_path_buf();
    let progress = progress_fn(move |_| {
        let mut slot = slot.lock().unwrap();
        if slot.is_none() {
            let f = File::open(&target).unwrap();
            FileExt::lock_exclusive(&f).unwrap();
            *slot = Some(f);
        }
    });
    (progress, held)
}

#[test]
fn cross_root_file_move_copies_then_deletes() {
    let td = tempdir().unwrap();
    let src = td.path().join("a").join("data.bin");
    fs::create_dir_all(src.parent().unwrap()).unwrap();
    fs::write(&src, vec![5u8; 200_000]).unwrap();
    let second = td.path().join("b");

    let fh = FileHandler::with_context(&src, split_context(&second)).unwrap();
    let seen: Arc<Mutex<Vec<ProgressReport>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let snap = fh
        .move_to(&second, false, Some(progress_fn(move |r| sink.lock().unwrap().push(r))))
        .unwrap();

    assert_eq!(snap.path, second.join("data.bin"));
    assert_eq!(snap.size, 200_000);
    assert!(!src.exists());
    assert_eq!(fh.path(), second.join("data.bin"));

    // A real transfer, not the single rename tick.
    let seen = seen.lock().unwrap();
    let last = seen.last().unwrap();
    assert_eq!(last.transferred_bytes, 200_000);
    assert_eq!(last.total_bytes, 200_000);
    assert!(seen.windows(2).all(|w| w[0].transferred_bytes <= w[1].transferred_bytes));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cross_root_directory_move_keeps_empty_dirs() {
    let td = tempdir().unwrap();
    let src = td.path().join("a").join("project");
    fs::create_dir_all(src.join("src")).unwrap();
    fs::create_dir_all(src.join("target/empty")).unwrap();
    fs::write(src.join("src/main.rs"), b"fn main() {}").unwrap();
    fs::write(src.join("README"), b"readme").unwrap();
    let second = td.path().join("b");

    let dh = DirectoryHandler::with_context(&src, split_context(&second)).unwrap();
    let token = CancellationToken::new();
    let snap = dh.move_async(&second, false, None, &token).await.unwrap();

    let moved = second.join("project");
    assert_eq!(snap.path, moved);
    assert!(moved.join("target/empty").is_dir());
    assert_eq!(fs::read(moved.join("src/main.rs")).unwrap(), b"fn main() {}");
    assert!(!src.exists());
    assert_eq!(dh.path(), moved);
}

#[test]
fn failed_delete_rolls_back_the_copy() {
    let td = tempdir().unwrap();
    let copied = td.path().join("copied.bin");
    fs::write(&copied, b"copy").unwrap();

    let mut mover = CrossVolumeMove::new(&td.path().join("source.bin"));
    let err = mover
        .run(
            || Ok(copied.clone()),
            || {
                Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "source in use",
                )))
            },
            |p: &PathBuf| fs::remove_file(p).map_err(StorageError::from),
        )
        .unwrap_err();

    assert!(matches!(err, StorageError::Io(_)));
    assert!(mover.rolled_back());
    assert_eq!(mover.state(), MoveState::Failed);
    assert!(!copied.exists());
}

#[test]
fn cross_root_move_of_missing_source_is_not_found() {
    let td = tempdir().unwrap();
    let src = td.path().join("a").join("gone.txt");
    fs::create_dir_all(src.parent().unwrap()).unwrap();
    fs::write(&src, b"x").unwrap();
    let second = td.path().join("b");

    let fh = FileHandler::with_context(&src, split_context(&second)).unwrap();
    fs::remove_file(&src).unwrap();
    let err = fh.move_to(&second, false, None).unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)), "{err:?}");
    assert!(!fh.is_disposed());
    assert!(!second.join("gone.txt").exists());
}

#[cfg(unix)]
#[test]
fn failed_file_move_removes_the_new_copy() {
    let td = tempdir().unwrap();
    let src = td.path().join("a").join("data.bin");
    fs::create_dir_all(src.parent().unwrap()).unwrap();
    fs::write(&src, vec![1u8; 50_000]).unwrap();
    let second = td.path().join("b");

    let fh = FileHandler::with_context(&src, split_context_aborting(&second)).unwrap();
    let (progress, held) = lock_during_copy(&src);
    let err = fh.move_to(&second, false, Some(progress)).unwrap_err();

    assert!(matches!(err, StorageError::Busy(_)), "{err:?}");
    assert!(held.lock().unwrap().is_some());
    assert_eq!(fs::read(&src).unwrap().len(), 50_000);
    assert!(!second.join("data.bin").exists());
    assert_eq!(fh.path(), src);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_file_move_keeps_a_destination_it_replaced() {
    let td = tempdir().unwrap();
    let src = td.path().join("a").join("data.bin");
    fs::create_dir_all(src.parent().unwrap()).unwrap();
    fs::write(&src, b"incoming").unwrap();
    let second = td.path().join("b");
    fs::create_dir_all(&second).unwrap();
    fs::write(second.join("data.bin"), b"resident").unwrap();

    let fh = FileHandler::with_context(&src, split_context_aborting(&second)).unwrap();
    let (progress, _held) = lock_during_copy(&src);
    let token = CancellationToken::new();
    let err = fh.move_async(&second, true, Some(progress), &token).await.unwrap_err();

    assert!(matches!(err, StorageError::Busy(_)), "{err:?}");
    assert_eq!(fs::read(&src).unwrap(), b"incoming");
    // The old content is gone once overwritten; the file itself stays.
    assert_eq!(fs::read(second.join("data.bin")).unwrap(), b"incoming");
}

#[cfg(unix)]
#[test]
fn failed_directory_merge_keeps_what_was_already_there() {
    let td = tempdir().unwrap();
    let src = td.path().join("a").join("proj");
    fs::create_dir_all(src.join("docs")).unwrap();
    fs::write(src.join("docs/guide.md"), b"guide").unwrap();
    fs::write(src.join("main.rs"), b"fn main() {}").unwrap();
    let second = td.path().join("b");
    fs::create_dir_all(second.join("proj")).unwrap();
    fs::write(second.join("proj/keep.txt"), b"keep me").unwrap();

    let dh = DirectoryHandler::with_context(&src, split_context_aborting(&second)).unwrap();
    let (progress, held) = lock_during_copy(&src);
    let err = dh.move_to(&second, true, Some(progress)).unwrap_err();

    assert!(matches!(err, StorageError::Busy(_)), "{err:?}");
    drop(held);
    assert_eq!(fs::read(second.join("proj/keep.txt")).unwrap(), b"keep me");
    assert!(!second.join("proj/main.rs").exists());
    assert!(!second.join("proj/docs").exists());
    assert_eq!(fs::read(src.join("docs/guide.md")).unwrap(), b"guide");
    assert_eq!(dh.path(), src);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_async_directory_move_removes_the_created_tree() {
    let td = tempdir().unwrap();
    let src = td.path().join("a").join("proj");
    fs::create_dir_all(src.join("empty")).unwrap();
    fs::write(src.join("main.rs"), b"fn main() {}").unwrap();
    let second = td.path().join("b");

    let dh = DirectoryHandler::with_context(&src, split_context_aborting(&second)).unwrap();
    let (progress, _held) = lock_during_copy(&src);
    let token = CancellationToken::new();
    let err = dh.move_async(&second, false, Some(progress), &token).await.unwrap_err();

    assert!(matches!(err, StorageError::Busy(_)), "{err:?}");
    assert!(!second.join("proj").exists());
    assert!(src.join("empty").is_dir());
    assert_eq!(fs::read(src.join("main.rs")).unwrap(), b"fn main() {}");
}
