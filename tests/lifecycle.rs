use std::fs;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use storage_ops::{CancellationToken, ChangeKind, DirectoryHandler, FileHandler, StorageError};

#[test]
fn every_operation_fails_after_dispose() {
    let td = tempdir().unwrap();
    let fh = FileHandler::new(td.path().join("doc.txt")).unwrap();
    fh.dispose();
    assert!(fh.is_disposed());

    let out = td.path().join("out");
    assert!(matches!(fh.copy(&out, false, None), Err(StorageError::Disposed(_))));
    assert!(matches!(fh.move_to(&out, false, None), Err(StorageError::Disposed(_))));
    assert!(matches!(fh.rename("other.txt"), Err(StorageError::Disposed(_))));
    assert!(matches!(fh.delete(), Err(StorageError::Disposed(_))));
    assert!(matches!(
        fh.write(Cursor::new(b"x".to_vec()), true, None),
        Err(StorageError::Disposed(_))
    ));
    assert!(matches!(fh.metadata(), Err(StorageError::Disposed(_))));
    // Disposing only detaches the handler; the file stays.
    assert!(td.path().join("doc.txt").exists());
    assert!(!out.exists());
}

#[tokio::test]
async fn async_operations_fail_after_dispose() {
    let td = tempdir().unwrap();
    let dh = DirectoryHandler::new(td.path().join("box")).unwrap();
    dh.dispose();
    let token = CancellationToken::new();
    let out = td.path().join("out");
    assert!(matches!(dh.copy_async(&out, false, None, &token).await, Err(StorageError::Disposed(_))));
    assert!(matches!(dh.move_async(&out, false, None, &token).await, Err(StorageError::Disposed(_))));
    assert!(matches!(dh.rename_async("crate", &token).await, Err(StorageError::Disposed(_))));
    assert!(matches!(dh.delete_async(&token).await, Err(StorageError::Disposed(_))));
}

#[test]
fn delete_of_externally_removed_file_succeeds() {
    let td = tempdir().unwrap();
    let p = td.path().join("vanishing.log");
    let fh = FileHandler::new(&p).unwrap();
    fs::remove_file(&p).unwrap();

    let kinds = Arc::new(Mutex::new(Vec::new()));
    let k = Arc::clone(&kinds);
    fh.subscribe(move |n| k.lock().unwrap().push(n.kind));

    fh.delete().unwrap();
    assert!(fh.is_disposed());
    assert_eq!(*kinds.lock().unwrap(), vec![ChangeKind::Deleted]);
}

#[test]
fn delete_removes_directory_recursively() {
    let td = tempdir().unwrap();
    let root = td.path().join("cache");
    fs::create_dir_all(root.join("a/b/c")).unwrap();
    fs::write(root.join("a/b/c/blob"), b"x").unwrap();

    let dh = DirectoryHandler::new(&root).unwrap();
    dh.delete().unwrap();
    assert!(!root.exists());
    assert!(dh.is_disposed());
}

#[test]
fn unsubscribed_callbacks_are_not_called() {
    let td = tempdir().unwrap();
    let fh = FileHandler::new(td.path().join("quiet.txt")).unwrap();
    let calls = Arc::new(Mutex::new(0u32));
    let c = Arc::clone(&calls);
    let id = fh.subscribe(move |_| *c.lock().unwrap() += 1);

    fh.write(Cursor::new(b"one".to_vec()), true, None).unwrap();
    assert!(fh.unsubscribe(id));
    assert!(!fh.unsubscribe(id));
    fh.write(Cursor::new(b"two".to_vec()), true, None).unwrap();
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn new_handler_rejects_bad_paths() {
    assert!(matches!(FileHandler::new(""), Err(StorageError::InvalidPath { .. })));
    assert!(matches!(FileHandler::new("   "), Err(StorageError::InvalidPath { .. })));
    assert!(matches!(FileHandler::new("bad\0name"), Err(StorageError::InvalidPath { .. })));
}

#[tokio::test]
#[should_panic(expected = "Cannot block the current thread")]
async fn blocking_call_on_a_runtime_thread_panics() {
    let td = tempdir().unwrap();
    let fh = FileHandler::new(td.path().join("a.txt")).unwrap();
    let _ = fh.copy(td.path().join("out"), false, None);
}

#[tokio::test]
async fn blocking_calls_work_from_spawn_blocking() {
    let td = tempdir().unwrap();
    let src = td.path().join("site");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("index.html"), b"<html>").unwrap();
    let out = td.path().join("out");

    let dh = DirectoryHandler::new(&src).unwrap();
    let snap = tokio::task::spawn_blocking(move || dh.copy(&out, false, None))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fs::read(snap.path.join("index.html")).unwrap(), b"<html>");
}
