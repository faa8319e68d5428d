use std::fs;
use std::io::Cursor;
use tempfile::tempdir;

use storage_ops::{CancellationToken, DirectoryHandler, FileHandler, StorageError, progress_fn};

#[tokio::test]
async fn pre_cancelled_write_leaves_file_unchanged() {
    let td = tempdir().unwrap();
    let p = td.path().join("config.ini");
    fs::write(&p, b"original").unwrap();
    let fh = FileHandler::new(&p).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = fh
        .write_async(Cursor::new(vec![7u8; 10_000]), true, None, &token)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Cancelled));
    assert_eq!(fs::read(&p).unwrap(), b"original");
    assert!(!fh.is_disposed());
}

#[tokio::test]
async fn cancel_during_copy_removes_partial_output() {
    let td = tempdir().unwrap();
    let src = td.path().join("big.bin");
    fs::write(&src, vec![1u8; 4 * 1024 * 1024]).unwrap();
    let out = td.path().join("out");
    let fh = FileHandler::new(&src).unwrap();

    let token = CancellationToken::new();
    let trigger = token.clone();
    // Cancel as soon as the first chunk lands.
    let progress = progress_fn(move |_| trigger.cancel());
    let err = fh.copy_async(&out, false, Some(progress), &token).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(!out.join("big.bin").exists());
    let leftovers: Vec<_> = fs::read_dir(&out).map(|rd| rd.collect()).unwrap_or_default();
    assert!(leftovers.is_empty(), "staging files left behind: {leftovers:?}");
    assert!(src.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_directory_copy_removes_created_root() {
    let td = tempdir().unwrap();
    let src = td.path().join("dataset");
    fs::create_dir_all(src.join("part")).unwrap();
    for i in 0..8 {
        fs::write(src.join("part").join(format!("{i}.bin")), vec![i as u8; 512 * 1024]).unwrap();
    }
    let out = td.path().join("out");
    let dh = DirectoryHandler::new(&src).unwrap();

    let token = CancellationToken::new();
    let trigger = token.clone();
    let progress = progress_fn(move |_| trigger.cancel());
    let err = dh.copy_async(&out, false, Some(progress), &token).await.unwrap_err();

    assert!(err.is_cancelled(), "{err:?}");
    assert!(!out.join("dataset").exists());
    assert!(src.join("part/7.bin").exists());
}
