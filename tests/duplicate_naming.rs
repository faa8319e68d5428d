use std::ffi::OsStr;
use std::fs;
use tempfile::tempdir;

use storage_ops::{FileHandler, StorageError, resolve_destination};

#[test]
fn repeated_copies_get_increasing_suffixes() {
    let td = tempdir().unwrap();
    let src = td.path().join("a.txt");
    fs::write(&src, b"hello").unwrap();
    let out = td.path().join("out");
    fs::create_dir(&out).unwrap();
    fs::write(out.join("a.txt"), b"older").unwrap();

    let fh = FileHandler::new(&src).unwrap();
    let first = fh.copy(&out, false, None).unwrap();
    assert_eq!(first.path, out.join("a (1).txt"));
    assert_eq!(first.size, 5);

    let second = fh.copy(&out, false, None).unwrap();
    assert_eq!(second.path, out.join("a (2).txt"));

    // The occupant is untouched.
    assert_eq!(fs::read(out.join("a.txt")).unwrap(), b"older");
    assert_eq!(fs::read(out.join("a (2).txt")).unwrap(), b"hello");
}

#[test]
fn no_collision_returns_requested_name() {
    let td = tempdir().unwrap();
    let dst = resolve_destination(td.path(), OsStr::new("file.txt"), false).unwrap();
    assert_eq!(dst, td.path().join("file.txt"));
}

#[test]
fn suffix_skips_taken_numbers() {
    let td = tempdir().unwrap();
    let dst_dir = td.path();
    fs::write(dst_dir.join("file.txt"), b"1").unwrap();
    fs::write(dst_dir.join("file (1).txt"), b"2").unwrap();
    fs::write(dst_dir.join("file (2).txt"), b"3").unwrap();
    let dst = resolve_destination(dst_dir, OsStr::new("file.txt"), false).unwrap();
    assert_eq!(dst, dst_dir.join("file (3).txt"));
}

#[test]
fn dotfile_and_multi_extension_positions() {
    let td = tempdir().unwrap();
    let dst_dir = td.path();
    fs::write(dst_dir.join(".env"), b"a").unwrap();
    fs::write(dst_dir.join("archive.tar.gz"), b"a").unwrap();
    assert_eq!(
        resolve_destination(dst_dir, OsStr::new(".env"), false).unwrap(),
        dst_dir.join(".env (1)")
    );
    assert_eq!(
        resolve_destination(dst_dir, OsStr::new("archive.tar.gz"), false).unwrap(),
        dst_dir.join("archive.tar (1).gz")
    );
}

#[test]
fn overwrite_returns_the_occupied_name() {
    let td = tempdir().unwrap();
    fs::write(td.path().join("thing.bin"), b"x").unwrap();
    let dst = resolve_destination(td.path(), OsStr::new("thing.bin"), true).unwrap();
    assert_eq!(dst, td.path().join("thing.bin"));
}

#[test]
fn file_blocking_the_destination_dir_is_rejected() {
    let td = tempdir().unwrap();
    let blocker = td.path().join("not_a_dir");
    fs::write(&blocker, b"x").unwrap();
    let src = td.path().join("a.txt");
    fs::write(&src, b"hello").unwrap();

    let fh = FileHandler::new(&src).unwrap();
    let err = fh.copy(&blocker, false, None).unwrap_err();
    assert!(matches!(err, StorageError::NotADirectory(_)), "{err:?}");
}
