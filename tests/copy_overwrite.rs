use std::fs;
use tempfile::tempdir;

use storage_ops::{DirectoryHandler, FileHandler};

#[test]
fn overwrite_replaces_existing_file_content() {
    let td = tempdir().unwrap();
    let src = td.path().join("report.csv");
    fs::write(&src, b"new,data\n").unwrap();
    let out = td.path().join("out");
    fs::create_dir(&out).unwrap();
    fs::write(out.join("report.csv"), b"stale content that is longer").unwrap();

    let fh = FileHandler::new(&src).unwrap();
    let snap = fh.copy(&out, true, None).unwrap();
    assert_eq!(snap.path, out.join("report.csv"));
    assert_eq!(fs::read(out.join("report.csv")).unwrap(), b"new,data\n");
    assert!(!out.join("report (1).csv").exists());
    // Source stays where it was.
    assert_eq!(fh.path(), src);
    assert!(src.exists());
}

#[test]
fn copy_leaves_no_staging_files_behind() {
    let td = tempdir().unwrap();
    let src = td.path().join("blob.bin");
    fs::write(&src, vec![3u8; 300_000]).unwrap();
    let out = td.path().join("out");

    let fh = FileHandler::new(&src).unwrap();
    fh.copy(&out, false, None).unwrap();

    let names: Vec<String> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["blob.bin".to_string()]);
}

#[test]
fn directory_overwrite_merges_into_existing_tree() {
    let td = tempdir().unwrap();
    let src = td.path().join("photos");
    fs::create_dir_all(src.join("2024")).unwrap();
    fs::write(src.join("2024/a.jpg"), b"new-a").unwrap();

    let out = td.path().join("out");
    fs::create_dir_all(out.join("photos/2024")).unwrap();
    fs::write(out.join("photos/2024/a.jpg"), b"old-a").unwrap();
    fs::write(out.join("photos/keep.txt"), b"keep").unwrap();

    let dh = DirectoryHandler::new(&src).unwrap();
    let snap = dh.copy(&out, true, None).unwrap();
    assert_eq!(snap.path, out.join("photos"));
    assert_eq!(fs::read(out.join("photos/2024/a.jpg")).unwrap(), b"new-a");
    assert_eq!(fs::read(out.join("photos/keep.txt")).unwrap(), b"keep");
}
