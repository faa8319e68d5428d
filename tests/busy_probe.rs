use fs2::FileExt;
use std::fs::{self, File};
use std::io::Cursor;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use storage_ops::{
    CancellationToken, EngineConfig, FileHandler, ProbeTimeoutPolicy, StorageContext, StorageError,
};

fn probe_ctx(policy: ProbeTimeoutPolicy) -> StorageContext {
    let cfg = EngineConfig {
        on_probe_timeout: policy,
        ..EngineConfig::with_probe(Duration::from_millis(200), Duration::from_millis(20))
    };
    StorageContext::new(cfg)
}

#[test]
fn locked_file_aborts_with_busy() {
    let td = tempdir().unwrap();
    let p = td.path().join("held.db");
    fs::write(&p, b"v1").unwrap();
    let holder = File::open(&p).unwrap();
    FileExt::lock_exclusive(&holder).unwrap();

    let fh = FileHandler::with_context(&p, probe_ctx(ProbeTimeoutPolicy::Abort)).unwrap();
    let started = Instant::now();
    let err = fh.write(Cursor::new(b"v2".to_vec()), true, None).unwrap_err();
    assert!(matches!(err, StorageError::Busy(_)), "{err:?}");
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(fs::read(&p).unwrap(), b"v1");

    FileExt::unlock(&holder).unwrap();
    fh.write(Cursor::new(b"v2".to_vec()), true, None).unwrap();
    assert_eq!(fs::read(&p).unwrap(), b"v2");
}

#[test]
fn proceed_policy_continues_after_timeout() {
    let td = tempdir().unwrap();
    let p = td.path().join("held.db");
    fs::write(&p, b"v1").unwrap();
    let holder = File::open(&p).unwrap();
    FileExt::lock_exclusive(&holder).unwrap();

    let fh = FileHandler::with_context(&p, probe_ctx(ProbeTimeoutPolicy::Proceed)).unwrap();
    let copied = fh.copy(td.path().join("out"), false, None).unwrap();
    assert_eq!(fs::read(&copied.path).unwrap(), b"v1");
    FileExt::unlock(&holder).unwrap();
}

#[tokio::test]
async fn cancelling_while_waiting_returns_cancelled() {
    let td = tempdir().unwrap();
    let p = td.path().join("held.db");
    fs::write(&p, b"v1").unwrap();
    let holder = File::open(&p).unwrap();
    FileExt::lock_exclusive(&holder).unwrap();

    let cfg = EngineConfig {
        on_probe_timeout: ProbeTimeoutPolicy::Abort,
        ..EngineConfig::with_probe(Duration::from_secs(30), Duration::from_millis(20))
    };
    let fh = FileHandler::with_context(&p, StorageContext::new(cfg)).unwrap();
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = fh.delete_async(&token).await.unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(p.exists());
    FileExt::unlock(&holder).unwrap();
}
