//! Availability probing.
//!
//! An entity is "available" when an exclusive advisory lock can be taken on it, which
//! fails while another process holds a conflicting lock. The probe retries on a fixed
//! interval until it succeeds or the timeout elapses; timing out is not an error here,
//! [`ensure_available`] applies the configured policy on top.
//!
//! An absent path counts as available so that operations surface the real not-found
//! error instead of a timeout.

use fs2::FileExt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::config::{EngineConfig, ProbeTimeoutPolicy};
use crate::errors::{Result, StorageError};
use crate::platform;

fn is_contended(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    let contended = fs2::lock_contended_error();
    e.raw_os_error().is_some() && e.raw_os_error() == contended.raw_os_error()
}

#[cfg(windows)]
fn is_sharing_violation(e: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    matches!(e.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_sharing_violation(_e: &io::Error) -> bool {
    false
}

/// One probe attempt.
pub(crate) fn try_exclusive(path: &Path) -> bool {
    match platform::probe_handle(path) {
        Ok(Some(file)) => match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                true
            }
            Err(e) if is_contended(&e) => false,
            Err(e) => {
                trace!(path = %path.display(), error = %e, "lock attempt failed; treating as busy");
                false
            }
        },
        // Directory without a lockable handle: readable means usable.
        Ok(None) => fs::read_dir(path).is_ok(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) if is_sharing_violation(&e) || e.kind() == io::ErrorKind::PermissionDenied => false,
        Err(e) => {
            trace!(path = %path.display(), error = %e, "probe open failed; treating as busy");
            false
        }
    }
}

/// Poll `path` until it is available. Returns `Ok(false)` on timeout and
/// `Err(Cancelled)` when `cancel` fires between attempts.
pub fn wait_available(
    path: &Path,
    timeout: Duration,
    interval: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<bool> {
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        if cancel.is_some_and(|t| t.is_cancelled()) {
            return Err(StorageError::Cancelled);
        }
        attempts += 1;
        if try_exclusive(path) {
            if attempts > 1 {
                trace!(path = %path.display(), attempts, "became available");
            }
            return Ok(true);
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Ok(false);
        }
        thread::sleep(interval.min(timeout - elapsed));
    }
}

/// Async [`wait_available`]: attempts run on the blocking pool and the wait between
/// them races the cancellation token.
pub async fn wait_available_async(
    path: &Path,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<bool> {
    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        let p: PathBuf = path.to_path_buf();
        let ok = tokio::task::spawn_blocking(move || try_exclusive(&p))
            .await
            .map_err(io::Error::other)?;
        if ok {
            return Ok(true);
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Ok(false);
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            _ = tokio::time::sleep(interval.min(timeout - elapsed)) => {}
        }
    }
}

fn on_timeout(path: &Path, cfg: &EngineConfig) -> Result<()> {
    match cfg.on_probe_timeout {
        ProbeTimeoutPolicy::Proceed => {
            warn!(path = %path.display(), timeout_ms = cfg.probe_timeout.as_millis() as u64, "entity still busy after probe timeout; proceeding");
            Ok(())
        }
        ProbeTimeoutPolicy::Abort => Err(StorageError::Busy(path.to_path_buf())),
    }
}

/// Wait for `path` per `cfg`, then apply the timeout policy.
pub(crate) fn ensure_available(path: &Path, cfg: &EngineConfig) -> Result<()> {
    if wait_available(path, cfg.probe_timeout, cfg.probe_interval, None)? {
        Ok(())
    } else {
        on_timeout(path, cfg)
    }
}

pub(crate) async fn ensure_available_async(
    path: &Path,
    cfg: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    if wait_available_async(path, cfg.probe_timeout, cfg.probe_interval, cancel).await? {
        Ok(())
    } else {
        on_timeout(path, cfg)
    }
}
