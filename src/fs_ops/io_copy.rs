//! Streaming copy into a destination path with progress and durability.
//!
//! Both engines stage bytes in a hidden sibling of the destination and rename it into
//! place only after the last byte is written and flushed, so the destination is never
//! observed half-written. Any failure or cancellation removes the staged file.
//!
//! - [`copy_stream`]: blocking, single buffer.
//! - [`copy_stream_async`]: double buffer; the next chunk is read while the current
//!   one is written, and the cancellation token is checked once per chunk.
//!
//! Snapshot semantics: the reader is consumed once to EOF; growth after the start is
//! included, and the progress total is raised so reports never exceed it.

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::atomic;
use super::resolve::occupied;
use super::util::unique_temp_path;
use crate::config::Durability;
use crate::errors::{Result, StorageError};
use crate::progress::{Progress, ProgressTracker};

pub(crate) const MIN_BUFFER: usize = 1024;
pub(crate) const MAX_BUFFER: usize = 16 * 1024 * 1024;

/// Buffer size for a transfer of `len` bytes: one percent of the size, clamped to
/// [1 KiB, 16 MiB].
pub fn buffer_size_for(len: u64) -> usize {
    let pct = len / 100;
    pct.clamp(MIN_BUFFER as u64, MAX_BUFFER as u64) as usize
}

/// Knobs for one transfer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CopyOptions {
    /// Replace an existing destination at commit time.
    pub overwrite: bool,
    pub durability: Durability,
    pub buffer_size: usize,
}

impl CopyOptions {
    pub(crate) fn new(total: u64, overwrite: bool, durability: Durability) -> Self {
        Self {
            overwrite,
            durability,
            buffer_size: buffer_size_for(total),
        }
    }
}

fn staging_dir(dest: &Path) -> Result<&Path> {
    dest.parent().ok_or_else(|| StorageError::InvalidPath {
        path: dest.to_string_lossy().into_owned(),
        reason: "destination has no parent directory",
    })
}

/// Move the staged file into place.
fn commit(tmp: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && occupied(dest) {
        return Err(StorageError::AlreadyExists(dest.to_path_buf()));
    }
    atomic::replace(tmp, dest)?;
    Ok(())
}

async fn commit_async(tmp: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    if !overwrite && tokio::fs::symlink_metadata(dest).await.is_ok() {
        return Err(StorageError::AlreadyExists(dest.to_path_buf()));
    }
    atomic::replace_async(tmp, dest).await?;
    Ok(())
}

/// Blocking copy of `reader` into `dest`. Returns the number of bytes written.
pub(crate) fn copy_stream<R: Read + ?Sized>(
    reader: &mut R,
    total: u64,
    dest: &Path,
    opts: &CopyOptions,
    progress: Option<Progress>,
) -> Result<u64> {
    let tmp = unique_temp_path(staging_dir(dest)?);
    let staged = stage_blocking(reader, total, &tmp, opts, progress)
        .and_then(|n| commit(&tmp, dest, opts.overwrite).map(|()| n));
    match staged {
        Ok(n) => {
            trace!(dest = %dest.display(), bytes = n, buf = opts.buffer_size, "copy committed");
            Ok(n)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            debug!(dest = %dest.display(), error = %e, "copy aborted; staged file removed");
            Err(e)
        }
    }
}

fn stage_blocking<R: Read + ?Sized>(
    reader: &mut R,
    total: u64,
    tmp: &Path,
    opts: &CopyOptions,
    progress: Option<Progress>,
) -> Result<u64> {
    let mut out = OpenOptions::new().write(true).create_new(true).open(tmp)?;
    let mut tracker = ProgressTracker::new(total, progress);
    let mut buf = vec![0u8; opts.buffer_size];
    let mut transferred = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        out.write_all(&buf[..n])?;
        transferred += n as u64;
        tracker.report(transferred);
    }
    out.flush()?;
    if opts.durability == Durability::Full {
        out.sync_all()?;
    }
    tracker.finish(transferred);
    Ok(transferred)
}

/// Async double-buffered copy of `reader` into `dest`.
pub(crate) async fn copy_stream_async<R>(
    reader: &mut R,
    total: u64,
    dest: &Path,
    opts: &CopyOptions,
    progress: Option<Progress>,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }
    let tmp = unique_temp_path(staging_dir(dest)?);
    let staged = match stage_double_buffered(reader, total, &tmp, opts, progress, cancel).await {
        Ok(n) => commit_async(&tmp, dest, opts.overwrite).await.map(|()| n),
        Err(e) => Err(e),
    };
    match staged {
        Ok(n) => {
            trace!(dest = %dest.display(), bytes = n, buf = opts.buffer_size, "async copy committed");
            Ok(n)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            debug!(dest = %dest.display(), error = %e, "async copy aborted; staged file removed");
            Err(e)
        }
    }
}

async fn stage_double_buffered<R>(
    reader: &mut R,
    total: u64,
    tmp: &Path,
    opts: &CopyOptions,
    progress: Option<Progress>,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut out = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)
        .await?;
    let mut tracker = ProgressTracker::new(total, progress);
    let mut current = vec![0u8; opts.buffer_size];
    let mut next = vec![0u8; opts.buffer_size];
    let mut transferred = 0u64;

    let mut filled = reader.read(&mut current).await?;
    while filled > 0 {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        // Overlap: write the filled buffer while reading into the spare one.
        let (read_res, write_res) =
            tokio::join!(reader.read(&mut next), out.write_all(&current[..filled]));
        write_res?;
        transferred += filled as u64;
        tracker.report(transferred);
        filled = read_res?;
        std::mem::swap(&mut current, &mut next);
    }
    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled);
    }
    out.flush().await?;
    if opts.durability == Durability::Full {
        out.sync_all().await?;
    }
    tracker.finish(transferred);
    Ok(transferred)
}
