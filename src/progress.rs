//! Progress reporting.
//!
//! A transfer reports `{total, transferred, throughput}` after every successful write.
//! Reports never go backwards and the last one equals the full size, including the
//! degenerate empty transfer which still gets a single `{0, 0}` report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One progress observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    /// Bytes per second since the transfer began.
    pub bytes_per_second: f64,
}

impl ProgressReport {
    pub fn is_complete(&self) -> bool {
        self.transferred_bytes >= self.total_bytes
    }
}

/// Progress callback shared across threads and tasks.
pub type Progress = Arc<dyn Fn(ProgressReport) + Send + Sync>;

/// Wrap a closure as a [`Progress`] sink.
pub fn progress_fn<F>(f: F) -> Progress
where
    F: Fn(ProgressReport) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn throughput(transferred: u64, started: Instant) -> f64 {
    let secs = started.elapsed().as_secs_f64();
    if secs > 0.0 { transferred as f64 / secs } else { 0.0 }
}

/// Tracks a single transfer.
pub(crate) struct ProgressTracker {
    total: u64,
    started: Instant,
    sink: Option<Progress>,
    reported: bool,
}

impl ProgressTracker {
    pub(crate) fn new(total: u64, sink: Option<Progress>) -> Self {
        Self {
            total,
            started: Instant::now(),
            sink,
            reported: false,
        }
    }

    pub(crate) fn report(&mut self, transferred: u64) {
        if let Some(sink) = &self.sink {
            sink(ProgressReport {
                // A source that grew mid-copy must not produce transferred > total.
                total_bytes: self.total.max(transferred),
                transferred_bytes: transferred,
                bytes_per_second: throughput(transferred, self.started),
            });
        }
        self.reported = true;
    }

    /// Emit the closing report when no write ever happened (empty source).
    pub(crate) fn finish(&mut self, transferred: u64) {
        if !self.reported {
            self.report(transferred);
        }
    }
}

/// Emit the single `{1, 1}` tick used by atomic renames.
pub(crate) fn report_single_tick(sink: Option<&Progress>) {
    if let Some(sink) = sink {
        let started = Instant::now();
        sink(ProgressReport {
            total_bytes: 1,
            transferred_bytes: 1,
            bytes_per_second: throughput(1, started),
        });
    }
}

struct AggregateState {
    last_reported: u64,
    reported: bool,
}

/// Running total over many concurrent per-file transfers sharing one clock.
pub(crate) struct AggregateProgress {
    total: u64,
    transferred: AtomicU64,
    started: Instant,
    sink: Option<Progress>,
    state: Mutex<AggregateState>,
}

impl AggregateProgress {
    pub(crate) fn new(total: u64, sink: Option<Progress>) -> Arc<Self> {
        Arc::new(Self {
            total,
            transferred: AtomicU64::new(0),
            started: Instant::now(),
            sink,
            state: Mutex::new(AggregateState {
                last_reported: 0,
                reported: false,
            }),
        })
    }

    fn add(&self, delta: u64) {
        let now = self.transferred.fetch_add(delta, Ordering::AcqRel) + delta;
        self.emit(now, false);
    }

    fn emit(&self, now: u64, force: bool) {
        let Some(sink) = &self.sink else { return };
        let Ok(mut st) = self.state.lock() else { return };
        // Concurrent adders may arrive out of order; only ever move forward.
        if now > st.last_reported || (force && !st.reported) {
            st.last_reported = now;
            st.reported = true;
            sink(ProgressReport {
                total_bytes: self.total.max(now),
                transferred_bytes: now,
                bytes_per_second: throughput(now, self.started),
            });
        }
    }

    /// Per-file sink translating cumulative per-file reports into deltas on the total.
    pub(crate) fn file_tap(self: &Arc<Self>) -> Progress {
        let agg = Arc::clone(self);
        let last = AtomicU64::new(0);
        Arc::new(move |r: ProgressReport| {
            let prev = last.swap(r.transferred_bytes, Ordering::AcqRel);
            let delta = r.transferred_bytes.saturating_sub(prev);
            if delta > 0 {
                agg.add(delta);
            }
        })
    }

    /// Close the aggregate, emitting a final report if nothing was reported yet.
    pub(crate) fn finish(&self) {
        let now = self.transferred.load(Ordering::Acquire);
        self.emit(now, true);
    }
}
