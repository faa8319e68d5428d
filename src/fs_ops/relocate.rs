//! Cross-volume move: copy, then delete the source, undoing the copy if the delete fails.
//!
//! State machine:
//!   Idle -> Copying -> Deleting -> Complete
//!   Copying  -- copy fails   --> Failed
//!   Deleting -- delete fails --> RolledBack -> Failed
//!
//! Rollback is best-effort: its own error is logged and dropped so the caller sees the
//! delete failure that triggered it. The phases are passed in as closures so file and
//! directory moves share one orchestration.

use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Idle,
    Copying,
    Deleting,
    Complete,
    RolledBack,
    Failed,
}

#[derive(Debug)]
pub struct CrossVolumeMove {
    source: PathBuf,
    state: MoveState,
    rolled_back: bool,
}

impl CrossVolumeMove {
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            state: MoveState::Idle,
            rolled_back: false,
        }
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    /// Whether a rollback of the copied data was attempted.
    pub fn rolled_back(&self) -> bool {
        self.rolled_back
    }

    fn enter(&mut self, next: MoveState) {
        debug!(src = %self.source.display(), from = ?self.state, to = ?next, "cross-volume move");
        self.state = next;
    }

    fn after_delete_failure(&mut self, rollback: Result<()>) {
        if let Err(e) = rollback {
            warn!(src = %self.source.display(), error = %e, "rollback after failed source delete did not complete; copied data may remain");
        }
        self.rolled_back = true;
        self.enter(MoveState::RolledBack);
        self.enter(MoveState::Failed);
    }

    /// Run the move with blocking phases. `rollback` receives the copy result.
    pub fn run<T, C, D, R>(&mut self, copy: C, delete: D, rollback: R) -> Result<T>
    where
        C: FnOnce() -> Result<T>,
        D: FnOnce() -> Result<()>,
        R: FnOnce(&T) -> Result<()>,
    {
        self.enter(MoveState::Copying);
        let copied = match copy() {
            Ok(c) => c,
            Err(e) => {
                self.enter(MoveState::Failed);
                return Err(e);
            }
        };
        self.enter(MoveState::Deleting);
        match delete() {
            Ok(()) => {
                self.enter(MoveState::Complete);
                Ok(copied)
            }
            Err(e) => {
                let rb = rollback(&copied);
                self.after_delete_failure(rb);
                Err(e)
            }
        }
    }

    /// Async [`run`](Self::run).
    pub async fn run_async<T, C, CF, D, DF, R, RF>(&mut self, copy: C, delete: D, rollback: R) -> Result<T>
    where
        C: FnOnce() -> CF,
        CF: Future<Output = Result<T>>,
        D: FnOnce() -> DF,
        DF: Future<Output = Result<()>>,
        R: FnOnce(&T) -> RF,
        RF: Future<Output = Result<()>>,
    {
        self.enter(MoveState::Copying);
        let copied = match copy().await {
            Ok(c) => c,
            Err(e) => {
                self.enter(MoveState::Failed);
                return Err(e);
            }
        };
        self.enter(MoveState::Deleting);
        match delete().await {
            Ok(()) => {
                self.enter(MoveState::Complete);
                Ok(copied)
            }
            Err(e) => {
                let rb = rollback(&copied).await;
                self.after_delete_failure(rb);
                Err(e)
            }
        }
    }
}
