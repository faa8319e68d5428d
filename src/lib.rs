//! Core library for `storage_ops`.
//!
//! File and directory handlers that copy, move, rename, delete and write with:
//! - progress reports after every chunk,
//! - cooperative cancellation for the async variants,
//! - an availability probe that waits out other processes holding the entity,
//! - collision-free destination naming (`name (1).ext`),
//! - copy-then-delete with rollback when a move crosses storage roots,
//! - a short-lived metadata cache and change notifications.
//!
//! ```no_run
//! use storage_ops::FileHandler;
//!
//! # fn main() -> storage_ops::Result<()> {
//! let report = FileHandler::new("/data/in/report.pdf")?;
//! let copy = report.copy("/data/archive", false, None)?;
//! println!("copied to {}", copy.path.display());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directory;
pub mod errors;
pub mod file;
pub mod fs_ops;
pub mod metadata;
pub mod object;
pub mod output;
pub mod platform;
pub mod progress;

pub use config::{
    Durability, EngineConfig, LogLevel, ProbeTimeoutPolicy, create_template_config,
    default_config_path, default_log_path, load_config, load_config_from_xml_path,
    path_has_symlink_ancestor,
};
pub use directory::DirectoryHandler;
pub use errors::{Operation, Result, StorageError};
pub use file::FileHandler;
pub use fs_ops::{CrossVolumeMove, MoveState, buffer_size_for, resolve_destination};
pub use metadata::{
    CachedMetadata, ContentClassifier, ContentMatch, FileAttributes, MetadataProvider,
    MetadataSnapshot, NativeMetadata, NoClassifier, VolumeId,
};
pub use object::{ChangeKind, ChangeNotification, StorageContext, SubscriptionId};
pub use progress::{Progress, ProgressReport, progress_fn};
pub use tokio_util::sync::CancellationToken;
