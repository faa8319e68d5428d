//! Core configuration types.
//! - EngineConfig holds runtime settings with sensible defaults.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::{
    DEFAULT_METADATA_TTL, DEFAULT_PROBE_INTERVAL, DEFAULT_PROBE_TIMEOUT,
};

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// What an operation does when the availability probe runs out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeTimeoutPolicy {
    /// Log a warning and carry on against a possibly-still-held entity.
    #[default]
    Proceed,
    /// Fail the operation with `StorageError::Busy`.
    Abort,
}

impl FromStr for ProbeTimeoutPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proceed" => Ok(ProbeTimeoutPolicy::Proceed),
            "abort" => Ok(ProbeTimeoutPolicy::Abort),
            other => Err(format!("invalid probe timeout policy: '{other}'")),
        }
    }
}

/// Durability mode controlling post-write flush behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Durability {
    /// Ensure written data reaches the OS page cache (`flush`), but do not force
    /// a disk barrier. Fastest; may lose data on sudden power loss.
    Data,
    /// Force data and metadata to stable storage (`sync_all`). Highest integrity.
    #[default]
    Full,
}

/// Runtime configuration shared by every handler created from the same context.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on how long an availability probe waits
    pub probe_timeout: Duration,
    /// Delay between probe attempts
    pub probe_interval: Duration,
    /// Behavior once `probe_timeout` elapses
    pub on_probe_timeout: ProbeTimeoutPolicy,
    /// Validity window of cached metadata snapshots
    pub metadata_ttl: Duration,
    /// Ceiling for concurrent per-file copies in async directory copy (None = unbounded)
    pub max_concurrent_copies: Option<usize>,
    /// Flush behavior at the end of a transfer
    pub durability: Durability,
    /// If true, copies carry over timestamps and permissions
    pub preserve_metadata: bool,
    /// Console verbosity (used by the binary)
    pub log_level: LogLevel,
    /// Optional path to a log file (used by the binary)
    pub log_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            on_probe_timeout: ProbeTimeoutPolicy::Proceed,
            metadata_ttl: DEFAULT_METADATA_TTL,
            max_concurrent_copies: None,
            durability: Durability::Full,
            preserve_metadata: false,
            log_level: LogLevel::Normal,
            log_file: None,
        }
    }
}

impl EngineConfig {
    /// Construct a config with explicit probe timing; other fields use defaults.
    pub fn with_probe(probe_timeout: Duration, probe_interval: Duration) -> Self {
        Self {
            probe_timeout,
            probe_interval,
            ..Default::default()
        }
    }
}
