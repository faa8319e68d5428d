//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Global flags override config values (which are loaded from XML if present).
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Copy, move, rename, delete and write files or directories with progress and
/// collision-free naming.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "File and directory operations with progress and cancellation")]
pub struct Args {
    /// Use this config file instead of $STORAGE_OPS_CONFIG or the default location.
    #[arg(long, global = true, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(
        short = 'd',
        long,
        global = true,
        help = "Enable debug logging (shorthand for --log-level debug)"
    )]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long, global = true, help = "Emit logs in structured JSON")]
    pub json: bool,

    /// Also append logs to this file.
    #[arg(long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Show a live progress line on stderr.
    #[arg(long, global = true)]
    pub progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Copy a file or directory into DEST_DIR.
    Copy {
        #[arg(value_hint = ValueHint::AnyPath)]
        src: PathBuf,
        #[arg(value_hint = ValueHint::DirPath)]
        dest_dir: PathBuf,
        /// Replace an existing entry instead of picking a "name (n)" variant.
        #[arg(long)]
        overwrite: bool,
    },
    /// Move a file or directory into DEST_DIR.
    Move {
        #[arg(value_hint = ValueHint::AnyPath)]
        src: PathBuf,
        #[arg(value_hint = ValueHint::DirPath)]
        dest_dir: PathBuf,
        /// Replace an existing entry instead of picking a "name (n)" variant.
        #[arg(long)]
        overwrite: bool,
    },
    /// Rename a file or directory within its parent.
    Rename {
        #[arg(value_hint = ValueHint::AnyPath)]
        src: PathBuf,
        new_name: String,
    },
    /// Delete a file or directory (recursively). Missing paths succeed.
    Delete {
        #[arg(value_hint = ValueHint::AnyPath)]
        path: PathBuf,
    },
    /// Replace TARGET's content with the bytes of FILE.
    Write {
        #[arg(value_hint = ValueHint::FilePath)]
        target: PathBuf,
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        from: PathBuf,
        /// Allow replacing a file that already holds data.
        #[arg(long)]
        overwrite: bool,
    },
    /// Write a commented config template to the config location and exit.
    InitConfig,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Copy { .. } => "copy",
            Command::Move { .. } => "move",
            Command::Rename { .. } => "rename",
            Command::Delete { .. } => "delete",
            Command::Write { .. } => "write",
            Command::InitConfig => "init-config",
        }
    }
}

/// Parse command-line arguments into Args.
pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_subcommand() {
        let args = Args::try_parse_from([
            "storage-ops",
            "copy",
            "a.txt",
            "out",
            "--overwrite",
            "--progress",
            "--log-level",
            "quiet",
        ])
        .unwrap();
        assert!(args.progress);
        assert_eq!(args.log_level.as_deref(), Some("quiet"));
        match args.command {
            Command::Copy { src, dest_dir, overwrite } => {
                assert_eq!(src, PathBuf::from("a.txt"));
                assert_eq!(dest_dir, PathBuf::from("out"));
                assert!(overwrite);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn write_requires_from() {
        assert!(Args::try_parse_from(["storage-ops", "write", "t.bin"]).is_err());
        let args = Args::try_parse_from(["storage-ops", "write", "t.bin", "--from", "s.bin"]).unwrap();
        assert_eq!(args.command.name(), "write");
    }
}
