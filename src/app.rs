//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the Ctrl-C handler and runs the
//! requested command through the async handler API on a tokio runtime.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use storage_ops::output as out;
use storage_ops::{
    CancellationToken, DirectoryHandler, EngineConfig, FileHandler, LogLevel, MetadataSnapshot,
    Operation, Progress, StorageContext, StorageError, create_template_config, default_config_path,
    load_config, load_config_from_xml_path, progress_fn,
};
use tracing::{debug, error, info};

use crate::cli::{Args, Command};
use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // init-config runs before logging is set up, like any other first-run message.
    if let Command::InitConfig = args.command {
        return init_config(args.config.as_deref());
    }

    let cfg = build_config(&args)?;

    // Initialize logging and keep the guard so the Ctrl-C handler can flush it.
    let guard_opt = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {}", e));
        e
    })?;
    let guard_slot = Arc::new(Mutex::new(guard_opt));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            cancel.cancel();
            out::print_warn("Received interrupt; cancelling...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .context("failed to install signal handler")?;
    }

    debug!("Starting storage-ops: {:?}", args);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let ctx = StorageContext::new(cfg);
    let progress = args.progress.then(console_progress);
    let result = runtime.block_on(execute(&args.command, ctx, progress, &cancel));

    if let Err(e) = &result {
        match e.downcast_ref::<StorageError>() {
            Some(se) => error!(code = se.code(), command = args.command.name(), error = %se, "Command failed"),
            None => error!(command = args.command.name(), error = ?e, "Command failed"),
        }
    }

    // Ensure logs are flushed before exit
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }

    result
}

/// Config precedence: --config, then $STORAGE_OPS_CONFIG / default location, then
/// built-in defaults. CLI flags win over all of them.
fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut cfg = match args.config.as_deref() {
        Some(path) => load_config_from_xml_path(path)?,
        None => load_config()?.unwrap_or_default(),
    };

    if let Some(lvl_str) = args.log_level.as_deref() {
        match LogLevel::parse(lvl_str) {
            Some(parsed) => cfg.log_level = parsed,
            None => out::print_warn(&format!("Unknown log level '{lvl_str}'; keeping {}", cfg.log_level)),
        }
    } else if args.debug {
        cfg.log_level = LogLevel::Debug;
    }
    if let Some(lf) = args.log_file.as_ref() {
        cfg.log_file = Some(lf.clone());
    }

    cfg.validate()?;
    Ok(cfg)
}

fn init_config(explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => default_config_path().context("could not determine a default config path")?,
    };
    if path.exists() {
        out::print_info(&format!("A config file already exists at: {}", path.display()));
        return Ok(());
    }
    create_template_config(&path)?;
    out::print_success(&format!("A template storage_ops config was written to: {}", path.display()));
    out::print_info("Edit it to tune probe timing, durability and logging. To use a different location set STORAGE_OPS_CONFIG.");
    Ok(())
}

fn console_progress() -> Progress {
    progress_fn(|r| out::print_progress(r.transferred_bytes, r.total_bytes, r.bytes_per_second))
}

/// The two handler kinds behind one command surface.
enum Entity {
    File(FileHandler),
    Dir(DirectoryHandler),
}

impl Entity {
    /// Attach to an existing path; the handlers would otherwise create a missing entity.
    fn existing(path: &Path, ctx: StorageContext) -> Result<Self, StorageError> {
        match fs::symlink_metadata(path) {
            Ok(m) if m.is_dir() => Ok(Entity::Dir(DirectoryHandler::with_context(path, ctx)?)),
            Ok(_) => Ok(Entity::File(FileHandler::with_context(path, ctx)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(path.to_path_buf())),
            Err(e) => Err(e.into()),
        }
    }
}

async fn execute(
    command: &Command,
    ctx: StorageContext,
    progress: Option<Progress>,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Command::Copy { src, dest_dir, overwrite } => {
            let snap = match Entity::existing(src, ctx)? {
                Entity::File(f) => f.copy_async(dest_dir, *overwrite, progress, cancel).await?,
                Entity::Dir(d) => d.copy_async(dest_dir, *overwrite, progress, cancel).await?,
            };
            report("Copied", src, &snap);
        }
        Command::Move { src, dest_dir, overwrite } => {
            let snap = match Entity::existing(src, ctx)? {
                Entity::File(f) => f.move_async(dest_dir, *overwrite, progress, cancel).await?,
                Entity::Dir(d) => d.move_async(dest_dir, *overwrite, progress, cancel).await?,
            };
            report("Moved", src, &snap);
        }
        Command::Rename { src, new_name } => {
            let snap = match Entity::existing(src, ctx)? {
                Entity::File(f) => f.rename_async(new_name, cancel).await?,
                Entity::Dir(d) => d.rename_async(new_name, cancel).await?,
            };
            report("Renamed", src, &snap);
        }
        Command::Delete { path } => match Entity::existing(path, ctx) {
            Ok(Entity::File(f)) => f.delete_async(cancel).await?,
            Ok(Entity::Dir(d)) => d.delete_async(cancel).await?,
            Err(StorageError::NotFound(p)) => {
                info!(path = %p.display(), "Nothing to delete");
            }
            Err(e) => return Err(e.into()),
        },
        Command::Write { target, from, overwrite } => {
            let reader = open_source(from).await?;
            let handler = FileHandler::with_context(target, ctx)?;
            let snap = handler.write_async(reader, *overwrite, progress, cancel).await?;
            out::print_user(&format!("{} ({})", snap.path.display(), out::human_bytes(snap.size)));
        }
        // Handled in run() before the runtime starts.
        Command::InitConfig => {}
    }
    Ok(())
}

async fn open_source(path: &Path) -> Result<tokio::fs::File, StorageError> {
    match tokio::fs::File::open(path).await {
        Ok(f) => Ok(f),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(path.to_path_buf())),
        Err(e) => Err(StorageError::operation_failed(Operation::Write, path, None, e)),
    }
}

fn report(verb: &str, src: &Path, snap: &MetadataSnapshot) {
    info!(source = %src.display(), dest = %snap.path.display(), "{verb}");
    out::print_user(&snap.path.display().to_string());
}
