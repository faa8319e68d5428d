//! XML configuration support.
//! - Loads settings from config.xml (quick_xml).
//! - Writes a commented template on request.
//!
//! Notes:
//! - Unknown XML fields are rejected so misconfigurations surface early.
//! - Durations are given in milliseconds to keep the file format integer-only.

use anyhow::{Context, Result, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::paths::{default_config_path, path_has_symlink_ancestor};
use super::types::{Durability, EngineConfig, LogLevel, ProbeTimeoutPolicy};
use super::CONFIG_ENV_VAR;
use crate::platform::{set_dir_mode_0700, write_new_file_0600};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    probe_timeout_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    probe_interval_ms: Option<u64>,
    on_probe_timeout: Option<String>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    metadata_ttl_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    max_concurrent_copies: Option<u64>,
    durability: Option<String>,
    preserve_metadata: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
}

// Custom deserializer that trims surrounding whitespace for optional u64
fn de_u64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| s.trim().parse::<u64>().ok()))
}

// Map XmlConfig -> EngineConfig; unset fields keep their defaults.
fn xml_to_config(parsed: XmlConfig) -> Result<EngineConfig> {
    let mut cfg = EngineConfig::default();

    if let Some(ms) = parsed.probe_timeout_ms {
        cfg.probe_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parsed.probe_interval_ms {
        cfg.probe_interval = Duration::from_millis(ms);
    }
    if let Some(s) = parsed.on_probe_timeout.as_deref() {
        cfg.on_probe_timeout = s.parse::<ProbeTimeoutPolicy>().map_err(anyhow::Error::msg)?;
    }
    if let Some(ms) = parsed.metadata_ttl_ms {
        cfg.metadata_ttl = Duration::from_millis(ms);
    }
    // 0 means "unbounded", matching the absence of the tag.
    cfg.max_concurrent_copies = parsed
        .max_concurrent_copies
        .filter(|n| *n > 0)
        .map(|n| n as usize);
    if let Some(s) = parsed.durability.as_deref() {
        cfg.durability = match s.trim().to_ascii_lowercase().as_str() {
            "data" => Durability::Data,
            "full" => Durability::Full,
            other => bail!("invalid durability: '{other}' (expected data | full)"),
        };
    }
    cfg.preserve_metadata = parsed.preserve_metadata.unwrap_or(false);
    if let Some(s) = parsed.log_level.as_deref() {
        if let Some(level) = LogLevel::parse(s.trim()) {
            cfg.log_level = level;
        }
    }
    if let Some(s) = parsed.log_file.as_deref() {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            cfg.log_file = Some(PathBuf::from(trimmed));
        }
    }

    Ok(cfg)
}

/// Load an EngineConfig from a specific XML file path (quick_xml).
pub fn load_config_from_xml_path(path: &Path) -> Result<EngineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    let cfg = xml_to_config(parsed)
        .with_context(|| format!("interpret config xml '{}'", path.display()))?;
    cfg.validate()?;
    debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}

/// Load the config from `$STORAGE_OPS_CONFIG` or the default location.
///
/// - Env var set: the file must exist and parse.
/// - Default location: Ok(None) when the file is missing.
pub fn load_config() -> Result<Option<EngineConfig>> {
    let env_set = env::var_os(CONFIG_ENV_VAR).is_some();
    let Some(path) = default_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        if env_set {
            bail!("{} points to a missing file: {}", CONFIG_ENV_VAR, path.display());
        }
        return Ok(None);
    }
    load_config_from_xml_path(&path).map(Some)
}

/// Create a commented template config (and its parent directory).
/// Refuses to write through symlinked ancestors or over an existing file.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = set_dir_mode_0700(parent);
    }

    let defaults = EngineConfig::default();
    let content = format!(
        "<!--\n  storage_ops configuration (XML)\n\n    probe_timeout_ms       -> how long to wait for exclusive access before giving up\n    probe_interval_ms      -> delay between availability checks\n    on_probe_timeout       -> proceed | abort\n    metadata_ttl_ms        -> how long cached metadata stays valid\n    max_concurrent_copies  -> per-file fan-out ceiling for directory copies (0 = unbounded)\n    durability             -> data | full\n    preserve_metadata      -> copy timestamps and permissions (true/false)\n    log_level              -> quiet | normal | info | debug\n    log_file               -> optional log file path\n-->\n<config>\n  <probe_timeout_ms>{}</probe_timeout_ms>\n  <probe_interval_ms>{}</probe_interval_ms>\n  <on_probe_timeout>proceed</on_probe_timeout>\n  <metadata_ttl_ms>{}</metadata_ttl_ms>\n  <max_concurrent_copies>0</max_concurrent_copies>\n  <durability>full</durability>\n  <preserve_metadata>false</preserve_metadata>\n  <log_level>normal</log_level>\n</config>\n",
        defaults.probe_timeout.as_millis(),
        defaults.probe_interval.as_millis(),
        defaults.metadata_ttl.as_millis(),
    );

    write_new_file_0600(path, content.as_bytes())
        .with_context(|| format!("write template config '{}'", path.display()))?;

    info!("Created template config at {}", path.display());
    Ok(())
}
