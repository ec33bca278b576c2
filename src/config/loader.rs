// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a job file from a given path and return the raw `RawConfigFile`.
///
/// This performs TOML deserialization and resolves relative paths against
/// the file's directory; it does **not** validate. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), jobs = config.jobs.len(), "job file parsed");

    Ok(config.resolve_relative_to(&config_base_dir(path)))
}

/// Load a job file from path and validate it.
///
/// Checks for:
/// - zero poll / idle intervals,
/// - jobs with an empty input,
/// - jobs whose output is their own input,
/// - two jobs writing the same output.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Orcaq.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Orcaq.toml")
}

/// Directory that relative paths in `config_path` are resolved against.
///
/// A bare filename like `Orcaq.toml` (parent = "") resolves against the
/// current working directory.
fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
