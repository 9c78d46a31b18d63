// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated model.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file and validate it.
///
/// This is the entry point the rest of the application uses:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks exec limits and script definitions.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `SCRIPTRUN_CONFIG` if set, otherwise `Scriptrun.toml` in the current
/// working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("SCRIPTRUN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Scriptrun.toml"))
}
