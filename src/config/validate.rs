// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, ScriptRunError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ScriptRunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.exec, raw.script))
    }
}

/// Validate an already-built config (e.g. one assembled in code).
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_exec_section(cfg)?;
    validate_scripts(cfg)?;
    Ok(())
}

fn validate_exec_section(cfg: &RawConfigFile) -> Result<()> {
    let exec = &cfg.exec;

    if exec.read_chunk_size == 0 {
        return Err(ScriptRunError::ConfigError(
            "[exec].read_chunk_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if exec.event_buffer == 0 {
        return Err(ScriptRunError::ConfigError(
            "[exec].event_buffer must be >= 1 (got 0)".to_string(),
        ));
    }
    if exec.marker.trim().is_empty() {
        return Err(ScriptRunError::ConfigError(
            "[exec].marker must not be empty".to_string(),
        ));
    }
    if exec.marker.contains('\n') {
        return Err(ScriptRunError::ConfigError(
            "[exec].marker must fit on a single line".to_string(),
        ));
    }
    if exec.reference_flag.trim().is_empty() {
        return Err(ScriptRunError::ConfigError(
            "[exec].reference_flag must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_scripts(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = BTreeSet::new();

    for (name, script) in cfg.script.iter() {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ScriptRunError::ConfigError(
                "script names must not be empty".to_string(),
            ));
        }
        if !seen.insert(trimmed) {
            return Err(ScriptRunError::ConfigError(format!(
                "script '{}' is defined more than once (names are compared after trimming)",
                trimmed
            )));
        }
        if script.body.trim().is_empty() {
            return Err(ScriptRunError::ConfigError(format!(
                "script '{}' has an empty body",
                trimmed
            )));
        }
    }
    Ok(())
}
