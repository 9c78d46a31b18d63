// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only failures that abort an execution *before* a process is spawned, or
//! that concern the management surface (config, cancel), are represented
//! here. Non-zero exits, malformed payloads and disconnects are reported as
//! `error`/`done` events on the execution stream instead.

use thiserror::Error;

use crate::types::ExecutionId;

#[derive(Error, Debug)]
pub enum ScriptRunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Failed to launch script: {0}")]
    LaunchError(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ScriptRunError>;
