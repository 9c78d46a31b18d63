// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Validated configuration. Construct via `ConfigFile::try_from(RawConfigFile)`
/// or [`crate::config::load_and_validate`].
///
/// ```toml
/// [exec]
/// shell = "/bin/bash"
/// read_chunk_size = 1024
///
/// [script."list files"]
/// category = "Files"
/// body = "ls -la"
/// ```
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub exec: ExecSection,
    /// Scripts keyed by their trimmed name.
    pub script: BTreeMap<String, ScriptConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(exec: ExecSection, script: BTreeMap<String, ScriptConfig>) -> Self {
        let script = script
            .into_iter()
            .map(|(name, cfg)| (name.trim().to_string(), cfg))
            .collect();
        Self { exec, script }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            exec: ExecSection::default(),
            script: BTreeMap::new(),
        }
    }
}

/// Configuration exactly as deserialized from TOML, before validation.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub exec: ExecSection,

    #[serde(default)]
    pub script: BTreeMap<String, ScriptConfig>,
}

/// `[exec]` section: how scripts are materialized, launched and drained.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecSection {
    /// Interpreter used for shell scripts; also named in the shebang line.
    #[serde(default = "default_shell")]
    pub shell: PathBuf,

    /// Interpreter used for Python scripts.
    #[serde(default = "default_python")]
    pub python: PathBuf,

    /// Maximum number of bytes taken from a pipe per read.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// How long to wait after SIGTERM before sending SIGKILL to the group.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// Capacity of the per-execution event queue.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Where temporary script files are written. Defaults to the OS temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Flag preceding the hex-encoded reference payload in argv.
    #[serde(default = "default_reference_flag")]
    pub reference_flag: String,

    /// Stdout token that starts the structured payload.
    #[serde(default = "default_marker")]
    pub marker: String,
}

fn default_shell() -> PathBuf {
    PathBuf::from("/bin/bash")
}

fn default_python() -> PathBuf {
    PathBuf::from("/usr/bin/python3")
}

fn default_read_chunk_size() -> usize {
    1024
}

fn default_kill_grace_ms() -> u64 {
    1000
}

fn default_event_buffer() -> usize {
    64
}

fn default_reference_flag() -> String {
    "--reference".to_string()
}

fn default_marker() -> String {
    "--YAML--".to_string()
}

impl Default for ExecSection {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            python: default_python(),
            read_chunk_size: default_read_chunk_size(),
            kill_grace_ms: default_kill_grace_ms(),
            event_buffer: default_event_buffer(),
            temp_dir: None,
            reference_flag: default_reference_flag(),
            marker: default_marker(),
        }
    }
}

impl ExecSection {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn effective_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// `[script.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    pub body: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_category")]
    pub category: String,

    /// Whether the script wants the previous structured result in argv.
    #[serde(default)]
    pub accepts_reference: bool,
}

pub(crate) fn default_category() -> String {
    "Uncategorized".to_string()
}
