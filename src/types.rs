// src/types.rs

//! Data model shared by the catalog, the execution pipeline and the CLI.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Identifier of one execution, used to route cancellation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| format!("invalid execution id '{s}': {e}"))
    }
}

/// A request to run one catalog script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub script_name: String,
    pub argument_string: Option<String>,
    pub working_directory: Option<PathBuf>,
}

impl ExecutionRequest {
    pub fn new(script_name: impl Into<String>) -> Self {
        Self {
            script_name: script_name.into(),
            argument_string: None,
            working_directory: None,
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.argument_string = Some(args.into());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// Classification of an event pushed to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Output,
    Error,
    Done,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Output => "output",
            EventKind::Error => "error",
            EventKind::Done => "done",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event of an execution stream. `sequence` starts at 0 and increases by
/// one per event within a single execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputEvent {
    pub kind: EventKind,
    pub text: String,
    pub sequence: u64,
}

impl OutputEvent {
    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::Done
    }
}

/// The most recent successfully parsed structured result.
///
/// At most one of these exists per [`crate::exec::ExecutionManager`]; see
/// [`crate::exec::ResultCache`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub source_script_name: String,
    /// Free-text stdout emitted before the marker.
    pub raw_text: String,
    pub structured_payload: Option<serde_json::Value>,
    pub argument_string: String,
    pub timestamp: DateTime<Utc>,
}

/// Bookkeeping for a live process, tracked from spawn until finalize/cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningProcessHandle {
    pub execution_id: ExecutionId,
    pub script_name: String,
    pub os_process_id: u32,
    /// Materialized script file; removed when the execution ends.
    pub script_path: PathBuf,
    pub spawned_at: DateTime<Utc>,
}
