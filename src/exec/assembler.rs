// src/exec/assembler.rs

//! Post-exit bookkeeping: payload parsing, cache update and exit reporting.

use std::process::ExitStatus;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::exec::cache::ResultCache;
use crate::exec::demux::{DemuxEvent, DemuxOutcome};
use crate::types::ExecutionResult;

pub const INVALID_PAYLOAD_MESSAGE: &str = "invalid payload received";

/// How the script process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Code(i32),
    Signal(i32),
    Unknown,
}

impl ProcessExit {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessExit::Code(0))
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ProcessExit::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ProcessExit::Signal(signal);
            }
        }
        ProcessExit::Unknown
    }
}

/// Finalizes one execution after its process has exited.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    script_name: String,
    argument_string: String,
}

impl ResultAssembler {
    pub fn new(script_name: impl Into<String>, argument_string: Option<&str>) -> Self {
        Self {
            script_name: script_name.into(),
            argument_string: argument_string.unwrap_or_default().to_string(),
        }
    }

    /// Parse the payload (if any), update `cache` on success, and return the
    /// error events to append before the terminal event.
    pub fn finalize(
        &self,
        outcome: DemuxOutcome,
        exit: ProcessExit,
        cache: &ResultCache,
    ) -> Vec<DemuxEvent> {
        let mut events = Vec::new();

        match outcome.payload.as_deref() {
            None => debug!(script = %self.script_name, "no structured payload; cache untouched"),
            Some(text) => match parse_payload(text) {
                Some(value) => {
                    info!(script = %self.script_name, "structured payload parsed; updating cache");
                    cache.replace(ExecutionResult {
                        source_script_name: self.script_name.clone(),
                        raw_text: outcome.raw_text,
                        structured_payload: Some(value),
                        argument_string: self.argument_string.clone(),
                        timestamp: Utc::now(),
                    });
                }
                None => {
                    warn!(script = %self.script_name, "structured payload could not be parsed");
                    events.push(DemuxEvent::error(INVALID_PAYLOAD_MESSAGE));
                }
            },
        }

        match exit {
            ProcessExit::Code(0) => {}
            ProcessExit::Code(code) => {
                events.push(DemuxEvent::error(format!("Process exited with code {code}")));
            }
            ProcessExit::Signal(signal) => {
                events.push(DemuxEvent::error(format!(
                    "Process terminated by signal {signal}"
                )));
            }
            ProcessExit::Unknown => {
                events.push(DemuxEvent::error("Process exited with unknown status"));
            }
        }

        events
    }
}

/// Parse YAML payload text into a JSON value.
///
/// Empty documents and documents that cannot be represented as JSON count as
/// invalid.
pub fn parse_payload(text: &str) -> Option<serde_json::Value> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).ok()?;
    if yaml.is_null() {
        return None;
    }
    serde_json::to_value(&yaml).ok()
}
