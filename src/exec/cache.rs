// src/exec/cache.rs

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::types::ExecutionResult;

/// Single-slot store for the most recent structured result.
///
/// Clones share the same slot. Concurrent writers race with last-write-wins
/// semantics; the slot is only ever replaced, never cleared.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    slot: Arc<RwLock<Option<ExecutionResult>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `result`, returning whatever it displaced.
    pub fn replace(&self, result: ExecutionResult) -> Option<ExecutionResult> {
        debug!(script = %result.source_script_name, "replacing cached execution result");
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(result)
    }

    pub fn current(&self) -> Option<ExecutionResult> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Structured payload of the cached result, if there is one.
    pub fn payload(&self) -> Option<serde_json::Value> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|r| r.structured_payload.clone())
    }
}
