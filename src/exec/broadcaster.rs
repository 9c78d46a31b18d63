// src/exec/broadcaster.rs

//! Ordered event delivery to the single consumer of an execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::trace;

use crate::types::{EventKind, OutputEvent};

pub const DONE_COMPLETED: &str = "Script execution completed";
pub const DONE_CANCELLED: &str = "Script execution cancelled";

/// The consumer went away; nothing further can be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// Producer side of an execution's event queue.
///
/// Clones share the sequence counter and the "done already sent" flag, so
/// handing a clone to a worker task keeps numbering contiguous and still
/// allows only one terminal event overall. Only one clone should be emitting
/// at a time.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: mpsc::Sender<OutputEvent>,
    next_sequence: Arc<AtomicU64>,
    done_sent: Arc<AtomicBool>,
}

impl EventBroadcaster {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutputEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let broadcaster = Self {
            tx,
            next_sequence: Arc::new(AtomicU64::new(0)),
            done_sent: Arc::new(AtomicBool::new(false)),
        };
        (broadcaster, rx)
    }

    /// Push an `output` or `error` event. Waits while the queue is full.
    pub async fn emit(
        &self,
        kind: EventKind,
        text: impl Into<String>,
    ) -> Result<(), Disconnected> {
        debug_assert!(kind != EventKind::Done, "use finish() for the terminal event");
        self.send(kind, text.into()).await
    }

    /// Push the terminal `done` event. Only the first call across all clones
    /// sends anything.
    pub async fn finish(&self, text: &str) -> Result<(), Disconnected> {
        if self.done_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.send(EventKind::Done, text.to_string()).await
    }

    /// Resolves once the consumer has dropped its receiver.
    pub async fn disconnected(&self) {
        self.tx.closed().await
    }

    /// The sequence number is taken only once queue space is reserved, so
    /// dropping a pending send leaves numbering contiguous.
    async fn send(&self, kind: EventKind, text: String) -> Result<(), Disconnected> {
        let permit = self.tx.reserve().await.map_err(|_| Disconnected)?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        trace!(%kind, sequence, "emitting event");
        permit.send(OutputEvent {
            kind,
            text,
            sequence,
        });
        Ok(())
    }
}
