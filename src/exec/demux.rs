// src/exec/demux.rs

//! Byte chunks in, classified logical lines out.
//!
//! [`StreamDemultiplexer`] is a synchronous state machine; the async driver
//! in [`crate::exec::coordinator`] feeds it whatever each pipe read returned.
//! Lines are reassembled per stream before anything is inspected, so the
//! produced lines (and marker detection) do not depend on where chunk
//! boundaries fall.

use crate::types::EventKind;

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// Splits a byte stream into `\n`-terminated lines, holding back the
/// unterminated tail until more bytes (or end of input) arrive.
#[derive(Debug, Default, Clone)]
pub struct LineSplitter {
    remainder: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line completed by it, terminator
    /// included.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.remainder.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.remainder[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset + 1;
            lines.push(String::from_utf8_lossy(&self.remainder[start..end]).into_owned());
            start = end;
        }
        self.remainder.drain(..start);
        lines
    }

    /// The pending unterminated fragment, if any.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.remainder.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.remainder);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub fn has_remainder(&self) -> bool {
        !self.remainder.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxState {
    Streaming,
    PayloadAccumulating,
}

/// A line that should be pushed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxEvent {
    pub kind: EventKind,
    pub text: String,
}

impl DemuxEvent {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Output,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            text: text.into(),
        }
    }
}

/// What the demultiplexer accumulated over a whole execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxOutcome {
    /// Stdout text emitted as `output` events.
    pub raw_text: String,
    /// Payload source text; `None` if the marker never appeared.
    pub payload: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamDemultiplexer {
    marker: String,
    state: DemuxState,
    stdout: LineSplitter,
    stderr: LineSplitter,
    raw_text: String,
    payload: String,
}

impl StreamDemultiplexer {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            state: DemuxState::Streaming,
            stdout: LineSplitter::new(),
            stderr: LineSplitter::new(),
            raw_text: String::new(),
            payload: String::new(),
        }
    }

    pub fn state(&self) -> DemuxState {
        self.state
    }

    /// Feed one read's worth of bytes from `source`.
    pub fn feed(&mut self, source: StreamSource, chunk: &[u8]) -> Vec<DemuxEvent> {
        match source {
            StreamSource::Stdout => {
                let lines = self.stdout.push(chunk);
                lines
                    .into_iter()
                    .filter_map(|line| self.route_stdout(line))
                    .collect()
            }
            StreamSource::Stderr => self
                .stderr
                .push(chunk)
                .into_iter()
                .map(DemuxEvent::error)
                .collect(),
        }
    }

    /// Flush the unterminated tails once both pipes are exhausted: stdout
    /// first, then stderr.
    pub fn finish(&mut self) -> Vec<DemuxEvent> {
        let mut events = Vec::new();
        if let Some(rest) = self.stdout.take_remainder() {
            events.extend(self.route_stdout(rest));
        }
        if let Some(rest) = self.stderr.take_remainder() {
            events.push(DemuxEvent::error(rest));
        }
        events
    }

    pub fn into_outcome(self) -> DemuxOutcome {
        let payload = match self.state {
            DemuxState::Streaming => None,
            DemuxState::PayloadAccumulating => Some(self.payload),
        };
        DemuxOutcome {
            raw_text: self.raw_text,
            payload,
        }
    }

    fn route_stdout(&mut self, line: String) -> Option<DemuxEvent> {
        match self.state {
            DemuxState::Streaming => match line.find(&self.marker) {
                Some(idx) => {
                    self.state = DemuxState::PayloadAccumulating;
                    self.payload.push_str(&line[idx + self.marker.len()..]);
                    None
                }
                None => {
                    self.raw_text.push_str(&line);
                    Some(DemuxEvent::output(line))
                }
            },
            DemuxState::PayloadAccumulating => {
                self.payload.push_str(&line);
                None
            }
        }
    }
}
