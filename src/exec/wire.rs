// src/exec/wire.rs

//! Text framing of events for push-stream transports.
//!
//! Each event renders as `event: <kind>\ndata: <text>\n\n`, with literal
//! newlines in `<text>` written as the two characters `\n`.

use crate::types::OutputEvent;

pub fn render_frame(event: &OutputEvent) -> String {
    format!(
        "event: {}\ndata: {}\n\n",
        event.kind.as_str(),
        escape_newlines(&event.text)
    )
}

pub fn escape_newlines(text: &str) -> String {
    text.replace('\n', "\\n")
}
