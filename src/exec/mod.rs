// src/exec/mod.rs

//! Script execution pipeline.
//!
//! - [`language`] classifies a script as shell or interpreted.
//! - [`launcher`] materializes the script to a temp file and spawns it.
//! - [`demux`] turns raw pipe reads into ordered, classified lines and
//!   splits free-text output from the trailing structured payload.
//! - [`assembler`] parses the payload and reports the exit status once the
//!   process is gone.
//! - [`cache`] is the single-slot store of the latest structured result.
//! - [`broadcaster`] delivers events to the consumer in order.
//! - [`wire`] renders events as text frames.
//! - [`coordinator`] owns the lifecycle: spawn, drain, finalize, cancel and
//!   cleanup.

pub mod assembler;
pub mod broadcaster;
pub mod cache;
pub mod coordinator;
pub mod demux;
pub mod language;
pub mod launcher;
pub mod wire;

pub use assembler::{ProcessExit, ResultAssembler};
pub use broadcaster::EventBroadcaster;
pub use cache::ResultCache;
pub use coordinator::{ExecutionManager, ExecutionStream};
pub use demux::{DemuxState, LineSplitter, StreamDemultiplexer, StreamSource};
pub use language::{Interpreter, ScriptLanguage, classify};
pub use launcher::{LaunchPlan, ProcessLauncher};
pub use wire::render_frame;
