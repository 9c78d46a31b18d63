// src/exec/coordinator.rs

//! End-to-end lifecycle of one execution.
//!
//! [`ExecutionManager::run`] returns immediately with an [`ExecutionStream`];
//! the work happens in a spawned Tokio task:
//!
//! - look the script up (unknown → `error` + `done`),
//! - launch it (failure → `error` + `done`),
//! - register a [`RunningProcessHandle`] so it can be cancelled,
//! - drain both pipes through the [`StreamDemultiplexer`] until EOF, racing
//!   against cancellation and consumer disconnect,
//! - finalize with the [`ResultAssembler`], remove the temp file,
//!   deregister and emit `done`.
//!
//! The driver runs in its own task and is awaited through its `JoinHandle`,
//! so even a panic inside it still ends the stream with `error` + `done`.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::catalog::{InMemoryCatalog, ScriptCatalog};
use crate::config::{ConfigFile, ExecSection};
use crate::errors::{Result, ScriptRunError};
use crate::exec::assembler::{ProcessExit, ResultAssembler};
use crate::exec::broadcaster::{DONE_CANCELLED, DONE_COMPLETED, Disconnected, EventBroadcaster};
use crate::exec::cache::ResultCache;
use crate::exec::demux::{DemuxEvent, StreamDemultiplexer, StreamSource};
use crate::exec::launcher::{LaunchPlan, LaunchedProcess, ProcessLauncher};
use crate::types::{
    EventKind, ExecutionId, ExecutionRequest, ExecutionResult, OutputEvent, RunningProcessHandle,
};

/// Consumer side of one execution.
///
/// Dropping the stream before `done` counts as a disconnect and cancels the
/// execution.
#[derive(Debug)]
pub struct ExecutionStream {
    id: ExecutionId,
    rx: mpsc::Receiver<OutputEvent>,
}

impl ExecutionStream {
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Next event, or `None` after the terminal event has been received.
    pub async fn next(&mut self) -> Option<OutputEvent> {
        self.rx.recv().await
    }

    /// Drain the whole stream.
    pub async fn collect(mut self) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

/// Owns the registry of running processes and the single-slot result cache.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ExecutionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    catalog: Arc<dyn ScriptCatalog>,
    launcher: ProcessLauncher,
    exec: ExecSection,
    cache: ResultCache,
    registry: Mutex<HashMap<ExecutionId, TrackedExecution>>,
}

struct TrackedExecution {
    handle: RunningProcessHandle,
    cancel: Option<oneshot::Sender<()>>,
}

impl fmt::Debug for ExecutionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionManager")
            .field("catalog", &self.inner.catalog)
            .field("running", &self.inner.registry().len())
            .finish_non_exhaustive()
    }
}

/// How an execution ended, from the coordinator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelCause {
    Requested,
    Disconnected,
}

enum DrainEnd {
    Exited(ProcessExit),
    Cancelled(CancelCause),
    Failed(io::Error),
}

enum PumpStep {
    Cancel,
    CancelChannelClosed,
    Disconnected,
    Read(StreamSource, io::Result<usize>),
}

impl ExecutionManager {
    pub fn new(catalog: Arc<dyn ScriptCatalog>, exec: ExecSection) -> Self {
        Self::with_cache(catalog, exec, ResultCache::new())
    }

    /// Use an existing cache, e.g. one shared with another manager.
    pub fn with_cache(
        catalog: Arc<dyn ScriptCatalog>,
        exec: ExecSection,
        cache: ResultCache,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                catalog,
                launcher: ProcessLauncher::new(exec.clone()),
                exec,
                cache,
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Manager over an [`InMemoryCatalog`] seeded from `cfg`.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(Arc::new(InMemoryCatalog::from_config(cfg)), cfg.exec.clone())
    }

    pub fn catalog(&self) -> &Arc<dyn ScriptCatalog> {
        &self.inner.catalog
    }

    /// Start an execution. Must be called from within a Tokio runtime.
    ///
    /// The returned stream always ends with exactly one `done` event.
    pub fn run(&self, request: ExecutionRequest) -> ExecutionStream {
        let id = ExecutionId::new();
        let (events, rx) = EventBroadcaster::channel(self.inner.exec.event_buffer);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(supervise(inner, id, request, events));

        ExecutionStream { id, rx }
    }

    /// Request cancellation of a tracked execution.
    pub fn cancel(&self, id: &ExecutionId) -> Result<()> {
        let tracked = self.inner.registry().remove(id);
        match tracked {
            Some(mut tracked) => {
                info!(
                    execution_id = %id,
                    pid = tracked.handle.os_process_id,
                    "cancellation requested"
                );
                if let Some(tx) = tracked.cancel.take() {
                    // The driver may have just finished; that's fine.
                    let _ = tx.send(());
                }
                Ok(())
            }
            None => Err(ScriptRunError::ExecutionNotFound(*id)),
        }
    }

    /// Snapshot of currently tracked executions.
    pub fn running(&self) -> Vec<RunningProcessHandle> {
        self.inner
            .registry()
            .values()
            .map(|t| t.handle.clone())
            .collect()
    }

    pub fn last_result(&self) -> Option<ExecutionResult> {
        self.inner.cache.current()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    /// Compute what `run` would launch, without writing or spawning anything.
    pub fn plan(&self, request: &ExecutionRequest) -> Result<LaunchPlan> {
        let script = self
            .inner
            .catalog
            .get_by_name(&request.script_name)
            .ok_or_else(|| ScriptRunError::ScriptNotFound(request.script_name.trim().to_string()))?;
        let reference = self.inner.reference_for(script.accepts_reference);
        self.inner.launcher.plan(&script, request, reference.as_ref())
    }
}

impl ManagerInner {
    fn registry(&self) -> MutexGuard<'_, HashMap<ExecutionId, TrackedExecution>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reference_for(&self, accepts_reference: bool) -> Option<serde_json::Value> {
        if accepts_reference {
            self.cache.payload()
        } else {
            None
        }
    }
}

/// Removes the registry entry when the driver is done with the process,
/// whichever way it leaves.
struct Registration {
    inner: Arc<ManagerInner>,
    id: ExecutionId,
}

impl Registration {
    fn new(
        inner: Arc<ManagerInner>,
        handle: RunningProcessHandle,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        let id = handle.execution_id;
        inner.registry().insert(
            id,
            TrackedExecution {
                handle,
                cancel: Some(cancel),
            },
        );
        Self { inner, id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.inner.registry().remove(&self.id).is_some() {
            debug!(execution_id = %self.id, "deregistered execution");
        }
    }
}

async fn supervise(
    inner: Arc<ManagerInner>,
    id: ExecutionId,
    request: ExecutionRequest,
    events: EventBroadcaster,
) {
    let worker = tokio::spawn(drive(inner, id, request, events.clone()));

    let termination = match worker.await {
        Ok(termination) => termination,
        Err(join_err) => {
            error!(execution_id = %id, error = %join_err, "execution driver failed");
            let _ = events
                .emit(EventKind::Error, format!("Error: {join_err}"))
                .await;
            Termination::Completed
        }
    };

    let text = match termination {
        Termination::Completed => DONE_COMPLETED,
        Termination::Cancelled => DONE_CANCELLED,
    };
    if events.finish(text).await.is_err() {
        debug!(execution_id = %id, "consumer gone before terminal event");
    }
}

async fn drive(
    inner: Arc<ManagerInner>,
    id: ExecutionId,
    request: ExecutionRequest,
    events: EventBroadcaster,
) -> Termination {
    let name = request.script_name.trim().to_string();
    info!(execution_id = %id, script = %name, "execution requested");

    let Some(script) = inner.catalog.get_by_name(&name) else {
        let err = ScriptRunError::ScriptNotFound(name);
        warn!(execution_id = %id, error = %err, "rejecting execution");
        let _ = events.emit(EventKind::Error, err.to_string()).await;
        return Termination::Completed;
    };

    if let Err(e) = inner.catalog.record_argument_usage(
        &script.name,
        request.argument_string.as_deref().unwrap_or_default(),
        request.working_directory.as_deref(),
    ) {
        debug!(execution_id = %id, error = %e, "failed to record argument usage; ignoring");
    }

    let reference = inner.reference_for(script.accepts_reference);
    let launched = match inner.launcher.launch(&script, &request, reference.as_ref()) {
        Ok(launched) => launched,
        Err(err) => {
            warn!(execution_id = %id, script = %script.name, error = %err, "launch failed");
            let _ = events.emit(EventKind::Error, err.to_string()).await;
            return Termination::Completed;
        }
    };

    let LaunchedProcess {
        mut child,
        script_file,
        argv,
    } = launched;
    let pid = child.id();
    debug!(execution_id = %id, ?argv, "process started");

    let (cancel_tx, cancel_rx) = oneshot::channel();
    let registration = Registration::new(
        Arc::clone(&inner),
        RunningProcessHandle {
            execution_id: id,
            script_name: script.name.clone(),
            os_process_id: pid.unwrap_or_default(),
            script_path: script_file.to_path_buf(),
            spawned_at: Utc::now(),
        },
        cancel_tx,
    );

    let mut demux = StreamDemultiplexer::new(inner.exec.marker.clone());
    let end = drain(&mut child, &mut demux, &events, cancel_rx, inner.exec.read_chunk_size).await;

    let termination = match end {
        DrainEnd::Exited(exit) => {
            info!(execution_id = %id, script = %script.name, ?exit, "script process exited");
            let mut tail = demux.finish();
            let assembler =
                ResultAssembler::new(script.name.clone(), request.argument_string.as_deref());
            tail.extend(assembler.finalize(demux.into_outcome(), exit, &inner.cache));

            match emit_all(&events, tail).await {
                Ok(()) => Termination::Completed,
                Err(Disconnected) => Termination::Cancelled,
            }
        }
        DrainEnd::Cancelled(cause) => {
            info!(execution_id = %id, ?cause, "cancelling script process");
            terminate_process_group(&mut child, pid, inner.exec.kill_grace()).await;
            Termination::Cancelled
        }
        DrainEnd::Failed(err) => {
            error!(execution_id = %id, error = %err, "error while streaming script output");
            terminate_process_group(&mut child, pid, inner.exec.kill_grace()).await;
            let _ = events.emit(EventKind::Error, format!("Error: {err}")).await;
            Termination::Completed
        }
    };

    drop(registration);
    if let Err(e) = script_file.close() {
        warn!(execution_id = %id, error = %e, "failed to remove script file");
    }

    termination
}

/// Pump both pipes through `demux` until both hit EOF and the process has
/// exited, or until cancellation/disconnect/read failure.
async fn drain(
    child: &mut Child,
    demux: &mut StreamDemultiplexer,
    events: &EventBroadcaster,
    mut cancel_rx: oneshot::Receiver<()>,
    chunk_size: usize,
) -> DrainEnd {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_buf = vec![0u8; chunk_size.max(1)];
    let mut err_buf = vec![0u8; chunk_size.max(1)];
    let mut cancel_open = true;

    while stdout.is_some() || stderr.is_some() {
        let step = tokio::select! {
            biased;
            res = &mut cancel_rx, if cancel_open => match res {
                Ok(()) => PumpStep::Cancel,
                Err(_) => PumpStep::CancelChannelClosed,
            },
            _ = events.disconnected() => PumpStep::Disconnected,
            res = read_chunk(&mut stdout, &mut out_buf) => {
                PumpStep::Read(StreamSource::Stdout, res)
            }
            res = read_chunk(&mut stderr, &mut err_buf) => {
                PumpStep::Read(StreamSource::Stderr, res)
            }
        };

        match step {
            PumpStep::Cancel => return DrainEnd::Cancelled(CancelCause::Requested),
            PumpStep::CancelChannelClosed => cancel_open = false,
            PumpStep::Disconnected => return DrainEnd::Cancelled(CancelCause::Disconnected),
            PumpStep::Read(source, Ok(0)) => {
                debug!(?source, "pipe reached end of input");
                match source {
                    StreamSource::Stdout => stdout = None,
                    StreamSource::Stderr => stderr = None,
                }
            }
            PumpStep::Read(source, Ok(n)) => {
                let buf = match source {
                    StreamSource::Stdout => &out_buf[..n],
                    StreamSource::Stderr => &err_buf[..n],
                };
                let produced = demux.feed(source, buf);
                let stopped = deliver(events, produced, &mut cancel_rx, &mut cancel_open).await;
                if let Some(cause) = stopped {
                    return DrainEnd::Cancelled(cause);
                }
            }
            PumpStep::Read(_, Err(err)) => return DrainEnd::Failed(err),
        }
    }

    loop {
        tokio::select! {
            biased;
            res = &mut cancel_rx, if cancel_open => match res {
                Ok(()) => return DrainEnd::Cancelled(CancelCause::Requested),
                Err(_) => cancel_open = false,
            },
            _ = events.disconnected() => return DrainEnd::Cancelled(CancelCause::Disconnected),
            status = child.wait() => return match status {
                Ok(status) => DrainEnd::Exited(ProcessExit::from(status)),
                Err(err) => DrainEnd::Failed(err),
            },
        }
    }
}

/// Read from `pipe`, or never resolve once it has been closed.
async fn read_chunk<R>(pipe: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Emit `produced` in order while still honouring cancellation, so a consumer
/// that stopped reading cannot hold the process alive on a full queue.
async fn deliver(
    events: &EventBroadcaster,
    produced: Vec<DemuxEvent>,
    cancel_rx: &mut oneshot::Receiver<()>,
    cancel_open: &mut bool,
) -> Option<CancelCause> {
    for event in produced {
        loop {
            tokio::select! {
                biased;
                res = &mut *cancel_rx, if *cancel_open => match res {
                    Ok(()) => return Some(CancelCause::Requested),
                    Err(_) => *cancel_open = false,
                },
                sent = events.emit(event.kind, event.text.clone()) => match sent {
                    Ok(()) => break,
                    Err(Disconnected) => return Some(CancelCause::Disconnected),
                },
            }
        }
    }
    None
}

async fn emit_all(
    events: &EventBroadcaster,
    produced: Vec<DemuxEvent>,
) -> std::result::Result<(), Disconnected> {
    for event in produced {
        events.emit(event.kind, event.text).await?;
    }
    Ok(())
}

/// SIGTERM the whole process group, wait up to `grace`, then SIGKILL.
#[cfg(unix)]
async fn terminate_process_group(child: &mut Child, pid: Option<u32>, grace: Duration) {
    let Some(pgid) = pid else {
        let _ = child.kill().await;
        return;
    };

    if let Err(e) = signal_group(pgid, libc::SIGTERM) {
        debug!(pgid, error = %e, "SIGTERM to process group failed");
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(pgid, ?status, "process exited after SIGTERM");
            // Stragglers in the group that ignored SIGTERM. ESRCH means none are left.
            match signal_group(pgid, libc::SIGKILL) {
                Ok(()) => debug!(pgid, "killed remaining process group members"),
                Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                    trace!(pgid, "process group already empty")
                }
                Err(e) => debug!(pgid, error = %e, "SIGKILL to process group failed"),
            }
        }
        Ok(Err(e)) => {
            warn!(pgid, error = %e, "waiting for terminated process failed");
            let _ = signal_group(pgid, libc::SIGKILL);
        }
        Err(_) => {
            warn!(
                pgid,
                grace_ms = grace.as_millis() as u64,
                "process ignored SIGTERM; sending SIGKILL"
            );
            if let Err(e) = signal_group(pgid, libc::SIGKILL) {
                debug!(pgid, error = %e, "SIGKILL to process group failed");
            }
            if let Err(e) = child.wait().await {
                warn!(pgid, error = %e, "waiting for killed process failed");
            }
        }
    }
}

#[cfg(not(unix))]
async fn terminate_process_group(child: &mut Child, _pid: Option<u32>, grace: Duration) {
    let _ = child.start_kill();
    let _ = tokio::time::timeout(grace, child.wait()).await;
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) -> io::Result<()> {
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
