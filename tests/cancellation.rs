// tests/cancellation.rs

mod common;

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use common::{
    ConfigFileBuilder, ScriptConfigBuilder, assert_terminated_once, leftover_files, manager_in,
    with_timeout,
};
use scriptrun::errors::ScriptRunError;
use scriptrun::exec::broadcaster::DONE_CANCELLED;
use scriptrun::types::{EventKind, ExecutionId, ExecutionRequest};

type TestResult = Result<(), Box<dyn Error>>;

/// Poll `cond` every 20ms until it holds (bounded by `with_timeout`).
async fn eventually(mut cond: impl FnMut() -> bool) {
    with_timeout(async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
}

#[tokio::test]
async fn cancel_stops_process_and_cleans_up() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager_in(
        dir.path(),
        ConfigFileBuilder::new().with_script(
            "sleeper",
            ScriptConfigBuilder::new("echo started\nsleep 30\necho never").build(),
        ),
    );

    let mut stream = manager.run(ExecutionRequest::new("sleeper"));
    let id = stream.id();

    let first = with_timeout(stream.next()).await.expect("first event");
    assert_eq!(first.kind, EventKind::Output);
    assert_eq!(first.text, "started\n");

    let running = manager.running();
    assert_eq!(running.len(), 1);
    let handle = running[0].clone();
    assert_eq!(handle.execution_id, id);
    assert_eq!(handle.script_name, "sleeper");
    assert!(handle.script_path.exists());

    manager.cancel(&id)?;
    assert!(manager.running().is_empty());

    let rest = with_timeout(stream.collect()).await;
    assert_terminated_once(&rest);
    let done = rest.last().unwrap();
    assert_eq!(done.text, DONE_CANCELLED);
    assert!(rest.iter().all(|e| e.text != "never\n"));

    assert!(!handle.script_path.exists());
    assert_eq!(leftover_files(dir.path()), 0);
    Ok(())
}

#[tokio::test]
async fn cancelling_unknown_or_finished_execution_is_not_found() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager_in(
        dir.path(),
        ConfigFileBuilder::new().with_script("quick", ScriptConfigBuilder::new("true").build()),
    );

    let unknown = ExecutionId::new();
    assert!(matches!(
        manager.cancel(&unknown),
        Err(ScriptRunError::ExecutionNotFound(id)) if id == unknown
    ));

    let stream = manager.run(ExecutionRequest::new("quick"));
    let id = stream.id();
    with_timeout(stream.collect()).await;
    assert!(matches!(
        manager.cancel(&id),
        Err(ScriptRunError::ExecutionNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn dropping_the_stream_terminates_the_process() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager_in(
        dir.path(),
        ConfigFileBuilder::new().with_script(
            "sleeper",
            ScriptConfigBuilder::new("echo started\nsleep 30").build(),
        ),
    );

    let mut stream = manager.run(ExecutionRequest::new("sleeper"));
    with_timeout(stream.next()).await.expect("first event");
    assert_eq!(manager.running().len(), 1);

    drop(stream);

    eventually(|| manager.running().is_empty() && leftover_files(dir.path()) == 0).await;
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn sigterm_ignoring_script_is_killed_after_grace() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager_in(
        dir.path(),
        ConfigFileBuilder::new().kill_grace_ms(200).with_script(
            "stubborn",
            ScriptConfigBuilder::new("trap '' TERM\necho ready\nwhile true; do sleep 0.1; done")
                .build(),
        ),
    );

    let mut stream = manager.run(ExecutionRequest::new("stubborn"));
    let first = with_timeout(stream.next()).await.expect("first event");
    assert_eq!(first.text, "ready\n");

    manager.cancel(&stream.id())?;
    let rest = with_timeout(stream.collect()).await;

    assert_terminated_once(&rest);
    assert_eq!(rest.last().unwrap().text, DONE_CANCELLED);
    assert_eq!(leftover_files(dir.path()), 0);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn cancel_reaches_background_children() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager_in(
        dir.path(),
        ConfigFileBuilder::new().with_script(
            "spawner",
            ScriptConfigBuilder::new("sleep 30 &\necho $!\nwait").build(),
        ),
    );

    let mut stream = manager.run(ExecutionRequest::new("spawner"));
    let first = with_timeout(stream.next()).await.expect("pid line");
    let child_pid: u32 = first.text.trim().parse()?;
    let proc_entry = format!("/proc/{child_pid}");
    assert!(Path::new(&proc_entry).exists());

    manager.cancel(&stream.id())?;
    with_timeout(stream.collect()).await;

    eventually(|| !Path::new(&proc_entry).exists() || is_zombie(child_pid)).await;
    Ok(())
}

/// A killed child that has not been reaped yet still has a `/proc` entry.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .map(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false)
        })
        .unwrap_or(true)
}

#[tokio::test]
async fn cancel_discards_unterminated_output() -> TestResult {
    let dir = tempfile::tempdir()?;
    let manager = manager_in(
        dir.path(),
        ConfigFileBuilder::new().with_script(
            "partial",
            ScriptConfigBuilder::new("echo started\nprintf partial\nsleep 30").build(),
        ),
    );

    let mut stream = manager.run(ExecutionRequest::new("partial"));
    let first = with_timeout(stream.next()).await.expect("first event");
    assert_eq!(first.text, "started\n");

    // Give the fragment time to reach the pipe reader.
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.cancel(&stream.id())?;
    let rest = with_timeout(stream.collect()).await;

    let rest: Vec<(EventKind, String)> = rest.into_iter().map(|e| (e.kind, e.text)).collect();
    assert_eq!(rest, vec![(EventKind::Done, DONE_CANCELLED.to_string())]);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn cancel_terminates_process_while_consumer_is_not_reading() -> TestResult {
    let dir = tempfile::tempdir()?;
    let scratch = tempfile::tempdir()?;
    let pid_file = scratch.path().join("pid");
    let body = format!(
        "echo $$ > {}\nwhile true; do echo tick; sleep 0.01; done",
        pid_file.display()
    );
    let manager = manager_in(
        dir.path(),
        ConfigFileBuilder::new()
            .event_buffer(2)
            .kill_grace_ms(500)
            .with_script("ticker", ScriptConfigBuilder::new(&body).build()),
    );

    let mut stream = manager.run(ExecutionRequest::new("ticker"));
    with_timeout(stream.next()).await.expect("first event");

    // Stop reading long enough for the queue to fill up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let pid: u32 = std::fs::read_to_string(&pid_file)?.trim().parse()?;
    let proc_entry = format!("/proc/{pid}");

    manager.cancel(&stream.id())?;

    let gone = tokio::time::timeout(Duration::from_millis(1500), async {
        while Path::new(&proc_entry).exists() && !is_zombie(pid) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(gone.is_ok(), "script still running after cancel");

    let rest = with_timeout(stream.collect()).await;
    assert_eq!(rest.last().map(|e| e.text.as_str()), Some(DONE_CANCELLED));
    assert_eq!(leftover_files(dir.path()), 0);
    Ok(())
}
