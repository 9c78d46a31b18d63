#![allow(dead_code)]

pub use scriptrun_test_utils::builders::{ConfigFileBuilder, ScriptConfigBuilder};
pub use scriptrun_test_utils::{init_tracing, with_timeout};

use scriptrun::exec::ExecutionManager;
use scriptrun::types::{EventKind, ExecutionRequest, OutputEvent};

/// Run `request` and collect every event up to and including `done`.
pub async fn run_to_end(
    manager: &ExecutionManager,
    request: ExecutionRequest,
) -> Vec<OutputEvent> {
    with_timeout(manager.run(request).collect()).await
}

/// `(kind, text)` pairs, dropping sequence numbers.
pub fn kinds_and_texts(events: &[OutputEvent]) -> Vec<(EventKind, String)> {
    events.iter().map(|e| (e.kind, e.text.clone())).collect()
}

pub fn texts_of(events: &[OutputEvent], kind: EventKind) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.text.clone())
        .collect()
}

/// Exactly one `done`, and it is the last event.
pub fn assert_terminated_once(events: &[OutputEvent]) {
    let done_count = events.iter().filter(|e| e.kind == EventKind::Done).count();
    assert_eq!(done_count, 1, "expected exactly one done event, got {:?}", events);
    assert_eq!(
        events.last().map(|e| e.kind),
        Some(EventKind::Done),
        "done must be the last event: {:?}",
        events
    );
}

/// Manager whose temp script files land in `dir`.
pub fn manager_in(dir: &std::path::Path, builder: ConfigFileBuilder) -> ExecutionManager {
    init_tracing();
    ExecutionManager::from_config(&builder.temp_dir(dir).build())
}

/// Number of entries left in `dir`.
pub fn leftover_files(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
}
