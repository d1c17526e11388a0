//! Custom assertions for integration tests

use std::path::Path;
use std::time::Duration;
use swift_output::Event;
use tokio::sync::broadcast;

/// Assert that the staging directory holds exactly `expected` files
pub fn assert_staged_files(dir: &Path, expected: usize) {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", dir.display()))
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    assert_eq!(
        entries.len(),
        expected,
        "expected {expected} staged files in {}, found {entries:?}",
        dir.display()
    );
}

/// Collect all events until timeout or predicate is satisfied
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    stop_predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut collected = Vec::new();

    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let should_stop = stop_predicate(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;

    collected
}

/// Number of events matching `predicate`
pub fn count_events<F>(events: &[Event], predicate: F) -> usize
where
    F: Fn(&Event) -> bool,
{
    events.iter().filter(|e| predicate(e)).count()
}
