//! Event sinks for the staging and upload pipeline
//!
//! The stager and the uploader never log directly; they emit [`Event`]s into an
//! [`EventSink`] handed to them at construction. [`TracingEvents`] turns events
//! into `tracing` records, a `broadcast::Sender<Event>` forwards them to
//! subscribers, and [`RecordingEvents`] keeps them in memory.

use crate::types::Event;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Receiver of pipeline events
pub trait EventSink: Send + Sync {
    /// Handle one event. Must not block.
    fn emit(&self, event: Event);
}

/// Shared handle to an event sink
pub type SharedEvents = Arc<dyn EventSink>;

/// Format the retry warning the way operators grep for it
pub fn retry_message(retry: u32, limit: u32, wait: Duration, message: &str) -> String {
    format!(
        "put request failed. Retrying {retry}/{limit} after {}s. Message: {message}",
        wait.as_secs()
    )
}

/// Logs every event through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEvents;

impl EventSink for TracingEvents {
    fn emit(&self, event: Event) {
        match event {
            Event::FileOpened { name, path } => {
                tracing::info!(name = %name, path = %path.display(), "Writing local file");
            }
            Event::UploadStarted {
                path,
                target,
                attempt,
            } => {
                tracing::info!(
                    path = %path.display(),
                    target = %target,
                    attempt,
                    "Upload start"
                );
            }
            Event::UploadCompleted {
                path,
                target,
                bytes,
            } => {
                tracing::info!(
                    path = %path.display(),
                    target = %target,
                    bytes,
                    "Upload completed"
                );
            }
            Event::RetryScheduled {
                retry,
                limit,
                wait,
                message,
                cause,
            } => {
                let text = retry_message(retry, limit, wait, &message);
                match cause {
                    Some(cause) => tracing::warn!(retry, limit, error = %cause, "{text}"),
                    None => tracing::warn!(retry, limit, "{text}"),
                }
            }
            Event::FileDeleted { path } => {
                tracing::info!(path = %path.display(), "Delete completed local file");
            }
        }
    }
}

impl EventSink for broadcast::Sender<Event> {
    fn emit(&self, event: Event) {
        // No subscribers is not an error
        self.send(event).ok();
    }
}

/// Keeps every event in memory, in emission order
#[derive(Clone, Debug, Default)]
pub struct RecordingEvents {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingEvents {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
