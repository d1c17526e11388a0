//! Core types and events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// State of a [`TaskOutputSession`](crate::session::TaskOutputSession)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No staged file is open
    Idle,
    /// A staged file is open and accepting bytes
    Staging,
    /// The final file was uploaded (terminal)
    Finished,
    /// The task was aborted (terminal)
    Aborted,
}

impl SessionState {
    /// Whether no further output operations are accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Staging => "staging",
            SessionState::Finished => "finished",
            SessionState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Destination of one upload
///
/// Only names; the store resolves them to an endpoint on every attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    /// Container name
    pub container: String,
    /// Object key within the container
    pub key: String,
}

impl UploadTarget {
    /// Create a target for `key` in `container`
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// Result of a successful upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Object key that was written
    pub key: String,
    /// Number of bytes uploaded
    pub bytes: u64,
    /// Number of put attempts it took (1 = first try)
    pub attempts: u32,
}

/// Report returned by a committed session
///
/// Append-only: the coordinator only relies on its existence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskReport {
    /// Index of the task that produced this report
    pub task_index: u32,
    /// Number of staged files opened during the task
    pub files_opened: u32,
    /// The uploaded object, if the task produced any output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<UploadReceipt>,
    /// Rotated files that were closed but not uploaded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abandoned_files: Vec<PathBuf>,
    /// When the task was committed
    pub committed_at: DateTime<Utc>,
}

/// Event emitted by the staging and upload pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A local staging file was created
    FileOpened {
        /// Output name the file is staged for
        name: String,
        /// Local path
        path: PathBuf,
    },

    /// A put attempt is starting
    UploadStarted {
        /// Local path
        path: PathBuf,
        /// Destination
        target: UploadTarget,
        /// Attempt number (1-based)
        attempt: u32,
    },

    /// A put attempt succeeded
    UploadCompleted {
        /// Local path
        path: PathBuf,
        /// Destination
        target: UploadTarget,
        /// Bytes written
        bytes: u64,
    },

    /// A put attempt failed and will be retried
    RetryScheduled {
        /// Retry number (1-based)
        retry: u32,
        /// Retry limit
        limit: u32,
        /// Wait before the next attempt
        #[serde(with = "crate::config::duration_millis_serde")]
        wait: Duration,
        /// Error message of the failed attempt
        message: String,
        /// Full cause chain, only present on every third retry
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },

    /// A local staging file was removed after upload
    FileDeleted {
        /// Local path
        path: PathBuf,
    },
}
