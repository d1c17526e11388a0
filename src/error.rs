//! Error types for swift-output
//!
//! Errors are layered the way the pipeline is:
//! - [`StoreError`] - raised by an [`ObjectStore`](crate::store::ObjectStore) for one request
//! - [`StagingError`] - local temporary file failures
//! - [`UploadError`] - outcome of a whole retry sequence for one staged file
//! - [`Error`] - what a session or the coordinator hands back to the orchestrator
//!
//! Every wrapper keeps its cause reachable through [`std::error::Error::source`].

use crate::types::SessionState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for swift-output operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type returned to the orchestrator
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "auth_type")
        key: Option<String>,
    },

    /// Local staging failure (create, append, close, delete)
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    /// Remote upload failure
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Object store failure outside of an upload (e.g., container setup)
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// `add` was called while no staged file is open
    #[error("no file is being staged (session is {state})")]
    NotStaging {
        /// State the session was in when `add` was called
        state: SessionState,
    },

    /// Operation is not valid in the session's current state
    #[error("cannot {operation} a session that is {state}")]
    InvalidState {
        /// The operation that was attempted (e.g., "commit")
        operation: &'static str,
        /// The state that prevents the operation
        state: SessionState,
    },

    /// Serialization error (configuration loading)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error for a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Local temporary file errors
///
/// Never retried: a disk that refused a write will not accept it a moment later.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The temporary file could not be created (disk full, permissions, missing directory)
    #[error("failed to create staging file for {name} in {dir}: {source}")]
    Create {
        /// Output name the staging file was created for
        name: String,
        /// Staging directory
        dir: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Appending bytes failed
    #[error("failed to write staging file {path}: {source}")]
    Append {
        /// Staging file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Flushing or closing the write handle failed
    #[error("failed to close staging file {path}: {source}")]
    Close {
        /// Staging file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Removing the file failed
    #[error("failed to delete staging file {path}: {source}")]
    Delete {
        /// Staging file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Outcome of a failed upload sequence for one staged file
#[derive(Debug, Error)]
pub enum UploadError {
    /// The staged file could not be flushed before the first attempt
    #[error("failed to close staging file for {key} before upload: {source}")]
    Unflushed {
        /// Object key being uploaded
        key: String,
        /// Close failure
        source: StagingError,
    },

    /// The store reported a permanent failure; no further attempts were made
    #[error("upload of {key} failed permanently after {attempts} attempt(s): {source}")]
    NonRetryable {
        /// Object key being uploaded
        key: String,
        /// Attempts made, including the failing one
        attempts: u32,
        /// The permanent failure
        source: StoreError,
    },

    /// Every attempt failed with a transient error
    #[error("upload of {key} gave up after {attempts} attempts: {source}")]
    Exhausted {
        /// Object key being uploaded
        key: String,
        /// Attempts made
        attempts: u32,
        /// Failure of the last attempt
        source: StoreError,
    },

    /// The object was stored but the local staging file could not be removed
    #[error("uploaded {key} but failed to clean up the local file: {source}")]
    Cleanup {
        /// Object key that was uploaded
        key: String,
        /// Delete failure
        source: StagingError,
    },

    /// Cancelled while waiting between attempts or during a put
    #[error("upload of {key} interrupted after {attempts} attempt(s)")]
    Interrupted {
        /// Object key being uploaded
        key: String,
        /// Attempts started before cancellation
        attempts: u32,
    },
}

/// Errors raised by an object store for a single request
#[derive(Debug, Error)]
pub enum StoreError {
    /// The local file to upload no longer exists
    #[error("local file not found: {0}")]
    LocalFileMissing(PathBuf),

    /// The container or object key cannot form a valid endpoint
    #[error("invalid upload target: {0}")]
    InvalidTarget(String),

    /// The store itself is misconfigured (bad auth URL, missing endpoint)
    #[error("store configuration error: {0}")]
    Config(String),

    /// Authentication was rejected or returned an unusable response
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The service answered with a non-success status
    #[error("request failed with status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error while reading the local file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
