//! # swift-output
//!
//! File output sink for OpenStack Swift object storage.
//!
//! ## Design
//!
//! Each parallel task writes through its own [`TaskOutputSession`]:
//! - **Staged locally** - buffers go to a temporary file first, never straight to the network
//! - **Deterministic keys** - object names come from the task and file index only
//! - **Retried uploads** - transient store failures back off exponentially
//! - **Transactional** - `finish` uploads, `abort` leaves no remote side effect, `commit` reports
//!
//! ## Quick Start
//!
//! ```no_run
//! use swift_output::{OutputConfig, TransactionCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OutputConfig::from_json(
//!         r#"{
//!             "auth_type": "tempauth",
//!             "auth_url": "http://localhost:8080/auth/v1.0",
//!             "username": "test:tester",
//!             "password": "testing",
//!             "container": "embulk_output",
//!             "path_prefix": "data/part",
//!             "file_ext": "csv"
//!         }"#,
//!     )?;
//!
//!     let coordinator = TransactionCoordinator::new(config)?;
//!     coordinator.begin().await?;
//!
//!     // Cancel uploads in flight on SIGTERM / Ctrl+C
//!     tokio::spawn(swift_output::cancel_on_shutdown(coordinator.shutdown_token()));
//!
//!     let mut session = coordinator.open(0)?;
//!     session.next_file().await?;
//!     session.add(b"id,name\n1,alice\n".to_vec()).await?;
//!     session.finish().await?;
//!     let report = session.commit()?;
//!
//!     coordinator.cleanup(&[report]);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Job-level setup and report aggregation
pub mod coordinator;
/// Error types
pub mod error;
/// Event sinks
pub mod events;
/// Object key naming
pub mod naming;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-task output state machine
pub mod session;
/// Local staging files
pub mod staging;
/// Object store abstraction
pub mod store;
/// OpenStack Swift client
pub mod swift;
/// Core types and events
pub mod types;
/// Upload with retry and local cleanup
pub mod uploader;

// Re-export commonly used types
pub use config::{AuthMethod, OutputConfig, RetryConfig};
pub use coordinator::{TransactionCoordinator, TransactionSummary};
pub use error::{Error, Result, StagingError, StoreError, UploadError};
pub use events::{EventSink, RecordingEvents, SharedEvents, TracingEvents};
pub use naming::SequenceNamer;
pub use retry::IsRetryable;
pub use session::TaskOutputSession;
pub use staging::{LocalStager, StagedFile};
pub use store::{MemoryStore, ObjectStore};
pub use swift::{SwiftCredentials, SwiftStore};
pub use types::{Event, SessionState, TaskReport, UploadReceipt, UploadTarget};
pub use uploader::RetryingUploader;

/// Cancel `token` once the process receives a termination signal
///
/// Listens for SIGTERM and SIGINT on Unix and for Ctrl+C elsewhere, or when
/// the Unix handlers cannot be registered.
///
/// Pass [`TransactionCoordinator::shutdown_token`] to interrupt every session's
/// upload, including one sleeping between retries.
pub async fn cancel_on_shutdown(token: tokio_util::sync::CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => token.cancel(),
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut term), Ok(mut int)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        tracing::warn!("Signal handlers unavailable, waiting for Ctrl+C only");
        wait_for_ctrl_c().await;
        return;
    };

    let received = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
    };
    tracing::info!(signal = received, "Shutdown requested, cancelling uploads");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "Shutdown requested, cancelling uploads"),
        // a broken listener must not cancel uploads
        Err(e) => {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
