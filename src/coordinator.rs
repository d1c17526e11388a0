//! Transaction-level coordination
//!
//! The orchestrator creates one [`TransactionCoordinator`] per job, calls
//! [`begin`](TransactionCoordinator::begin) once, opens one session per task and
//! hands the committed reports back to [`collect`](TransactionCoordinator::collect).

use crate::config::OutputConfig;
use crate::error::Result;
use crate::events::{SharedEvents, TracingEvents};
use crate::session::TaskOutputSession;
use crate::store::ObjectStore;
use crate::swift::SwiftStore;
use crate::types::TaskReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Aggregate of all committed task reports
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Number of committed tasks
    pub tasks: usize,
    /// Number of uploaded objects
    pub objects: usize,
    /// Total bytes uploaded
    pub bytes: u64,
    /// Rotated files left on local disk, across all tasks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abandoned_files: Vec<PathBuf>,
}

/// Shared setup and bookkeeping for all task sessions of one job
pub struct TransactionCoordinator {
    config: OutputConfig,
    store: Arc<dyn ObjectStore>,
    events: SharedEvents,
    cancel: CancellationToken,
}

impl TransactionCoordinator {
    /// Validate `config` and prepare a Swift store; performs no network I/O
    pub fn new(config: OutputConfig) -> Result<Self> {
        let store = SwiftStore::from_config(&config)?;
        Self::with_store(config, Arc::new(store))
    }

    /// Validate `config` and use `store` for every session
    pub fn with_store(config: OutputConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            events: Arc::new(TracingEvents),
            cancel: CancellationToken::new(),
        })
    }

    /// Send pipeline events to `events` instead of `tracing`
    pub fn with_events(mut self, events: SharedEvents) -> Self {
        self.events = events;
        self
    }

    /// Configuration shared by every session
    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Make sure the destination container exists
    ///
    /// Must run once before any session starts; sessions assume the container
    /// is there.
    pub async fn begin(&self) -> Result<()> {
        let container = &self.config.container;
        let created = self.store.ensure_container(container).await?;
        tracing::info!(
            container = %container,
            store = self.store.name(),
            created,
            "Output container ready"
        );
        Ok(())
    }

    /// Open the session for one task
    pub fn open(&self, task_index: u32) -> Result<TaskOutputSession> {
        TaskOutputSession::open(
            &self.config,
            task_index,
            self.store.clone(),
            self.events.clone(),
            self.cancel.child_token(),
        )
    }

    /// Interrupt every session's upload in progress
    pub fn cancel(&self) {
        tracing::info!("Cancelling all task uploads");
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels every session when triggered
    ///
    /// Hand it to [`cancel_on_shutdown`](crate::cancel_on_shutdown) or to the
    /// orchestrator's own shutdown path.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Aggregate the reports of all committed tasks
    pub fn collect(&self, reports: &[TaskReport]) -> TransactionSummary {
        let mut summary = TransactionSummary {
            tasks: reports.len(),
            ..TransactionSummary::default()
        };
        for report in reports {
            if let Some(uploaded) = &report.uploaded {
                summary.objects += 1;
                summary.bytes += uploaded.bytes;
            }
            summary
                .abandoned_files
                .extend(report.abandoned_files.iter().cloned());
        }
        summary
    }

    /// Cleanup phase of the job; logs the outcome and leaves the store untouched
    pub fn cleanup(&self, reports: &[TaskReport]) {
        let summary = self.collect(reports);
        for path in &summary.abandoned_files {
            tracing::warn!(path = %path.display(), "Rotated file was never uploaded");
        }
        tracing::info!(
            container = %self.config.container,
            tasks = summary.tasks,
            objects = summary.objects,
            bytes = summary.bytes,
            "Output transaction complete"
        );
    }
}
