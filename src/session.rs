//! Per-task output session
//!
//! A [`TaskOutputSession`] is the state machine the orchestrator drives for one
//! task: `next_file`, `add` any number of times, optionally rotate with another
//! `next_file`, then exactly one of `finish` or `abort`, then `commit`.
//!
//! ```text
//! Idle --next_file--> Staging --close--> Idle
//!   |                   |  ^                |
//!   |                   |  +--next_file-----+
//!   +------finish-------+--finish--> Finished
//!   +------abort--------+--abort---> Aborted
//! ```
//!
//! Only the file present at `finish` time is uploaded. Files closed by a
//! rotation stay on local disk and are listed in the [`TaskReport`].

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::events::SharedEvents;
use crate::naming::SequenceNamer;
use crate::staging::{LocalStager, StagedFile};
use crate::store::ObjectStore;
use crate::types::{SessionState, TaskReport, UploadReceipt, UploadTarget};
use crate::uploader::RetryingUploader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Output state machine for one task
///
/// Driven by a single worker through `&mut self`; sessions of different tasks
/// share nothing but the store and the parent cancellation token.
pub struct TaskOutputSession {
    task_index: u32,
    file_index: u32,
    container: String,
    namer: SequenceNamer,
    stager: LocalStager,
    uploader: RetryingUploader,
    current: Option<StagedFile>,
    state: SessionState,
    files_opened: u32,
    abandoned_files: Vec<PathBuf>,
    uploaded: Option<UploadReceipt>,
    failed: bool,
}

impl TaskOutputSession {
    /// Open a session for `task_index`
    ///
    /// Validates `config` before anything else; no file or network I/O happens
    /// here, the first staging file is created by [`next_file`](Self::next_file).
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the configuration is unusable.
    pub fn open(
        config: &OutputConfig,
        task_index: u32,
        store: Arc<dyn ObjectStore>,
        events: SharedEvents,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let namer = SequenceNamer::from_config(config)?;
        let stager = LocalStager::new(config.staging_dir(), events.clone());
        let uploader = RetryingUploader::new(
            store,
            stager.clone(),
            config.retry.clone(),
            events,
            cancel,
        );

        Ok(Self {
            task_index,
            file_index: 0,
            container: config.container.clone(),
            namer,
            stager,
            uploader,
            current: None,
            state: SessionState::Idle,
            files_opened: 0,
            abandoned_files: Vec::new(),
            uploaded: None,
            failed: false,
        })
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Task this session writes for
    pub fn task_index(&self) -> u32 {
        self.task_index
    }

    /// Rotation counter; the next file is named with this index
    pub fn file_index(&self) -> u32 {
        self.file_index
    }

    /// Local path of the current staging file, open or closed
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(StagedFile::path)
    }

    /// Rotated files left on local disk so far
    pub fn abandoned_files(&self) -> &[PathBuf] {
        &self.abandoned_files
    }

    /// Start a new staging file, rotating away from the previous one
    ///
    /// The previous file, if any, is closed and left on disk without upload,
    /// and the file index advances.
    pub async fn next_file(&mut self) -> Result<()> {
        self.ensure_active("start a file in")?;

        if let Some(mut previous) = self.current.take() {
            self.state = SessionState::Idle;
            self.file_index += 1;
            self.abandoned_files.push(previous.path().to_path_buf());
            tracing::warn!(
                task_index = self.task_index,
                name = %previous.name(),
                path = %previous.path().display(),
                "Rotated file will not be uploaded"
            );
            let closed = self.stager.close(&mut previous).await;
            self.check(closed)?;
        }

        let name = self.namer.name(self.task_index, self.file_index);
        let opened = self.stager.open(&name).await;
        let file = self.check(opened)?;
        self.current = Some(file);
        self.files_opened += 1;
        self.state = SessionState::Staging;
        Ok(())
    }

    /// Append one buffer to the open staging file
    ///
    /// # Errors
    ///
    /// [`Error::NotStaging`] outside of `Staging`; [`Error::Staging`] if the
    /// write fails, after which the session only accepts `close` and `abort`.
    pub async fn add(&mut self, bytes: Vec<u8>) -> Result<()> {
        if self.failed {
            return Err(self.rejected("add to"));
        }
        if self.state != SessionState::Staging {
            return Err(Error::NotStaging { state: self.state });
        }
        let file = self
            .current
            .as_mut()
            .ok_or(Error::NotStaging { state: self.state })?;
        let appended = self.stager.append(file, bytes).await;
        self.check(appended)
    }

    /// Close the open staging file without uploading it
    ///
    /// Safe in every state and idempotent; never moves the file index.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Staging {
            self.state = SessionState::Idle;
        }
        if let Some(file) = self.current.as_mut() {
            let closed = self.stager.close(file).await;
            self.check(closed)?;
        }
        Ok(())
    }

    /// Close the current file and upload it
    ///
    /// Uploads at most one object. A session that never opened a file finishes
    /// without uploading anything.
    ///
    /// # Errors
    ///
    /// Staging and upload errors propagate with their cause. After any local
    /// or upload failure the session stays non-terminal and refuses to finish;
    /// the orchestrator is expected to [`abort`](Self::abort).
    pub async fn finish(&mut self) -> Result<()> {
        self.ensure_active("finish")?;

        self.close().await?;

        if let Some(file) = self.current.take() {
            let target = UploadTarget::new(self.container.clone(), file.name());
            let uploaded = self.uploader.upload(file, target).await;
            self.uploaded = Some(self.check(uploaded)?);
        }

        self.state = SessionState::Finished;
        tracing::info!(
            task_index = self.task_index,
            files_opened = self.files_opened,
            uploaded = self.uploaded.is_some(),
            "Task output finished"
        );
        Ok(())
    }

    /// Give up on the task
    ///
    /// Never uploads and never deletes: a staged file stays on local disk.
    pub fn abort(&mut self) {
        if self.state == SessionState::Aborted {
            return;
        }
        if let Some(file) = self.current.take() {
            tracing::info!(
                task_index = self.task_index,
                path = %file.path().display(),
                "Task aborted, staged file left in place"
            );
        }
        self.state = SessionState::Aborted;
    }

    /// Produce the report for a finished task
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless the session is `Finished`.
    pub fn commit(&self) -> Result<TaskReport> {
        if self.state != SessionState::Finished {
            return Err(Error::InvalidState {
                operation: "commit",
                state: self.state,
            });
        }

        Ok(TaskReport {
            task_index: self.task_index,
            files_opened: self.files_opened,
            uploaded: self.uploaded.clone(),
            abandoned_files: self.abandoned_files.clone(),
            committed_at: chrono::Utc::now(),
        })
    }

    /// Reject output operations on a terminal or failed session
    fn ensure_active(&self, operation: &'static str) -> Result<()> {
        if self.state.is_terminal() || self.failed {
            return Err(self.rejected(operation));
        }
        Ok(())
    }

    fn rejected(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state,
        }
    }

    /// Local and upload failures are fatal to the session
    fn check<T, E: Into<Error>>(&mut self, result: std::result::Result<T, E>) -> Result<T> {
        result.map_err(|e| {
            self.failed = true;
            e.into()
        })
    }
}
