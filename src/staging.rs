//! Local staging of output files
//!
//! Bytes are buffered on local disk before they go over the network, so a slow
//! or flaky store never back-pressures the producer and an upload can be
//! retried without asking the producer for the data again.

use crate::error::StagingError;
use crate::events::SharedEvents;
use crate::types::Event;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// A local temporary file owned by one session
///
/// Holds the write handle while open. Once closed it is only a path waiting to
/// be uploaded or abandoned.
#[derive(Debug)]
pub struct StagedFile {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    len: u64,
}

impl StagedFile {
    /// Output name this file is staged for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the write handle is still open
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Bytes appended so far
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing was appended
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Creates, fills and removes staging files in one directory
#[derive(Clone)]
pub struct LocalStager {
    dir: PathBuf,
    events: SharedEvents,
}

impl LocalStager {
    /// Stage files under `dir`
    pub fn new(dir: impl Into<PathBuf>, events: SharedEvents) -> Self {
        Self {
            dir: dir.into(),
            events,
        }
    }

    /// Staging directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a new empty staging file for `name`
    ///
    /// The file name embeds `name` plus a random component, so two sessions
    /// staging the same name never collide.
    pub async fn open(&self, name: &str) -> Result<StagedFile, StagingError> {
        let create_error = |source| StagingError::Create {
            name: name.to_string(),
            dir: self.dir.clone(),
            source,
        };

        let prefix = format!("{}.", name.replace(['/', '\\'], "_"));
        let (file, path) = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(create_error)?
            .keep()
            .map_err(|e| create_error(e.error))?;

        self.events.emit(Event::FileOpened {
            name: name.to_string(),
            path: path.clone(),
        });

        Ok(StagedFile {
            name: name.to_string(),
            path,
            writer: Some(BufWriter::new(File::from_std(file))),
            len: 0,
        })
    }

    /// Append `bytes` to an open staging file
    ///
    /// The buffer is consumed whether or not the write succeeds.
    pub async fn append(&self, file: &mut StagedFile, bytes: Vec<u8>) -> Result<(), StagingError> {
        let Some(writer) = file.writer.as_mut() else {
            return Err(StagingError::Append {
                path: file.path.clone(),
                source: std::io::Error::other("staging file is already closed"),
            });
        };

        writer
            .write_all(&bytes)
            .await
            .map_err(|source| StagingError::Append {
                path: file.path.clone(),
                source,
            })?;
        file.len += bytes.len() as u64;
        Ok(())
    }

    /// Flush, sync and close the write handle
    ///
    /// Returns `false` when the file was already closed. Safe to call any
    /// number of times.
    pub async fn close(&self, file: &mut StagedFile) -> Result<bool, StagingError> {
        let Some(mut writer) = file.writer.take() else {
            return Ok(false);
        };

        let close_error = |source| StagingError::Close {
            path: file.path.clone(),
            source,
        };
        writer.flush().await.map_err(close_error)?;
        writer.into_inner().sync_all().await.map_err(close_error)?;
        Ok(true)
    }

    /// Remove the staging file from disk
    pub async fn delete(&self, mut file: StagedFile) -> Result<(), StagingError> {
        // Release the handle before removing the file
        file.writer.take();

        tokio::fs::remove_file(&file.path)
            .await
            .map_err(|source| StagingError::Delete {
                path: file.path.clone(),
                source,
            })?;

        self.events.emit(Event::FileDeleted { path: file.path });
        Ok(())
    }
}
