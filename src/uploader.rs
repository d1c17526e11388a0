//! Upload of staged files with retry
//!
//! [`RetryingUploader::upload`] drives one staged file to one target:
//! every attempt reopens the local file and asks the store to resolve the
//! target again, failures are classified through
//! [`IsRetryable`](crate::retry::IsRetryable), and the local file is deleted
//! only once the store confirmed the write.

use crate::config::RetryConfig;
use crate::error::{StoreError, UploadError};
use crate::events::SharedEvents;
use crate::retry::{Attempt, GiveUp, RetryNotice, with_retry};
use crate::staging::{LocalStager, StagedFile};
use crate::store::ObjectStore;
use crate::types::{Event, UploadReceipt, UploadTarget};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;

/// Every n-th retry is logged with its full cause chain
const VERBOSE_RETRY_EVERY: u32 = 3;

/// Transfers staged files to an [`ObjectStore`]
#[derive(Clone)]
pub struct RetryingUploader {
    store: Arc<dyn ObjectStore>,
    stager: LocalStager,
    retry: RetryConfig,
    events: SharedEvents,
    cancel: CancellationToken,
}

impl RetryingUploader {
    /// Create an uploader
    ///
    /// `stager` closes files before upload and deletes them after; `cancel`
    /// aborts any upload in progress.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        stager: LocalStager,
        retry: RetryConfig,
        events: SharedEvents,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            stager,
            retry,
            events,
            cancel,
        }
    }

    /// Upload a staged file, then delete it locally
    ///
    /// A file that is still open is flushed and closed first.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Unflushed`] if an open file could not be closed
    /// - [`UploadError::NonRetryable`] on the first permanent failure
    /// - [`UploadError::Exhausted`] with the last failure once retries run out
    /// - [`UploadError::Cleanup`] if the object was stored but the local file
    ///   could not be removed
    /// - [`UploadError::Interrupted`] if the cancellation token fired
    ///
    /// The staged file is left on disk in every error case except `Cleanup`.
    pub async fn upload(
        &self,
        mut file: StagedFile,
        target: UploadTarget,
    ) -> Result<UploadReceipt, UploadError> {
        self.stager
            .close(&mut file)
            .await
            .map_err(|source| UploadError::Unflushed {
                key: target.key.clone(),
                source,
            })?;
        let path = file.path().to_path_buf();

        let outcome = with_retry(
            &self.retry,
            &self.cancel,
            |notice| self.notify_retry(notice),
            |attempt| self.put_once(&path, &target, attempt),
        )
        .await;

        let key = target.key.clone();
        let (bytes, attempts) = outcome.map_err(|give_up| match give_up {
            GiveUp::Fatal { attempts, error } => UploadError::NonRetryable {
                key: key.clone(),
                attempts,
                source: error,
            },
            GiveUp::Exhausted {
                attempts, error, ..
            } => UploadError::Exhausted {
                key: key.clone(),
                attempts,
                source: error,
            },
            GiveUp::Interrupted { attempts, .. } => UploadError::Interrupted {
                key: key.clone(),
                attempts,
            },
        })?;

        self.stager
            .delete(file)
            .await
            .map_err(|source| UploadError::Cleanup {
                key: key.clone(),
                source,
            })?;

        Ok(UploadReceipt {
            key,
            bytes,
            attempts,
        })
    }

    async fn put_once(
        &self,
        path: &Path,
        target: &UploadTarget,
        attempt: u32,
    ) -> Attempt<(u64, u32), StoreError> {
        self.events.emit(Event::UploadStarted {
            path: path.to_path_buf(),
            target: target.clone(),
            attempt,
        });

        let result = async {
            let body = File::open(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StoreError::LocalFileMissing(path.to_path_buf())
                } else {
                    StoreError::Io(e)
                }
            })?;
            let len = body.metadata().await?.len();
            self.store.put_object(target, body, len).await?;
            Ok::<_, StoreError>(len)
        }
        .await;

        if let Ok(bytes) = &result {
            self.events.emit(Event::UploadCompleted {
                path: path.to_path_buf(),
                target: target.clone(),
                bytes: *bytes,
            });
        }
        result.map(|bytes| (bytes, attempt)).into()
    }

    fn notify_retry(&self, notice: &RetryNotice<'_, StoreError>) {
        let cause = (notice.retry % VERBOSE_RETRY_EVERY == 0).then(|| error_chain(notice.error));
        self.events.emit(Event::RetryScheduled {
            retry: notice.retry,
            limit: notice.limit,
            wait: notice.wait,
            message: notice.error.to_string(),
            cause,
        });
    }
}

/// Render an error with all of its sources
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": caused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
