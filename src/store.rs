//! Object store abstraction
//!
//! The pipeline only needs two things from a remote store: make sure a
//! container exists, and put one object atomically. [`SwiftStore`](crate::swift::SwiftStore)
//! speaks the Swift HTTP API; [`MemoryStore`] keeps objects in memory.

use crate::error::StoreError;
use crate::types::UploadTarget;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

/// Trait for remote object storage
///
/// Implementations must resolve the target to a concrete endpoint on every
/// call; callers retry by calling again with the same target and rely on that.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create `container` unless it exists
    ///
    /// # Returns
    ///
    /// `true` if the container was created by this call.
    async fn ensure_container(&self, container: &str) -> Result<bool, StoreError>;

    /// Store the `len` bytes readable from `body` as one object
    ///
    /// Either the whole object is written or the call fails.
    async fn put_object(&self, target: &UploadTarget, body: File, len: u64)
    -> Result<(), StoreError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Validate the parts of a target every store agrees on
pub fn check_target(target: &UploadTarget) -> Result<(), StoreError> {
    if target.container.is_empty() || target.container.contains('/') {
        return Err(StoreError::InvalidTarget(format!(
            "container name {:?} is not valid",
            target.container
        )));
    }
    if target.key.is_empty() {
        return Err(StoreError::InvalidTarget("object key is empty".to_string()));
    }
    // URL path normalization would silently rewrite these segments
    if target.key.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(StoreError::InvalidTarget(format!(
            "object key {:?} contains a '.' or '..' segment",
            target.key
        )));
    }
    Ok(())
}

/// In-memory object store
///
/// Cloning shares the underlying storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    containers: Arc<RwLock<BTreeSet<String>>>,
    objects: Arc<RwLock<BTreeMap<(String, String), Vec<u8>>>>,
    puts: Arc<AtomicU32>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already has `container`
    pub async fn with_container(container: &str) -> Self {
        let store = Self::new();
        store.containers.write().await.insert(container.to_string());
        store
    }

    /// Contents of an object, if stored
    pub async fn object(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `container`, sorted
    pub async fn keys(&self, container: &str) -> Vec<String> {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Whether `container` exists
    pub async fn has_container(&self, container: &str) -> bool {
        self.containers.read().await.contains(container)
    }

    /// Number of put calls received, successful or not
    pub fn put_count(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn ensure_container(&self, container: &str) -> Result<bool, StoreError> {
        Ok(self.containers.write().await.insert(container.to_string()))
    }

    async fn put_object(
        &self,
        target: &UploadTarget,
        mut body: File,
        len: u64,
    ) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        check_target(target)?;

        if !self.has_container(&target.container).await {
            return Err(StoreError::Status {
                status: 404,
                message: format!("container {} not found", target.container),
            });
        }

        let mut data = Vec::with_capacity(len as usize);
        body.read_to_end(&mut data).await?;
        if data.len() as u64 != len {
            return Err(StoreError::Status {
                status: 422,
                message: format!("expected {len} bytes, received {}", data.len()),
            });
        }

        self.objects
            .write()
            .await
            .insert((target.container.clone(), target.key.clone()), data);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
