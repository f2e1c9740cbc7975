use async_trait::async_trait;
use bytes::Bytes;
use casa_storage::error::{StorageError, StorageResult};
use casa_storage::traits::{ListOptions, ObjectEntry, ObjectStore, SignedUrl};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Read-only backend that synthesizes `total_keys` entries under any prefix
/// without storing them, for paging tests.
#[allow(dead_code)]
pub struct SyntheticListingBackend {
    pub total_keys: usize,
}

#[allow(dead_code)]
impl SyntheticListingBackend {
    pub fn new(total_keys: usize) -> Arc<Self> {
        Arc::new(Self { total_keys })
    }

    fn name_at(i: usize) -> String {
        format!("image_{i:06}.jpg")
    }
}

#[async_trait]
impl ObjectStore for SyntheticListingBackend {
    async fn list(&self, prefix: &str, options: ListOptions) -> StorageResult<Vec<ObjectEntry>> {
        Ok((0..self.total_keys)
            .map(Self::name_at)
            .filter(|name| options.admits(name))
            .take(options.limit)
            .map(|name| ObjectEntry {
                key: format!("{prefix}{name}"),
                name,
                size: 1,
            })
            .collect())
    }

    async fn upload(&self, _key: &str, _data: Bytes, _content_type: &str) -> StorageResult<()> {
        Err(StorageError::Provider("synthetic backend is read-only".to_string()))
    }

    async fn remove(&self, _keys: &[String]) -> StorageResult<()> {
        Err(StorageError::Provider("synthetic backend is read-only".to_string()))
    }

    async fn exists(&self, _key: &str) -> StorageResult<bool> {
        Ok(false)
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://synthetic/{key}")
    }

    async fn signed_url(&self, key: &str, _ttl: Duration) -> StorageResult<SignedUrl> {
        Err(StorageError::NotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "synthetic"
    }
}

/// Wraps another store, counting calls and optionally stalling `remove`.
#[allow(dead_code)]
pub struct InstrumentedBackend<S> {
    pub inner: S,
    pub list_calls: Arc<AtomicUsize>,
    pub remove_calls: Arc<AtomicUsize>,
    pub remove_delay: Option<Duration>,
}

#[allow(dead_code)]
impl<S: ObjectStore> InstrumentedBackend<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            list_calls: Arc::new(AtomicUsize::new(0)),
            remove_calls: Arc::new(AtomicUsize::new(0)),
            remove_delay: None,
        }
    }

    pub fn with_remove_delay(mut self, delay: Duration) -> Self {
        self.remove_delay = Some(delay);
        self
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for InstrumentedBackend<S> {
    async fn list(&self, prefix: &str, options: ListOptions) -> StorageResult<Vec<ObjectEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list(prefix, options).await
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.inner.upload(key, data, content_type).await
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.remove_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.remove(keys).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl> {
        self.inner.signed_url(key, ttl).await
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }
}
