//! Per-call timeout decorator for object stores.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ListOptions, ObjectEntry, ObjectStore, SignedUrl};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

/// Bounds every call on the wrapped store by a fixed timeout.
///
/// An elapsed call yields [`StorageError::Timeout`]. Nothing is retried.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: ObjectStore> TimeoutStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    backend = self.inner.backend_name(),
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Storage call timed out"
                );
                Err(StorageError::Timeout(format!(
                    "{operation} exceeded {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for TimeoutStore<S> {
    async fn list(&self, prefix: &str, options: ListOptions) -> StorageResult<Vec<ObjectEntry>> {
        self.bounded("list", self.inner.list(prefix, options)).await
    }

    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.bounded("upload", self.inner.upload(key, data, content_type))
            .await
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        self.bounded("remove", self.inner.remove(keys)).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.bounded("exists", self.inner.exists(key)).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl> {
        self.bounded("signed_url", self.inner.signed_url(key, ttl))
            .await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.bounded("health_check", self.inner.health_check())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store whose every call sleeps before succeeding.
    struct SlowStore {
        delay: Duration,
    }

    #[async_trait]
    impl ObjectStore for SlowStore {
        async fn list(&self, _prefix: &str, _options: ListOptions) -> StorageResult<Vec<ObjectEntry>> {
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }

        async fn upload(&self, _key: &str, _data: Bytes, _content_type: &str) -> StorageResult<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn remove(&self, _keys: &[String]) -> StorageResult<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn exists(&self, _key: &str) -> StorageResult<bool> {
            tokio::time::sleep(self.delay).await;
            Ok(true)
        }

        fn public_url(&self, key: &str) -> String {
            format!("http://slow/{key}")
        }

        async fn signed_url(&self, key: &str, _ttl: Duration) -> StorageResult<SignedUrl> {
            Err(StorageError::NotFound(key.to_string()))
        }

        fn backend_name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_call_maps_to_timeout() {
        let store = TimeoutStore::new(
            SlowStore {
                delay: Duration::from_secs(60),
            },
            Duration::from_secs(1),
        );
        let result = store.remove(&["u/e/a.jpg".to_string()]).await;
        assert!(matches!(result, Err(StorageError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let store = TimeoutStore::new(
            SlowStore {
                delay: Duration::from_millis(10),
            },
            Duration::from_secs(1),
        );
        assert!(store.exists("u/e/a.jpg").await.unwrap());
        assert_eq!(store.public_url("u/e/a.jpg"), "http://slow/u/e/a.jpg");
        assert!(matches!(
            store.signed_url("u/e/a.jpg", Duration::from_secs(1)).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
