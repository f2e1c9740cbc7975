//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

/// Default number of entries returned by one listing call.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// One object returned by a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    /// Name relative to the listed prefix.
    pub name: String,
    /// Full storage key (`prefix` + `name`).
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

/// Options for a single listing call.
#[derive(Clone, Debug)]
pub struct ListOptions {
    /// Maximum entries returned.
    pub limit: usize,
    /// Only return entries whose name sorts strictly after this one.
    pub start_after: Option<String>,
}

impl ListOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            start_after: None,
        }
    }

    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.start_after = Some(name.into());
        self
    }

    /// Whether `name` falls after the cursor.
    pub fn admits(&self, name: &str) -> bool {
        self.start_after
            .as_deref()
            .is_none_or(|cursor| name > cursor)
    }
}

impl Default for ListOptions {
    fn default() -> Self {
        Self::new(DEFAULT_LIST_LIMIT)
    }
}

/// A time-boxed URL granting read access to one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Thin capability interface over a blob store.
///
/// Implementations carry no business logic. Missing objects are reported as
/// `Err(NotFound)` or `Ok(false)`, never as panics.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// List objects under `prefix`, sorted by name ascending.
    ///
    /// At most `options.limit` entries are returned. Callers page by passing
    /// the last returned name as `start_after`.
    async fn list(&self, prefix: &str, options: ListOptions) -> StorageResult<Vec<ObjectEntry>>;

    /// Store an object, replacing any existing object at `key`.
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Remove the given objects in a single provider request.
    ///
    /// Keys that do not exist are ignored.
    async fn remove(&self, keys: &[String]) -> StorageResult<()>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Build the unsigned public URL for a key. Pure, no I/O.
    fn public_url(&self, key: &str) -> String;

    /// Create a URL for `key` that stops working after `ttl`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Compute the expiry instant for a signed URL.
pub(crate) fn expiry_after(ttl: Duration) -> StorageResult<OffsetDateTime> {
    let ttl = time::Duration::try_from(ttl).map_err(|e| {
        crate::error::StorageError::Config(format!("invalid signed URL ttl: {e}"))
    })?;
    OffsetDateTime::now_utc()
        .checked_add(ttl)
        .ok_or_else(|| crate::error::StorageError::Config("signed URL ttl overflows".to_string()))
}
