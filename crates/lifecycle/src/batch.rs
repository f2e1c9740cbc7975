//! Chunked deletion with per-batch failure isolation.

use crate::metrics;
use casa_storage::ObjectStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Keys per `remove` call unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A contiguous range of keys whose `remove` call failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Index of the first key in the batch.
    pub start: usize,
    /// Index of the last key in the batch (inclusive).
    pub end: usize,
    pub message: String,
}

impl BatchFailure {
    /// Number of keys covered by this failure.
    pub fn key_count(&self) -> usize {
        self.end - self.start + 1
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Batch {}-{}: {}", self.start, self.end, self.message)
    }
}

/// Outcome of a batched delete. Partial success is a normal result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchResult {
    /// True only when no batch failed.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of keys in failed batches.
    pub fn failed_count(&self) -> usize {
        self.failed.iter().map(BatchFailure::key_count).sum()
    }

    /// Failures rendered as `"Batch {start}-{end}: {message}"`.
    pub fn error_messages(&self) -> Vec<String> {
        self.failed.iter().map(ToString::to_string).collect()
    }
}

/// Issues `remove` calls over fixed-size chunks of keys, one at a time.
pub struct BatchDeleter {
    store: Arc<dyn ObjectStore>,
}

impl BatchDeleter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Delete `keys` in contiguous chunks of `batch_size` (0 is treated as 1).
    ///
    /// Chunks run sequentially. A failed chunk is recorded and the next one
    /// is still attempted, so exactly `ceil(keys.len() / batch_size)` calls
    /// are made.
    pub async fn delete_all(&self, keys: &[String], batch_size: usize) -> BatchResult {
        let batch_size = batch_size.max(1);
        let mut result = BatchResult::default();

        for (batch_index, chunk) in keys.chunks(batch_size).enumerate() {
            let start = batch_index * batch_size;
            let end = start + chunk.len() - 1;

            match self.store.remove(chunk).await {
                Ok(()) => {
                    tracing::debug!(
                        backend = self.store.backend_name(),
                        start,
                        end,
                        "Deleted batch"
                    );
                    metrics::ASSETS_DELETED.inc_by(chunk.len() as u64);
                    result.succeeded.extend_from_slice(chunk);
                }
                Err(e) => {
                    tracing::warn!(
                        backend = self.store.backend_name(),
                        start,
                        end,
                        error = %e,
                        "Delete batch failed, continuing with next batch"
                    );
                    metrics::DELETE_BATCH_FAILURES.inc();
                    result.failed.push(BatchFailure {
                        start,
                        end,
                        message: e.to_string(),
                    });
                }
            }
        }

        result
    }
}
