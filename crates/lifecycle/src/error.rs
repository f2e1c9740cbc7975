//! Lifecycle error types.

use casa_records::RecordError;
use casa_storage::StorageError;
use thiserror::Error;

/// Errors returned by the lifecycle services.
///
/// Per-item failures inside batch and migration loops are reported in the
/// returned structures instead; these variants are whole-operation failures.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A candidate key was malformed or unsafe.
    #[error("invalid storage key: {0}")]
    KeyInvalid(String),

    /// The object store could not answer (network, provider, or timeout).
    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    /// The record changed between read and write.
    #[error("record {record_id} was modified concurrently")]
    RecordWriteConflict { record_id: String },

    #[error("record store error: {0}")]
    RecordStore(RecordError),

    /// Rejected before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The new object could not be stored; nothing was written.
    #[error("upload failed: {0}")]
    UploadFailed(#[source] StorageError),

    /// The primary field write failed after upload; the object was rolled back.
    #[error("failed to persist record {record_id}: {source}")]
    PersistFailed {
        record_id: String,
        #[source]
        source: RecordError,
    },
}

impl From<RecordError> for LifecycleError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::WriteConflict { record_id, .. } => Self::RecordWriteConflict { record_id },
            other => Self::RecordStore(other),
        }
    }
}

impl LifecycleError {
    /// Map a failed primary write, keeping conflicts distinguishable.
    pub(crate) fn persist(record_id: &str, e: RecordError) -> Self {
        match e {
            RecordError::WriteConflict { .. } => Self::RecordWriteConflict {
                record_id: record_id.to_string(),
            },
            source => Self::PersistFailed {
                record_id: record_id.to_string(),
                source,
            },
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
