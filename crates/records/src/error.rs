//! Record store error types.

use thiserror::Error;

/// Record store operation errors.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The record changed between read and write.
    #[error("write conflict on record {record_id}: expected version {expected_ms}, found {actual_ms}")]
    WriteConflict {
        record_id: String,
        expected_ms: i64,
        actual_ms: i64,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record store call timed out: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RecordError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for record store operations.
pub type RecordResult<T> = std::result::Result<T, RecordError>;
