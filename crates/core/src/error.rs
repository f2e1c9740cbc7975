//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("invalid inline payload: {0}")]
    InvalidInline(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
