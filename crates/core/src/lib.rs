//! Core domain types and shared logic for the Casa media lifecycle.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Storage keys and their validation
//! - Classification of stored image references
//! - Inline `data:` payload decoding
//! - Shared configuration

pub mod config;
pub mod error;
pub mod inline;
pub mod reference;
pub mod storage_key;

pub use error::{Error, Result};
pub use inline::{DEFAULT_CONTENT_TYPE, InlinePayload, extension_for};
pub use reference::{AssetReference, references_from_json};
pub use storage_key::{MAX_KEY_LEN, StorageKey};
