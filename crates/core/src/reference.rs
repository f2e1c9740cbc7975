//! Classification of stored image references.
//!
//! Reference lists persisted on owning records mix three historical shapes:
//! plain storage keys, already-resolved URLs, and inline `data:` payloads.
//! Every component classifies an item through [`AssetReference::classify`]
//! so that the rules live in one place.

use crate::storage_key::StorageKey;
use serde::{Deserialize, Serialize};

/// One classified item of a reference list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AssetReference {
    /// Internal storage key.
    Key(StorageKey),
    /// Absolute or root-relative URL. Treated as already migrated.
    Url(String),
    /// Legacy inline `data:` payload awaiting migration.
    Inline(String),
    /// Anything else.
    Invalid(String),
}

impl AssetReference {
    pub fn classify(raw: &str) -> Self {
        if raw.starts_with("data:") {
            return Self::Inline(raw.to_string());
        }
        if raw.starts_with("http") || raw.starts_with('/') {
            return Self::Url(raw.to_string());
        }
        if StorageKey::is_valid(raw)
            && let Ok(key) = StorageKey::parse(raw)
        {
            return Self::Key(key);
        }
        Self::Invalid(raw.to_string())
    }

    /// Whether this item still needs to be moved into object storage.
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }

    /// Whether this item already points at object storage or an external URL.
    pub fn is_migrated(&self) -> bool {
        matches!(self, Self::Key(_) | Self::Url(_))
    }

    /// The stored string form of this reference.
    pub fn as_stored(&self) -> String {
        match self {
            Self::Key(key) => key.to_path_string(),
            Self::Url(s) | Self::Inline(s) | Self::Invalid(s) => s.clone(),
        }
    }
}

/// Extract the valid storage keys from a serialized image field.
///
/// Accepts a JSON array of strings, a JSON string, or a bare string.
/// Anything that is not a valid storage key is dropped.
pub fn references_from_json(raw: &str) -> Vec<StorageKey> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "[]" {
        return Vec::new();
    }

    let candidates: Vec<String> = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Ok(serde_json::Value::String(s)) => vec![s],
        Ok(_) => Vec::new(),
        Err(_) => vec![raw.to_string()],
    };

    candidates
        .iter()
        .filter(|c| StorageKey::is_valid(c))
        .filter_map(|c| StorageKey::parse(c).ok())
        .collect()
}
