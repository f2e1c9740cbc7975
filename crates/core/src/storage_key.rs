//! Storage key construction, validation, and parsing.
//!
//! A storage key is the internal path of a blob inside a bucket, of the form
//! `{owner_id}/{entity_id}/{filename}`. It is distinct from any URL used to
//! fetch the blob, and this module is the single place that decides whether a
//! string is one.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Maximum encoded length of a storage key.
pub const MAX_KEY_LEN: usize = 500;

/// Storage API path fragment that marks a full object URL rather than a key.
const OBJECT_API_FRAGMENT: &str = "/storage/v1/object/";

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_filename_char(c: char) -> bool {
    is_segment_char(c) || c == '.' || c == '+'
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_segment_char)
}

fn valid_filename(s: &str) -> bool {
    // "." and ".." would resolve to directories on path-based backends.
    !s.is_empty() && !s.chars().all(|c| c == '.') && s.chars().all(is_filename_char)
}

fn sanitize(s: &str, allowed: impl Fn(char) -> bool) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if allowed(c) { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Break up `http` so a generated filename never trips the URL check in
/// [`StorageKey::is_valid`].
fn defuse_url_marker(filename: String) -> String {
    if filename.contains("http") {
        filename.replace("http", "htt_p")
    } else {
        filename
    }
}

/// A validated `{owner_id}/{entity_id}/{filename}` storage key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    owner_id: String,
    entity_id: String,
    filename: String,
}

impl StorageKey {
    /// Build a key from its components.
    ///
    /// Never fails: characters outside `[a-zA-Z0-9._-]` in the filename are
    /// replaced with `_`, and owner/entity segments are cleaned the same way
    /// against their narrower alphabet.
    ///
    /// [`is_valid`](Self::is_valid) rejects anything containing `http`, so the
    /// filename has that substring broken up (`http.jpg` becomes
    /// `htt_p.jpg`). Owner and entity ids are kept as given; ids containing
    /// `http` yield keys that `is_valid` rejects.
    pub fn build(owner_id: &str, entity_id: &str, filename: &str) -> Self {
        Self {
            owner_id: sanitize(owner_id, is_segment_char),
            entity_id: sanitize(entity_id, is_segment_char),
            filename: defuse_url_marker(sanitize(filename, |c| is_segment_char(c) || c == '.')),
        }
    }

    /// Parse a previously stored key.
    pub fn parse(path: &str) -> crate::Result<Self> {
        if path.len() > MAX_KEY_LEN {
            return Err(crate::Error::InvalidKey(format!(
                "key exceeds {MAX_KEY_LEN} characters"
            )));
        }

        let mut parts = path.split('/');
        let (Some(owner_id), Some(entity_id), Some(filename), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(crate::Error::InvalidKey(
                "expected exactly three segments: owner/entity/filename".to_string(),
            ));
        };

        if !valid_segment(owner_id) {
            return Err(crate::Error::InvalidKey(format!(
                "invalid owner segment: {owner_id:?}"
            )));
        }
        if !valid_segment(entity_id) {
            return Err(crate::Error::InvalidKey(format!(
                "invalid entity segment: {entity_id:?}"
            )));
        }
        if !valid_filename(filename) {
            return Err(crate::Error::InvalidKey(format!(
                "invalid filename segment: {filename:?}"
            )));
        }

        Ok(Self {
            owner_id: owner_id.to_string(),
            entity_id: entity_id.to_string(),
            filename: filename.to_string(),
        })
    }

    /// Whether `candidate` is safe to treat as a storage key.
    ///
    /// Rejects full URLs, storage API paths, inline `data:` payloads,
    /// oversized strings, and anything that is not a three-segment key.
    pub fn is_valid(candidate: &str) -> bool {
        if candidate.trim().is_empty() {
            return false;
        }
        if candidate.contains("http") || candidate.contains(OBJECT_API_FRAGMENT) {
            return false;
        }
        if candidate.starts_with("data:") || candidate.contains("base64,") {
            return false;
        }
        Self::parse(candidate).is_ok()
    }

    /// Whether `segment` is usable as an owner or entity segment.
    pub fn is_valid_segment(segment: &str) -> bool {
        valid_segment(segment)
    }

    /// Listing prefix covering every asset of one owner/entity pair.
    pub fn prefix(owner_id: &str, entity_id: &str) -> String {
        format!("{owner_id}/{entity_id}/")
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Whether this key lives under the given owner.
    pub fn owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    /// Get the encoded `owner/entity/filename` form.
    pub fn to_path_string(&self) -> String {
        format!("{}/{}/{}", self.owner_id, self.entity_id, self.filename)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({self})")
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner_id, self.entity_id, self.filename)
    }
}

impl std::str::FromStr for StorageKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for StorageKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StorageKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
