//! Owning-record model and its database row mapping.

use crate::error::{RecordError, RecordResult};
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Which reference field of an owning record to read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceField {
    /// Ordered reference list; the source of truth. Index 0 is the cover.
    Primary,
    /// Legacy single-value mirror of `primary[0]`.
    Fallback,
}

impl ReferenceField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// A database entity that holds image references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OwningRecord {
    pub id: String,
    pub owner_id: String,
    pub primary: Vec<String>,
    pub fallback: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_at: OffsetDateTime,
}

impl OwningRecord {
    /// New record stamped with the current time (millisecond precision).
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, primary: Vec<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            primary,
            fallback: None,
            last_modified_at: truncate_to_millis(OffsetDateTime::now_utc()),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Current value of a field as a list.
    pub fn field(&self, field: ReferenceField) -> Vec<String> {
        match field {
            ReferenceField::Primary => self.primary.clone(),
            ReferenceField::Fallback => self.fallback.iter().cloned().collect(),
        }
    }
}

/// Snapshot of one reference field plus the record version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldValue {
    pub references: Vec<String>,
    pub last_modified_at: OffsetDateTime,
}

/// Row in the `owning_records` table.
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub collection: String,
    pub record_id: String,
    pub owner_id: String,
    pub primary_refs: String,
    pub fallback_ref: Option<String>,
    pub last_modified_ms: i64,
}

impl RecordRow {
    pub fn into_record(self) -> RecordResult<OwningRecord> {
        let primary: Vec<String> = if self.primary_refs.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.primary_refs)?
        };
        Ok(OwningRecord {
            id: self.record_id,
            owner_id: self.owner_id,
            primary,
            fallback: self.fallback_ref,
            last_modified_at: from_millis(self.last_modified_ms)?,
        })
    }
}

/// Unix milliseconds of a timestamp.
pub fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(ms: i64) -> RecordResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| RecordError::Serialization(format!("invalid timestamp {ms}: {e}")))
}

pub fn truncate_to_millis(at: OffsetDateTime) -> OffsetDateTime {
    from_millis(to_millis(at)).unwrap_or(at)
}

/// Next version stamp: now, but strictly after `previous_ms`.
pub fn next_version_ms(previous_ms: i64) -> i64 {
    to_millis(OffsetDateTime::now_utc()).max(previous_ms.saturating_add(1))
}
