//! In-memory record store for tests and dry runs.

use crate::error::{RecordError, RecordResult};
use crate::models::{
    FieldValue, OwningRecord, ReferenceField, from_millis, next_version_ms, to_millis,
    truncate_to_millis,
};
use crate::store::RecordStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Record store holding everything in a sorted map.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, OwningRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `records`.
    pub async fn with_records(records: impl IntoIterator<Item = OwningRecord>) -> RecordResult<Self> {
        let store = Self::new();
        for record in records {
            store.insert_record(&record).await?;
        }
        Ok(store)
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_record(&self, id: &str) -> RecordResult<Option<OwningRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn read_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
    ) -> RecordResult<FieldValue> {
        let records = self.records.read().await;
        let record = records
            .get(id)
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;
        Ok(FieldValue {
            references: record.field(field),
            last_modified_at: record.last_modified_at,
        })
    }

    async fn write_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
        references: &[String],
        expected_previous_modified_at: Option<OffsetDateTime>,
    ) -> RecordResult<OffsetDateTime> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;

        let current_ms = to_millis(record.last_modified_at);
        if let Some(expected) = expected_previous_modified_at
            && to_millis(expected) != current_ms
        {
            return Err(RecordError::WriteConflict {
                record_id: id.to_string(),
                expected_ms: to_millis(expected),
                actual_ms: current_ms,
            });
        }

        match field {
            ReferenceField::Primary => record.primary = references.to_vec(),
            ReferenceField::Fallback => record.fallback = references.first().cloned(),
        }

        let modified_at = from_millis(next_version_ms(current_ms))?;
        record.last_modified_at = modified_at;
        Ok(modified_at)
    }

    async fn list_records_with_references(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> RecordResult<Vec<OwningRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| after.is_none_or(|cursor| r.id.as_str() > cursor))
            .filter(|r| !r.primary.is_empty())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_record(&self, record: &OwningRecord) -> RecordResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(RecordError::AlreadyExists(record.id.clone()));
        }
        let mut stored = record.clone();
        stored.last_modified_at = truncate_to_millis(stored.last_modified_at);
        records.insert(record.id.clone(), stored);
        Ok(())
    }

    async fn health_check(&self) -> RecordResult<()> {
        Ok(())
    }
}
