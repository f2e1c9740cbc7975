//! Per-call timeout decorator for record stores.

use crate::error::{RecordError, RecordResult};
use crate::models::{FieldValue, OwningRecord, ReferenceField};
use crate::store::RecordStore;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use time::OffsetDateTime;

/// Bounds every call on the wrapped record store by a fixed timeout.
pub struct TimeoutRecordStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: RecordStore> TimeoutRecordStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = RecordResult<T>>,
    ) -> RecordResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Record store call timed out"
                );
                Err(RecordError::Timeout(format!(
                    "{operation} exceeded {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for TimeoutRecordStore<S> {
    async fn get_record(&self, id: &str) -> RecordResult<Option<OwningRecord>> {
        self.bounded("get_record", self.inner.get_record(id)).await
    }

    async fn read_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
    ) -> RecordResult<FieldValue> {
        self.bounded(
            "read_reference_field",
            self.inner.read_reference_field(id, field),
        )
        .await
    }

    async fn write_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
        references: &[String],
        expected_previous_modified_at: Option<OffsetDateTime>,
    ) -> RecordResult<OffsetDateTime> {
        self.bounded(
            "write_reference_field",
            self.inner
                .write_reference_field(id, field, references, expected_previous_modified_at),
        )
        .await
    }

    async fn list_records_with_references(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> RecordResult<Vec<OwningRecord>> {
        self.bounded(
            "list_records_with_references",
            self.inner.list_records_with_references(after, limit),
        )
        .await
    }

    async fn insert_record(&self, record: &OwningRecord) -> RecordResult<()> {
        self.bounded("insert_record", self.inner.insert_record(record))
            .await
    }

    async fn health_check(&self) -> RecordResult<()> {
        self.bounded("health_check", self.inner.health_check())
            .await
    }
}
