//! Record store trait and the SQLite implementation.

use crate::error::{RecordError, RecordResult};
use crate::models::{
    FieldValue, OwningRecord, RecordRow, ReferenceField, from_millis, next_version_ms, to_millis,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Persistence for the image reference fields of owning records.
///
/// Records are created and destroyed elsewhere; this interface only reads
/// and rewrites their reference fields.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Fetch a whole record.
    async fn get_record(&self, id: &str) -> RecordResult<Option<OwningRecord>>;

    /// Read one reference field together with the record version.
    async fn read_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
    ) -> RecordResult<FieldValue>;

    /// Replace one reference field.
    ///
    /// When `expected_previous_modified_at` is set and the record has been
    /// modified since, nothing is written and [`RecordError::WriteConflict`]
    /// is returned. Every successful write moves `last_modified_at` strictly
    /// forward and returns the new value.
    async fn write_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
        references: &[String],
        expected_previous_modified_at: Option<OffsetDateTime>,
    ) -> RecordResult<OffsetDateTime>;

    /// Records with a non-empty primary field, ordered by id, after `after`.
    async fn list_records_with_references(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> RecordResult<Vec<OwningRecord>>;

    /// Seed a record.
    async fn insert_record(&self, record: &OwningRecord) -> RecordResult<()>;

    /// Check connectivity.
    async fn health_check(&self) -> RecordResult<()>;
}

/// Encode a field value for storage. The fallback keeps at most one entry.
fn encode_field(
    field: ReferenceField,
    references: &[String],
) -> RecordResult<(Option<String>, Option<String>)> {
    match field {
        ReferenceField::Primary => Ok((Some(serde_json::to_string(references)?), None)),
        ReferenceField::Fallback => Ok((None, references.first().cloned())),
    }
}

/// SQLite-backed record store scoped to one collection.
pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
    collection: String,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn new(path: impl AsRef<Path>, collection: impl Into<String>) -> RecordResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            collection: collection.into(),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn migrate(&self) -> RecordResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS owning_records (
                collection TEXT NOT NULL,
                record_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                primary_refs TEXT NOT NULL DEFAULT '[]',
                fallback_ref TEXT,
                last_modified_ms INTEGER NOT NULL,
                PRIMARY KEY (collection, record_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_owning_records_owner ON owning_records (collection, owner_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_row(&self, id: &str) -> RecordResult<Option<RecordRow>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM owning_records WHERE collection = ? AND record_id = ?",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_record(&self, id: &str) -> RecordResult<Option<OwningRecord>> {
        self.fetch_row(id)
            .await?
            .map(RecordRow::into_record)
            .transpose()
    }

    async fn read_reference_field(
        &self,
        id: &str,
        field: ReferenceField,
    ) -> RecordResult<FieldValue> {
        let record = self
            .get_record(id)
            .await?
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
        let current_ms = self
            .fetch_row(id)
            .await?
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?
            .last_modified_ms;

        let base_ms = match expected_previous_modified_at {
            Some(expected) => {
                let expected_ms = to_millis(expected);
                if expected_ms != current_ms {
                    return Err(RecordError::WriteConflict {
                        record_id: id.to_string(),
                        expected_ms,
                        actual_ms: current_ms,
                    });
                }
                expected_ms
            }
            None => current_ms,
        };

        let new_ms = next_version_ms(base_ms);
        let (primary, fallback) = encode_field(field, references)?;

        // Compare-and-swap on the version read above.
        let result = match field {
            ReferenceField::Primary => {
                sqlx::query(
                    "UPDATE owning_records SET primary_refs = ?, last_modified_ms = ? \
                     WHERE collection = ? AND record_id = ? AND last_modified_ms = ?",
                )
                .bind(primary)
                .bind(new_ms)
                .bind(&self.collection)
                .bind(id)
                .bind(base_ms)
                .execute(&self.pool)
                .await?
            }
            ReferenceField::Fallback => {
                sqlx::query(
                    "UPDATE owning_records SET fallback_ref = ?, last_modified_ms = ? \
                     WHERE collection = ? AND record_id = ? AND last_modified_ms = ?",
                )
                .bind(fallback)
                .bind(new_ms)
                .bind(&self.collection)
                .bind(id)
                .bind(base_ms)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            let actual_ms = self
                .fetch_row(id)
                .await?
                .map(|row| row.last_modified_ms)
                .unwrap_or_default();
            return Err(RecordError::WriteConflict {
                record_id: id.to_string(),
                expected_ms: base_ms,
                actual_ms,
            });
        }

        tracing::debug!(
            collection = %self.collection,
            record_id = %id,
            field = field.as_str(),
            count = references.len(),
            "Wrote reference field"
        );
        from_millis(new_ms)
    }

    async fn list_records_with_references(
        &self,
        after: Option<&str>,
        limit: usize,
    ) -> RecordResult<Vec<OwningRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM owning_records \
             WHERE collection = ? AND record_id > ? \
             AND primary_refs != '[]' AND primary_refs != '' \
             ORDER BY record_id LIMIT ?",
        )
        .bind(&self.collection)
        .bind(after.unwrap_or(""))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    async fn insert_record(&self, record: &OwningRecord) -> RecordResult<()> {
        let primary = serde_json::to_string(&record.primary)?;
        let result = sqlx::query(
            "INSERT INTO owning_records \
             (collection, record_id, owner_id, primary_refs, fallback_ref, last_modified_ms) \
             VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT (collection, record_id) DO NOTHING",
        )
        .bind(&self.collection)
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(primary)
        .bind(&record.fallback)
        .bind(to_millis(record.last_modified_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RecordError::AlreadyExists(record.id.clone()));
        }
        Ok(())
    }

    async fn health_check(&self) -> RecordResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
