//! Moves legacy inline `data:` images out of records and into object storage.
//!
//! The run is idempotent: keys and URLs are copied through untouched, so a
//! second run over the same data migrates nothing. An item that cannot be
//! migrated stays in place and is reported; it is never dropped.

use crate::error::LifecycleResult;
use crate::metrics;
use crate::naming;
use bytes::Bytes;
use casa_core::config::{MigrationConfig, ReferenceStyle};
use casa_core::{AssetReference, InlinePayload, StorageKey};
use casa_records::{OwningRecord, RecordStore, ReferenceField};
use casa_storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Options for one migration run.
#[derive(Clone, Debug)]
pub struct MigrationOptions {
    /// Pause inserted between records.
    pub batch_pause: Duration,
    /// Records fetched per page.
    pub page_size: usize,
    /// Decode and report without uploading or writing.
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self::from_config(&MigrationConfig::default())
    }
}

impl MigrationOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            batch_pause: config.batch_pause(),
            page_size: config.page_size,
            dry_run: false,
        }
    }
}

/// One item (or whole record, when `index` is `None`) that failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationError {
    pub record_id: String,
    pub index: Option<usize>,
    pub message: String,
}

/// Report of a migration run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    pub total_records: u64,
    pub records_processed: u64,
    pub records_updated: u64,
    pub assets_seen: u64,
    pub assets_migrated: u64,
    pub dry_run: bool,
    pub errors: Vec<MigrationError>,
}

impl MigrationStats {
    fn item_error(&mut self, record_id: &str, index: usize, message: impl Into<String>) {
        metrics::MIGRATION_ERRORS.inc();
        self.errors.push(MigrationError {
            record_id: record_id.to_string(),
            index: Some(index),
            message: message.into(),
        });
    }
}

/// Read-only progress snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub total_assets: u64,
    pub migrated_assets: u64,
    pub pending_assets: u64,
    /// Items that are neither migrated nor migratable.
    pub invalid_assets: u64,
    pub progress_pct: f64,
}

pub struct MigrationService {
    store: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    config: MigrationConfig,
}

impl MigrationService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            store,
            records,
            config,
        }
    }

    /// Options derived from this service's configuration.
    pub fn default_options(&self) -> MigrationOptions {
        MigrationOptions::from_config(&self.config)
    }

    /// Migrate every record with a non-empty primary field.
    ///
    /// Per-item and per-record failures land in `errors`; only a failure to
    /// list records aborts the run.
    #[tracing::instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn run(&self, options: MigrationOptions) -> LifecycleResult<MigrationStats> {
        let page_size = options.page_size.max(1);
        let mut stats = MigrationStats {
            dry_run: options.dry_run,
            ..MigrationStats::default()
        };
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .records
                .list_records_with_references(cursor.as_deref(), page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());
            let full_page = page.len() >= page_size;

            for record in &page {
                if stats.total_records > 0 && !options.batch_pause.is_zero() {
                    tokio::time::sleep(options.batch_pause).await;
                }
                stats.total_records += 1;
                self.migrate_record(record, options.dry_run, &mut stats)
                    .await;
                stats.records_processed += 1;
            }

            if !full_page {
                break;
            }
        }

        tracing::info!(
            records = stats.records_processed,
            updated = stats.records_updated,
            seen = stats.assets_seen,
            migrated = stats.assets_migrated,
            errors = stats.errors.len(),
            dry_run = options.dry_run,
            "Migration run finished"
        );
        Ok(stats)
    }

    async fn migrate_record(&self, record: &OwningRecord, dry_run: bool, stats: &mut MigrationStats) {
        let mut rewritten = Vec::with_capacity(record.primary.len());
        let mut uploaded: Vec<String> = Vec::new();

        for (index, item) in record.primary.iter().enumerate() {
            stats.assets_seen += 1;
            match AssetReference::classify(item) {
                AssetReference::Key(_) | AssetReference::Url(_) => rewritten.push(item.clone()),
                AssetReference::Inline(raw) => {
                    match self.migrate_item(record, index, &raw, dry_run).await {
                        Ok((key, reference)) => {
                            if !dry_run {
                                uploaded.push(key);
                            }
                            stats.assets_migrated += 1;
                            rewritten.push(reference);
                        }
                        Err(message) => {
                            tracing::warn!(
                                record_id = %record.id,
                                index,
                                error = %message,
                                "Failed to migrate inline image, keeping original"
                            );
                            stats.item_error(&record.id, index, message);
                            rewritten.push(item.clone());
                        }
                    }
                }
                AssetReference::Invalid(_) => {
                    stats.item_error(&record.id, index, "unrecognized reference");
                    rewritten.push(item.clone());
                }
            }
        }

        if rewritten == record.primary || dry_run {
            return;
        }

        match self
            .records
            .write_reference_field(
                &record.id,
                ReferenceField::Primary,
                &rewritten,
                Some(record.last_modified_at),
            )
            .await
        {
            Ok(modified_at) => {
                stats.records_updated += 1;
                metrics::ASSETS_MIGRATED.inc_by(uploaded.len() as u64);
                self.mirror_fallback(record, &rewritten, modified_at).await;
            }
            Err(e) => {
                tracing::warn!(
                    record_id = %record.id,
                    uploaded = uploaded.len(),
                    error = %e,
                    "Failed to persist migrated references, removing uploaded objects"
                );
                metrics::MIGRATION_ERRORS.inc();
                stats.assets_migrated -= uploaded.len() as u64;
                stats.errors.push(MigrationError {
                    record_id: record.id.clone(),
                    index: None,
                    message: e.to_string(),
                });
                self.compensate(&record.id, &uploaded).await;
            }
        }
    }

    /// Decode and upload one inline item. Returns the new key and the
    /// reference to store in its place.
    async fn migrate_item(
        &self,
        record: &OwningRecord,
        index: usize,
        raw: &str,
        dry_run: bool,
    ) -> Result<(String, String), String> {
        let payload = InlinePayload::decode_with_default(raw, &self.config.fallback_content_type)
            .map_err(|e| e.to_string())?;
        let filename = naming::migrated_filename(index, &payload.extension());
        let key = StorageKey::build(&record.owner_id, &record.id, &filename).to_path_string();

        if dry_run {
            tracing::info!(
                record_id = %record.id,
                index,
                key = %key,
                bytes = payload.bytes.len(),
                "DRY-RUN: Would migrate inline image"
            );
        } else {
            self.store
                .upload(&key, Bytes::from(payload.bytes), &payload.content_type)
                .await
                .map_err(|e| e.to_string())?;
        }

        let reference = match self.config.reference_style {
            ReferenceStyle::Key => key.clone(),
            ReferenceStyle::PublicUrl => self.store.public_url(&key),
        };
        Ok((key, reference))
    }

    /// Keep a legacy fallback that mirrored an inline cover in step with the new cover.
    async fn mirror_fallback(
        &self,
        record: &OwningRecord,
        rewritten: &[String],
        modified_at: time::OffsetDateTime,
    ) {
        let (Some(fallback), Some(old_cover), Some(new_cover)) = (
            record.fallback.as_deref(),
            record.primary.first(),
            rewritten.first(),
        ) else {
            return;
        };
        if fallback != old_cover || old_cover == new_cover {
            return;
        }

        if let Err(e) = self
            .records
            .write_reference_field(
                &record.id,
                ReferenceField::Fallback,
                std::slice::from_ref(new_cover),
                Some(modified_at),
            )
            .await
        {
            tracing::warn!(
                record_id = %record.id,
                error = %e,
                "Failed to mirror migrated cover to fallback field"
            );
        }
    }

    async fn compensate(&self, record_id: &str, uploaded: &[String]) {
        if uploaded.is_empty() {
            return;
        }
        if let Err(e) = self.store.remove(uploaded).await {
            tracing::warn!(
                record_id = %record_id,
                keys = uploaded.len(),
                error = %e,
                "Failed to remove objects uploaded for an unsaved record (orphaned objects remain)"
            );
        }
    }

    /// Count migrated and pending items without changing anything.
    pub async fn status(&self) -> LifecycleResult<MigrationStatus> {
        let page_size = self.config.page_size.max(1);
        let mut status = MigrationStatus::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .records
                .list_records_with_references(cursor.as_deref(), page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());
            let full_page = page.len() >= page_size;

            for item in page.iter().flat_map(|record| record.primary.iter()) {
                status.total_assets += 1;
                match AssetReference::classify(item) {
                    AssetReference::Key(_) | AssetReference::Url(_) => {
                        status.migrated_assets += 1;
                    }
                    AssetReference::Inline(_) => status.pending_assets += 1,
                    AssetReference::Invalid(_) => status.invalid_assets += 1,
                }
            }

            if !full_page {
                break;
            }
        }

        status.progress_pct = if status.total_assets == 0 {
            100.0
        } else {
            let done = status.total_assets - status.pending_assets;
            (done as f64 / status.total_assets as f64) * 100.0
        };
        Ok(status)
    }
}
