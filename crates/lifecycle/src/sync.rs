//! Attach and clear the single image of a single-image entity (e.g. an avatar).
//!
//! Each call runs to completion in order:
//! read, upload, persist primary, mirror fallback, delete previous, derive URL.
//! Only the primary write is transactional with the upload: if it fails the
//! new object is removed again. Later steps are best-effort.
//!
//! An object the fallback field still names is never deleted. When the
//! fallback could not be rewritten the previous object is kept and the
//! outcome carries a warning instead.

use crate::display::{DisplayResolver, DisplayUrl};
use crate::error::{LifecycleError, LifecycleResult};
use crate::metrics;
use crate::naming;
use bytes::Bytes;
use casa_core::config::SyncConfig;
use casa_core::{StorageKey, extension_for};
use casa_records::{OwningRecord, RecordError, RecordStore, ReferenceField};
use casa_storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

/// Result of [`AssetRecordSync::attach`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttachOutcome {
    pub display_url: Option<String>,
    pub key: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_at: OffsetDateTime,
    /// Set when the previous asset could not be deleted or was kept.
    pub warning: Option<String>,
}

/// Result of [`AssetRecordSync::clear`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    pub success: bool,
    pub warning: Option<String>,
}

pub struct AssetRecordSync {
    store: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    resolver: Arc<DisplayResolver>,
    config: SyncConfig,
}

impl AssetRecordSync {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        resolver: Arc<DisplayResolver>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            records,
            resolver,
            config,
        }
    }

    fn validate_upload(&self, data: &[u8], content_type: &str) -> LifecycleResult<String> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !self
            .config
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&essence))
        {
            return Err(LifecycleError::InvalidInput(format!(
                "content type {essence:?} is not allowed"
            )));
        }
        if data.is_empty() {
            return Err(LifecycleError::InvalidInput("empty upload".to_string()));
        }
        if data.len() as u64 > self.config.max_upload_bytes {
            return Err(LifecycleError::InvalidInput(format!(
                "upload of {} bytes exceeds limit of {} bytes",
                data.len(),
                self.config.max_upload_bytes
            )));
        }
        Ok(essence)
    }

    async fn load(&self, record_id: &str) -> LifecycleResult<OwningRecord> {
        self.records
            .get_record(record_id)
            .await?
            .ok_or_else(|| LifecycleError::RecordStore(RecordError::NotFound(record_id.to_string())))
    }

    /// Store `data` as the record's image and retire the previous one.
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    pub async fn attach(
        &self,
        record_id: &str,
        data: Bytes,
        content_type: &str,
    ) -> LifecycleResult<AttachOutcome> {
        let content_type = self.validate_upload(&data, content_type)?;
        let record = self.load(record_id).await?;
        let previous = current_reference(&record);

        let filename = naming::avatar_filename(&extension_for(&content_type));
        let key = StorageKey::build(&record.owner_id, &record.id, &filename).to_path_string();

        self.store
            .upload(&key, data, &content_type)
            .await
            .map_err(LifecycleError::UploadFailed)?;

        let mut modified_at = match self
            .records
            .write_reference_field(
                record_id,
                ReferenceField::Primary,
                std::slice::from_ref(&key),
                Some(record.last_modified_at),
            )
            .await
        {
            Ok(modified_at) => modified_at,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Primary write failed, removing uploaded object");
                self.rollback(&key).await;
                return Err(LifecycleError::persist(record_id, e));
            }
        };

        let mirrored = self
            .mirror_fallback(record_id, std::slice::from_ref(&key), modified_at)
            .await;
        if let Some(mirrored_at) = mirrored {
            modified_at = mirrored_at;
        }

        let warning = match previous.as_deref() {
            Some(previous) if previous != key => {
                self.delete_previous(&record, previous, mirrored.is_some())
                    .await
            }
            _ => None,
        };

        let display_url = self
            .resolver
            .for_record(Some(&key), Some(modified_at))
            .value;

        tracing::info!(key = %key, replaced = previous.is_some(), "Attached asset");
        Ok(AttachOutcome {
            display_url,
            key,
            last_modified_at: modified_at,
            warning,
        })
    }

    /// Remove the record's image: empty the fields, then delete the object.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, record_id: &str) -> LifecycleResult<ClearOutcome> {
        let record = self.load(record_id).await?;
        let previous = current_reference(&record);

        if record.primary.is_empty() && record.fallback.is_none() {
            return Ok(ClearOutcome {
                success: true,
                warning: None,
            });
        }

        let modified_at = self
            .records
            .write_reference_field(
                record_id,
                ReferenceField::Primary,
                &[],
                Some(record.last_modified_at),
            )
            .await
            .map_err(|e| LifecycleError::persist(record_id, e))?;

        let mirrored = self.mirror_fallback(record_id, &[], modified_at).await;

        let warning = match previous.as_deref() {
            Some(previous) => {
                self.delete_previous(&record, previous, mirrored.is_some())
                    .await
            }
            None => None,
        };

        Ok(ClearOutcome {
            success: true,
            warning,
        })
    }

    /// Cache-busted URL for the record's current image.
    ///
    /// A fallback naming a stored object that no longer exists resolves to
    /// a placeholder.
    pub async fn display_url(&self, record_id: &str) -> LifecycleResult<DisplayUrl> {
        let record = self.load(record_id).await?;
        let reference = current_reference(&record);

        if record.primary.is_empty()
            && let Some(fallback) = reference.as_deref()
            && self.is_missing(fallback).await
        {
            tracing::debug!(record_id = %record_id, fallback = %fallback, "Fallback names a missing object");
            return Ok(DisplayUrl::placeholder());
        }

        Ok(self
            .resolver
            .for_record(reference.as_deref(), Some(record.last_modified_at)))
    }

    /// True only when `reference` is a storage key the store reports absent.
    async fn is_missing(&self, reference: &str) -> bool {
        if !StorageKey::is_valid(reference) {
            return false;
        }
        match self.store.exists(reference).await {
            Ok(exists) => !exists,
            Err(e) => {
                tracing::warn!(key = %reference, error = %e, "Failed to check fallback object");
                false
            }
        }
    }

    async fn rollback(&self, key: &str) {
        match self.store.remove(&[key.to_string()]).await {
            Ok(()) => {
                metrics::SYNC_COMPENSATIONS
                    .with_label_values(&["removed"])
                    .inc();
            }
            Err(e) => {
                metrics::SYNC_COMPENSATIONS
                    .with_label_values(&["failed"])
                    .inc();
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Failed to remove uploaded object after failed write (orphaned object remains)"
                );
            }
        }
    }

    async fn mirror_fallback(
        &self,
        record_id: &str,
        references: &[String],
        modified_at: OffsetDateTime,
    ) -> Option<OffsetDateTime> {
        if !self.config.mirror_fallback {
            return None;
        }
        match self
            .records
            .write_reference_field(
                record_id,
                ReferenceField::Fallback,
                references,
                Some(modified_at),
            )
            .await
        {
            Ok(mirrored_at) => Some(mirrored_at),
            Err(e) => {
                metrics::record_sync_warning("fallback");
                tracing::warn!(
                    record_id = %record_id,
                    error = %e,
                    "Failed to mirror fallback field"
                );
                None
            }
        }
    }

    /// Delete the replaced object if it is a key belonging to the record's owner.
    ///
    /// `fallback_rewritten` is false when the mirror step was skipped or failed,
    /// in which case the fallback field may still name `previous`.
    async fn delete_previous(
        &self,
        record: &OwningRecord,
        previous: &str,
        fallback_rewritten: bool,
    ) -> Option<String> {
        let key = match StorageKey::parse(previous) {
            Ok(key) if StorageKey::is_valid(previous) && key.owned_by(&record.owner_id) => key,
            _ => {
                tracing::debug!(
                    previous = %previous,
                    "Previous reference is not an owned storage key, leaving it"
                );
                return None;
            }
        };

        if !fallback_rewritten && record.fallback.as_deref() == Some(previous) {
            metrics::record_sync_warning("fallback_retains_previous");
            tracing::warn!(
                record_id = %record.id,
                key = %key,
                "Fallback field still references previous asset, keeping it"
            );
            return Some(format!(
                "previous asset {key} was kept: fallback field still references it"
            ));
        }

        match self.store.remove(&[key.to_path_string()]).await {
            Ok(()) => None,
            Err(e) => {
                metrics::record_sync_warning("delete_previous");
                tracing::warn!(key = %key, error = %e, "Failed to delete previous asset");
                Some(format!("previous asset {key} was not deleted: {e}"))
            }
        }
    }
}

/// The record's current image: primary cover, else the legacy fallback.
fn current_reference(record: &OwningRecord) -> Option<String> {
    record
        .primary
        .first()
        .or(record.fallback.as_ref())
        .filter(|r| !r.is_empty())
        .cloned()
}
