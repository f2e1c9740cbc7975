//! Delete everything under an owner/entity prefix, and verify nothing is left.
//!
//! `delete_all` and `verify` are independent operations. A provider's delete
//! acknowledgment is not proof that a later listing will come back empty, so
//! callers needing a guarantee run both and treat `verify` as authoritative.

use crate::batch::{BatchDeleter, BatchResult};
use crate::error::{LifecycleError, LifecycleResult};
use crate::metrics;
use casa_core::StorageKey;
use casa_core::config::CleanupConfig;
use casa_storage::{ListOptions, ObjectStore};
use serde::Serialize;
use std::sync::Arc;

/// Result of [`CleanupService::delete_all`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub success: bool,
    pub deleted_keys: Vec<String>,
    pub errors: Vec<String>,
}

impl From<BatchResult> for CleanupReport {
    fn from(result: BatchResult) -> Self {
        Self {
            success: result.success(),
            errors: result.error_messages(),
            deleted_keys: result.succeeded,
        }
    }
}

/// Result of [`CleanupService::verify`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub is_clean: bool,
    pub remaining: Vec<String>,
}

/// Both halves of a checked cleanup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckedCleanup {
    pub cleanup: CleanupReport,
    pub verify: VerifyReport,
}

impl CheckedCleanup {
    /// Whether storage is actually clean, regardless of what delete reported.
    pub fn is_clean(&self) -> bool {
        self.verify.is_clean
    }
}

pub struct CleanupService {
    store: Arc<dyn ObjectStore>,
    deleter: BatchDeleter,
    config: CleanupConfig,
}

impl CleanupService {
    pub fn new(store: Arc<dyn ObjectStore>, config: CleanupConfig) -> Self {
        Self {
            deleter: BatchDeleter::new(store.clone()),
            store,
            config,
        }
    }

    fn prefix(owner_id: &str, entity_id: &str) -> LifecycleResult<String> {
        for segment in [owner_id, entity_id] {
            if !StorageKey::is_valid_segment(segment) {
                return Err(LifecycleError::KeyInvalid(format!(
                    "invalid prefix segment: {segment:?}"
                )));
            }
        }
        Ok(StorageKey::prefix(owner_id, entity_id))
    }

    /// All keys under `owner_id/entity_id/`, name ascending.
    ///
    /// Pages through the store `list_page_size` entries at a time. A listing
    /// failure is returned as an error, never as an empty result.
    pub async fn list_assets(
        &self,
        owner_id: &str,
        entity_id: &str,
    ) -> LifecycleResult<Vec<String>> {
        let prefix = Self::prefix(owner_id, entity_id)?;
        let page_size = self.config.list_page_size.max(1);

        let mut keys = Vec::new();
        let mut options = ListOptions::new(page_size);
        loop {
            let page = self.store.list(&prefix, options.clone()).await?;
            let Some(last) = page.last() else {
                break;
            };
            let next = options.clone().after(last.name.clone());
            let full_page = page.len() >= page_size;
            keys.extend(page.into_iter().map(|entry| entry.key));
            if !full_page {
                break;
            }
            options = next;
        }

        Ok(keys)
    }

    /// Delete every asset under the prefix.
    ///
    /// An empty listing returns a successful report without calling `remove`.
    #[tracing::instrument(skip(self))]
    pub async fn delete_all(
        &self,
        owner_id: &str,
        entity_id: &str,
    ) -> LifecycleResult<CleanupReport> {
        let keys = self.list_assets(owner_id, entity_id).await?;
        if keys.is_empty() {
            tracing::debug!("No assets to delete");
            return Ok(CleanupReport {
                success: true,
                ..CleanupReport::default()
            });
        }

        let result = self.deleter.delete_all(&keys, self.config.batch_size).await;
        let report = CleanupReport::from(result);

        if report.success {
            tracing::info!(deleted = report.deleted_keys.len(), "Deleted entity assets");
        } else {
            tracing::warn!(
                listed = keys.len(),
                deleted = report.deleted_keys.len(),
                failed_batches = report.errors.len(),
                "Entity asset deletion partially failed"
            );
        }
        Ok(report)
    }

    /// List the prefix again and report what is still there.
    #[tracing::instrument(skip(self))]
    pub async fn verify(&self, owner_id: &str, entity_id: &str) -> LifecycleResult<VerifyReport> {
        let remaining = self.list_assets(owner_id, entity_id).await?;
        if !remaining.is_empty() {
            metrics::VERIFY_REMAINING.inc_by(remaining.len() as u64);
            tracing::warn!(remaining = remaining.len(), "Assets remain after cleanup");
        }
        Ok(VerifyReport {
            is_clean: remaining.is_empty(),
            remaining,
        })
    }

    /// Run `delete_all` then `verify`.
    pub async fn delete_and_verify(
        &self,
        owner_id: &str,
        entity_id: &str,
    ) -> LifecycleResult<CheckedCleanup> {
        let cleanup = self.delete_all(owner_id, entity_id).await?;
        let verify = self.verify(owner_id, entity_id).await?;
        Ok(CheckedCleanup { cleanup, verify })
    }
}
