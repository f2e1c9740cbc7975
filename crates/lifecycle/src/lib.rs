//! Media asset lifecycle services for Casa.
//!
//! Keeps owning-record image references consistent with what exists in
//! object storage:
//! - [`CleanupService`]: delete everything under an owner/entity prefix and
//!   verify that nothing remains
//! - [`MigrationService`]: move inline `data:` images into storage
//! - [`AssetRecordSync`]: attach/clear the image of a single-image entity
//! - [`DisplayResolver`]: public, signed, and cache-busted display URLs

pub mod batch;
pub mod cleanup;
pub mod display;
pub mod error;
pub mod metrics;
pub mod migration;
pub mod naming;
pub mod sync;

pub use batch::{BatchDeleter, BatchFailure, BatchResult, DEFAULT_BATCH_SIZE};
pub use cleanup::{CheckedCleanup, CleanupReport, CleanupService, VerifyReport};
pub use display::{
    DisplayResolver, DisplayUrl, SignedEntry, SignedUrls, SigningFailure, cache_busted,
};
pub use error::{LifecycleError, LifecycleResult};
pub use migration::{
    MigrationError, MigrationOptions, MigrationService, MigrationStats, MigrationStatus,
};
pub use sync::{AssetRecordSync, AttachOutcome, ClearOutcome};

use casa_core::config::AppConfig;
use casa_records::RecordStore;
use casa_storage::ObjectStore;
use std::sync::Arc;

/// Every service wired to one object store and one record store.
pub struct Services {
    pub store: Arc<dyn ObjectStore>,
    pub records: Arc<dyn RecordStore>,
    pub cleanup: CleanupService,
    pub migration: MigrationService,
    pub sync: AssetRecordSync,
    pub display: Arc<DisplayResolver>,
}

impl Services {
    /// Wire the services over existing collaborators.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        config: &AppConfig,
    ) -> Self {
        let display = Arc::new(DisplayResolver::new(
            store.clone(),
            config.display.signed_url_ttl(),
        ));
        Self {
            cleanup: CleanupService::new(store.clone(), config.cleanup.clone()),
            migration: MigrationService::new(
                store.clone(),
                records.clone(),
                config.migration.clone(),
            ),
            sync: AssetRecordSync::new(
                store.clone(),
                records.clone(),
                display.clone(),
                config.sync.clone(),
            ),
            display,
            store,
            records,
        }
    }

    /// Open the configured stores and wire the services.
    pub async fn from_config(config: &AppConfig) -> LifecycleResult<Self> {
        config.validate().map_err(LifecycleError::InvalidInput)?;
        let store = casa_storage::from_config(&config.storage, config.call_timeout()).await?;
        let records = casa_records::from_config(&config.records, config.call_timeout()).await?;
        Ok(Self::new(store, records, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_services_from_testing_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::for_testing(dir.path());
        let services = Services::from_config(&config).await.unwrap();

        services.store.health_check().await.unwrap();
        services.records.health_check().await.unwrap();
        assert_eq!(services.store.backend_name(), "filesystem");
    }
}
