//! Owning-record store abstraction and implementations for Casa.
//!
//! Owning records are the database entities (properties, profiles, posts)
//! whose image reference fields this system keeps in sync with storage.

pub mod error;
pub mod memory;
pub mod models;
pub mod store;
pub mod timeout;

pub use error::{RecordError, RecordResult};
pub use memory::MemoryRecordStore;
pub use models::{FieldValue, OwningRecord, ReferenceField};
pub use store::{RecordStore, SqliteRecordStore};
pub use timeout::TimeoutRecordStore;

use casa_core::config::RecordsConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a record store from configuration, bounding each call by `call_timeout`.
pub async fn from_config(
    config: &RecordsConfig,
    call_timeout: Duration,
) -> RecordResult<Arc<dyn RecordStore>> {
    config.validate().map_err(RecordError::Config)?;

    match config {
        RecordsConfig::Sqlite { path, collection } => {
            let store = SqliteRecordStore::new(path, collection.clone()).await?;
            tracing::info!(path = %path.display(), collection = %collection, "Opened SQLite record store");
            Ok(Arc::new(TimeoutRecordStore::new(store, call_timeout)))
        }
    }
}
