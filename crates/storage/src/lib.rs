//! Object store gateway and backends for the Casa media lifecycle.
//!
//! This crate provides:
//! - The [`ObjectStore`] capability interface (list, upload, remove, URLs)
//! - Backends: local filesystem and S3-compatible
//! - A per-call timeout decorator

pub mod backends;
pub mod error;
pub mod timeout;
pub mod traits;

pub use backends::{
    filesystem::FilesystemBackend,
    s3::{S3Backend, S3Settings},
};
pub use error::{StorageError, StorageResult};
pub use timeout::TimeoutStore;
pub use traits::{DEFAULT_LIST_LIMIT, ListOptions, ObjectEntry, ObjectStore, SignedUrl};

use casa_core::config::StorageConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create an object store from configuration, bounding each call by `call_timeout`.
pub async fn from_config(
    config: &StorageConfig,
    call_timeout: Duration,
) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem {
            path,
            public_base_url,
            signing_secret,
        } => {
            let backend =
                FilesystemBackend::new(path, public_base_url.clone(), signing_secret.clone())
                    .await?;
            Ok(Arc::new(TimeoutStore::new(backend, call_timeout)))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            public_base_url,
        } => {
            let backend = S3Backend::new(S3Settings {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                region: region.clone(),
                prefix: prefix.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                force_path_style: *force_path_style,
                public_base_url: public_base_url.clone(),
            })
            .await?;
            Ok(Arc::new(TimeoutStore::new(backend, call_timeout)))
        }
    }
}
