use casa_core::config::AppConfig;
use casa_lifecycle::Services;
use casa_records::RecordStore;
use casa_storage::ObjectStore;
use std::sync::Arc;

/// An 8-byte PNG signature as an inline payload.
#[allow(dead_code)]
pub const INLINE_PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

/// A payload with a non-image media type; stored as the fallback type.
#[allow(dead_code)]
pub const INLINE_TEXT_AS_JPEG: &str = "data:text/plain;base64,aGVsbG8=";

/// Testing config with no pause between migrated records.
#[allow(dead_code)]
pub fn testing_config() -> AppConfig {
    AppConfig::for_testing(std::path::Path::new("/nonexistent"))
}

/// Services wired over the given doubles with testing defaults.
#[allow(dead_code)]
pub fn services(store: Arc<dyn ObjectStore>, records: Arc<dyn RecordStore>) -> Services {
    Services::new(store, records, &testing_config())
}
