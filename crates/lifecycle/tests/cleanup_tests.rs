// Cleanup: batched deletion, verification, and failure propagation

mod common;

use casa_core::config::CleanupConfig;
use casa_lifecycle::{CleanupService, LifecycleError};
use casa_storage::{FilesystemBackend, ObjectStore};
use common::ScriptedStore;
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn image_keys(owner: &str, entity: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{owner}/{entity}/image_{i:03}.jpg"))
        .collect()
}

#[tokio::test]
async fn test_partial_batch_failure_then_verify() {
    let store = Arc::new(ScriptedStore::new());
    store.seed_many(image_keys("user1", "prop1", 250));
    store.script_removes([None, Some("Permission denied"), None]);

    let service = CleanupService::new(store.clone(), CleanupConfig::default());
    let report = service.delete_all("user1", "prop1").await.unwrap();

    assert_eq!(store.remove_call_count(), 3);
    assert!(!report.success);
    assert_eq!(report.errors, vec!["Batch 100-199: Permission denied"]);
    assert_eq!(report.deleted_keys.len(), 150);

    let verify = service.verify("user1", "prop1").await.unwrap();
    assert!(!verify.is_clean);
    assert_eq!(verify.remaining.len(), 100);
    assert_eq!(verify.remaining.first().unwrap(), "user1/prop1/image_100.jpg");
    assert_eq!(verify.remaining.last().unwrap(), "user1/prop1/image_199.jpg");
}

#[tokio::test]
async fn test_listing_pages_past_first_hundred() {
    let store = Arc::new(ScriptedStore::new());
    store.seed_many(image_keys("user1", "prop1", 250));

    let service = CleanupService::new(store.clone(), CleanupConfig::default());
    let keys = service.list_assets("user1", "prop1").await.unwrap();

    assert_eq!(keys.len(), 250);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_empty_prefix_is_a_successful_noop() {
    let store = Arc::new(ScriptedStore::new());
    let service = CleanupService::new(store.clone(), CleanupConfig::default());

    let report = service.delete_all("user1", "gone").await.unwrap();
    assert!(report.success);
    assert!(report.deleted_keys.is_empty());
    assert!(report.errors.is_empty());
    assert_eq!(store.remove_call_count(), 0);

    assert!(service.verify("user1", "gone").await.unwrap().is_clean);
}

#[tokio::test]
async fn test_cleanup_is_scoped_to_entity() {
    let store = Arc::new(ScriptedStore::new());
    store.seed_many(image_keys("user1", "prop1", 5));
    store.seed_many(image_keys("user1", "prop10", 3));
    store.seed_many(image_keys("user2", "prop1", 2));

    let service = CleanupService::new(store.clone(), CleanupConfig::default());
    let checked = service.delete_and_verify("user1", "prop1").await.unwrap();

    assert!(checked.cleanup.success);
    assert!(checked.is_clean());
    assert_eq!(store.keys().len(), 5);
    assert!(store.contains("user1/prop10/image_000.jpg"));
    assert!(store.contains("user2/prop1/image_001.jpg"));
}

#[tokio::test]
async fn test_verify_reports_listing_errors() {
    let store = Arc::new(ScriptedStore::new());
    store.seed_many(image_keys("user1", "prop1", 3));
    store.fail_lists("connection reset");

    let service = CleanupService::new(store.clone(), CleanupConfig::default());

    let err = service.verify("user1", "prop1").await.unwrap_err();
    assert!(matches!(err, LifecycleError::StoreUnavailable(_)));

    let err = service.delete_all("user1", "prop1").await.unwrap_err();
    assert!(matches!(err, LifecycleError::StoreUnavailable(_)));
    assert_eq!(store.remove_call_count(), 0);
}

#[tokio::test]
async fn test_verify_is_independent_of_delete_report() {
    let store = Arc::new(ScriptedStore::new());
    store.seed_many(image_keys("user1", "prop1", 10));
    // The provider rejects the call; nothing is removed.
    store.script_removes([Some("throttled")]);

    let service = CleanupService::new(
        store.clone(),
        CleanupConfig {
            batch_size: 10,
            list_page_size: 100,
        },
    );
    let checked = service.delete_and_verify("user1", "prop1").await.unwrap();

    assert!(!checked.cleanup.success);
    assert!(!checked.is_clean());
    assert_eq!(checked.verify.remaining.len(), 10);
}

#[tokio::test]
async fn test_rejects_unsafe_prefix() {
    let store = Arc::new(ScriptedStore::new());
    let service = CleanupService::new(store.clone(), CleanupConfig::default());

    let err = service.delete_all("user1/..", "prop1").await.unwrap_err();
    assert!(matches!(err, LifecycleError::KeyInvalid(_)));
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_filesystem_cleanup_end_to_end() {
    let temp_dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(temp_dir.path(), "http://localhost/storage", None)
        .await
        .unwrap();
    for key in image_keys("user1", "post7", 12) {
        backend
            .upload(&key, bytes::Bytes::from_static(b"img"), "image/jpeg")
            .await
            .unwrap();
    }
    backend
        .upload(
            "user1/post8/keep.jpg",
            bytes::Bytes::from_static(b"img"),
            "image/jpeg",
        )
        .await
        .unwrap();

    let store: Arc<dyn ObjectStore> = Arc::new(backend);
    let service = CleanupService::new(
        store.clone(),
        CleanupConfig {
            batch_size: 5,
            list_page_size: 4,
        },
    );

    let checked = service.delete_and_verify("user1", "post7").await.unwrap();
    assert!(checked.cleanup.success);
    assert_eq!(checked.cleanup.deleted_keys.len(), 12);
    assert!(checked.is_clean());
    assert!(store.exists("user1/post8/keep.jpg").await.unwrap());
}
