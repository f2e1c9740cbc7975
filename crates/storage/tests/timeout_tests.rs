// Timeout decorator behavior over a real backend

mod common;

use casa_storage::{StorageError, TimeoutStore, traits::ObjectStore};
use common::{InstrumentedBackend, filesystem_backend, seeded_bytes};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_stalled_remove_times_out_without_retry() {
    let temp_dir = TempDir::new().unwrap();
    let backend = InstrumentedBackend::new(filesystem_backend(temp_dir.path()).await)
        .with_remove_delay(Duration::from_secs(5));
    let remove_calls = backend.remove_calls.clone();
    let store = TimeoutStore::new(backend, Duration::from_millis(50));

    store
        .upload("u/e/a.jpg", seeded_bytes(7, 8), "image/jpeg")
        .await
        .unwrap();

    let result = store.remove(&["u/e/a.jpg".to_string()]).await;
    assert!(matches!(result, Err(StorageError::Timeout(_))));
    assert_eq!(remove_calls.load(Ordering::SeqCst), 1);

    // The abandoned call never reached the backend.
    assert!(store.exists("u/e/a.jpg").await.unwrap());
}

#[tokio::test]
async fn test_timeout_store_delegates_urls() {
    let temp_dir = TempDir::new().unwrap();
    let store = TimeoutStore::new(
        filesystem_backend(temp_dir.path()).await,
        Duration::from_secs(5),
    );

    assert_eq!(
        store.public_url("u/e/a.jpg"),
        "http://localhost/storage/u/e/a.jpg"
    );
    assert_eq!(store.backend_name(), "filesystem");

    store
        .upload("u/e/a.jpg", seeded_bytes(1, 8), "image/png")
        .await
        .unwrap();
    let signed = store
        .signed_url("u/e/a.jpg", Duration::from_secs(900))
        .await
        .unwrap();
    assert!(signed.url.contains("signature="));
}
