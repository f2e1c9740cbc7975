//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ListOptions, ObjectEntry, ObjectStore, SignedUrl, expiry_after};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Directory under the root that holds in-flight writes.
const TEMP_DIR: &str = ".casa-tmp";

/// Local filesystem object store.
///
/// Objects live at `root/<key>`. The root is assumed to be served publicly
/// under `public_base_url`; signed URLs carry an expiry and an HMAC-style
/// SHA-256 signature that the serving layer checks with [`Self::verify_signature`].
pub struct FilesystemBackend {
    root: PathBuf,
    public_base_url: String,
    signing_secret: Option<String>,
}

impl std::fmt::Debug for FilesystemBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemBackend")
            .field("root", &self.root)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(
        root: impl AsRef<Path>,
        public_base_url: impl Into<String>,
        signing_secret: Option<String>,
    ) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(TEMP_DIR)).await?;
        Ok(Self {
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            signing_secret,
        })
    }

    /// Get the full path for a key, with path traversal protection.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Synchronous key path validation.
    ///
    /// Returns an error if the key would escape the storage root, including
    /// through symlinks inside the root.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }

        for component in Path::new(key).components() {
            match component {
                std::path::Component::Normal(name) if name != TEMP_DIR => {}
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "contains unsafe path component: {key}"
                    )));
                }
            }
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Walk from the path itself up to the nearest existing ancestor and
        // make sure it resolves inside the root.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let canonical = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize path: {e}"),
                            ))
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
            candidate = current.parent();
        }

        Ok(path)
    }

    fn signature(&self, secret: &str, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hasher.update(expires.to_string().as_bytes());
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check a signature produced by [`ObjectStore::signed_url`].
    ///
    /// Returns false when no secret is configured, the signature does not
    /// match, or `now_unix` is past `expires`.
    pub fn verify_signature(&self, key: &str, expires: i64, signature: &str, now_unix: i64) -> bool {
        let Some(secret) = self.signing_secret.as_deref() else {
            return false;
        };
        if now_unix > expires {
            return false;
        }
        let expected = self.signature(secret, key, expires);
        expected.len() == signature.len()
            && expected
                .bytes()
                .zip(signature.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str, options: ListOptions) -> StorageResult<Vec<ObjectEntry>> {
        let dir_key = prefix.trim_end_matches('/');
        let base_path = if dir_key.is_empty() {
            self.root.clone()
        } else {
            self.key_path(dir_key).await?
        };

        match fs::try_exists(&base_path).await {
            Ok(false) => return Ok(Vec::new()),
            Ok(true) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut entries = Vec::new();
        let mut stack = vec![base_path.clone()];
        while let Some(dir) = stack.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks; links are skipped.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if entry.file_name() != TEMP_DIR {
                        stack.push(path);
                    }
                } else if file_type.is_file()
                    && let Ok(rel) = path.strip_prefix(&base_path)
                {
                    let name = rel.to_string_lossy().replace('\\', "/");
                    if !options.admits(&name) {
                        continue;
                    }
                    let size = entry.metadata().await?.len();
                    let key = if dir_key.is_empty() {
                        name.clone()
                    } else {
                        format!("{dir_key}/{name}")
                    };
                    entries.push(ObjectEntry { name, key, size });
                }
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries.truncate(options.limit);
        Ok(entries)
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a uniquely named temp file, fsync, then rename into place.
        let temp_path = self.root.join(TEMP_DIR).join(Uuid::new_v4().to_string());
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        tracing::debug!(key = %key, content_type = %content_type, "Stored object");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem", count = keys.len()))]
    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        // Validate every key before touching anything.
        let mut paths = Vec::with_capacity(keys.len());
        for key in keys {
            paths.push(self.key_path(key).await?);
        }

        for path in paths {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl> {
        let secret = self.signing_secret.as_deref().ok_or_else(|| {
            StorageError::Config("filesystem signing_secret is not configured".to_string())
        })?;

        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let expires_at = expiry_after(ttl)?;
        let expires = expires_at.unix_timestamp();
        let signature = self.signature(secret, key, expires);
        Ok(SignedUrl {
            url: format!(
                "{}?expires={expires}&signature={signature}",
                self.public_url(key)
            ),
            expires_at,
        })
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend(dir: &Path) -> FilesystemBackend {
        FilesystemBackend::new(dir, "http://localhost/storage/", Some("secret".to_string()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path()).await;

        for name in ["b.jpg", "a.jpg", "c.png"] {
            backend
                .upload(
                    &format!("user1/prop1/{name}"),
                    Bytes::from_static(b"img"),
                    "image/jpeg",
                )
                .await
                .unwrap();
        }
        backend
            .upload("user1/prop2/x.jpg", Bytes::from_static(b"img"), "image/jpeg")
            .await
            .unwrap();

        let entries = backend
            .list("user1/prop1/", ListOptions::default())
            .await
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.png"]);
        assert_eq!(entries[0].key, "user1/prop1/a.jpg");
        assert_eq!(entries[0].size, 3);

        backend
            .remove(&["user1/prop1/a.jpg".to_string(), "user1/prop1/missing.jpg".to_string()])
            .await
            .unwrap();
        assert!(!backend.exists("user1/prop1/a.jpg").await.unwrap());
        assert!(backend.exists("user1/prop1/b.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_pages_with_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path()).await;
        for i in 0..5 {
            backend
                .upload(&format!("u/e/{i}.jpg"), Bytes::from_static(b"x"), "image/jpeg")
                .await
                .unwrap();
        }

        let first = backend.list("u/e/", ListOptions::new(2)).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = backend
            .list("u/e/", ListOptions::new(2).after(first[1].name.clone()))
            .await
            .unwrap();
        assert_eq!(second[0].name, "2.jpg");
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path()).await;
        assert!(
            backend
                .list("nobody/nothing/", ListOptions::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_public_url_trims_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path()).await;
        assert_eq!(
            backend.public_url("u/e/a.jpg"),
            "http://localhost/storage/u/e/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_signed_url_roundtrip_and_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path()).await;

        let missing = backend.signed_url("u/e/a.jpg", Duration::from_secs(900)).await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));

        backend
            .upload("u/e/a.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await
            .unwrap();
        let signed = backend
            .signed_url("u/e/a.jpg", Duration::from_secs(900))
            .await
            .unwrap();
        assert!(signed.url.starts_with("http://localhost/storage/u/e/a.jpg?expires="));

        let expires = signed.expires_at.unix_timestamp();
        let signature = signed.url.rsplit("signature=").next().unwrap();
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        assert!(backend.verify_signature("u/e/a.jpg", expires, signature, now));
        assert!(!backend.verify_signature("u/e/b.jpg", expires, signature, now));
        assert!(!backend.verify_signature("u/e/a.jpg", expires, signature, expires + 1));
    }

    #[tokio::test]
    async fn test_signed_url_requires_secret() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), "http://localhost", None)
            .await
            .unwrap();
        let result = backend.signed_url("u/e/a.jpg", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path()).await;

        assert!(backend.exists("../escape").await.is_err());
        assert!(backend.exists("/absolute/path").await.is_err());
        assert!(backend.exists("foo/../bar").await.is_err());
        assert!(backend.exists(".casa-tmp/anything").await.is_err());
        assert!(
            backend
                .remove(&["ok/key/a.jpg".to_string(), "../etc/passwd".to_string()])
                .await
                .is_err()
        );

        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path()).await;

        symlink(outside_dir.path(), dir.path().join("escape")).unwrap();

        let result = backend
            .upload("escape/nested/file.jpg", Bytes::from_static(b"x"), "image/jpeg")
            .await;
        match result {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes storage root")),
            other => panic!("expected InvalidKey error, got: {other:?}"),
        }
        assert!(!outside_dir.path().join("nested").exists());
    }
}
