//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
        /// Base URL under which the root directory is publicly served.
        #[serde(default = "default_public_base_url")]
        public_base_url: String,
        /// Secret used to sign time-boxed URLs.
        /// WARNING: Prefer CASA_STORAGE__SIGNING_SECRET over storing it in config.
        #[serde(default)]
        signing_secret: Option<String>,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to AWS_ACCESS_KEY_ID env var if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to AWS_SECRET_ACCESS_KEY env var if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
        /// Public base URL for unsigned object links. Derived from the
        /// endpoint and bucket when absent.
        #[serde(default)]
        public_base_url: Option<String>,
    },
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/storage".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
            public_base_url: default_public_base_url(),
            signing_secret: None,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a non-empty bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem {
                public_base_url, ..
            } => {
                if public_base_url.trim().is_empty() {
                    return Err("filesystem config requires a public_base_url".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Record store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordsConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Collection of owning records this process manages
        /// (e.g. "properties", "profiles", "roommate_posts").
        #[serde(default = "default_collection")]
        collection: String,
    },
}

fn default_collection() -> String {
    "properties".to_string()
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/records.db"),
            collection: default_collection(),
        }
    }
}

impl RecordsConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RecordsConfig::Sqlite { collection, .. } => {
                if collection.is_empty()
                    || !collection
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(format!(
                        "records.collection {collection:?} must be non-empty and use [a-zA-Z0-9_-]"
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Bulk cleanup configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Keys per remove call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum entries returned by one listing call.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

fn default_batch_size() -> usize {
    100
}

fn default_list_page_size() -> usize {
    100
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            list_page_size: default_list_page_size(),
        }
    }
}

/// How migrated items are written back into reference lists.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStyle {
    /// Store the bare storage key.
    #[default]
    Key,
    /// Store the public URL of the uploaded object.
    PublicUrl,
}

/// Inline-to-storage migration configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Pause between records in milliseconds.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Records fetched per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Form of the reference written for migrated items.
    #[serde(default)]
    pub reference_style: ReferenceStyle,
    /// Content type for payloads that do not declare an image type.
    #[serde(default = "default_fallback_content_type")]
    pub fallback_content_type: String,
}

fn default_batch_pause_ms() -> u64 {
    100
}

fn default_page_size() -> usize {
    50
}

fn default_fallback_content_type() -> String {
    crate::inline::DEFAULT_CONTENT_TYPE.to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_pause_ms: default_batch_pause_ms(),
            page_size: default_page_size(),
            reference_style: ReferenceStyle::default(),
            fallback_content_type: default_fallback_content_type(),
        }
    }
}

impl MigrationConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

/// Single-image attach/clear configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Content types accepted by attach.
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
    /// Maximum accepted upload size in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Mirror the primary image into the legacy fallback field.
    #[serde(default = "default_mirror_fallback")]
    pub mirror_fallback: bool,
}

fn default_allowed_content_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/webp".to_string(),
    ]
}

fn default_max_upload_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_mirror_fallback() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            allowed_content_types: default_allowed_content_types(),
            max_upload_bytes: default_max_upload_bytes(),
            mirror_fallback: default_mirror_fallback(),
        }
    }
}

/// Display URL configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Lifetime of signed URLs in seconds.
    #[serde(default = "default_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,
}

fn default_signed_url_ttl_secs() -> u64 {
    900
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            signed_url_ttl_secs: default_signed_url_ttl_secs(),
        }
    }
}

impl DisplayConfig {
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Record store configuration.
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    /// Upper bound on any single store call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            records: RecordsConfig::default(),
            cleanup: CleanupConfig::default(),
            migration: MigrationConfig::default(),
            sync: SyncConfig::default(),
            display: DisplayConfig::default(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Create a test configuration rooted at the given directory.
    ///
    /// **For testing only.**
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            storage: StorageConfig::Filesystem {
                path: root.join("storage"),
                public_base_url: "http://localhost/storage".to_string(),
                signing_secret: Some("test-secret".to_string()),
            },
            records: RecordsConfig::Sqlite {
                path: root.join("records.db"),
                collection: default_collection(),
            },
            cleanup: CleanupConfig::default(),
            migration: MigrationConfig {
                batch_pause_ms: 0,
                ..MigrationConfig::default()
            },
            sync: SyncConfig::default(),
            display: DisplayConfig::default(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.records.validate()?;
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs cannot be 0".to_string());
        }
        if self.migration.page_size == 0 {
            return Err("migration.page_size cannot be 0".to_string());
        }
        if self.cleanup.list_page_size == 0 {
            return Err("cleanup.list_page_size cannot be 0".to_string());
        }
        if self.sync.allowed_content_types.is_empty() {
            return Err("sync.allowed_content_types cannot be empty".to_string());
        }
        Ok(())
    }
}
