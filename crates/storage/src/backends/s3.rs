//! S3-compatible storage backend using AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ListOptions, ObjectEntry, ObjectStore, SignedUrl, expiry_after};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bytes::Bytes;
use std::time::Duration;
use tracing::instrument;

/// S3 accepts at most this many keys per DeleteObjects request.
const MAX_DELETE_KEYS: usize = 1000;

/// S3 returns at most this many keys per ListObjectsV2 page.
const MAX_LIST_PAGE: usize = 1000;

fn map_s3_operation_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

fn is_not_found<E>(err: &aws_sdk_s3::error::SdkError<E>) -> bool {
    matches!(
        err,
        aws_sdk_s3::error::SdkError::ServiceError(service_err)
            if service_err.raw().status().as_u16() == 404
    )
}

/// Connection settings for [`S3Backend::new`].
#[derive(Clone, Debug, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub prefix: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Use path-style URLs (`endpoint/bucket/key`). Required for MinIO.
    pub force_path_style: bool,
    pub public_base_url: Option<String>,
}

/// S3-compatible object store using AWS SDK.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Base URL for unsigned object links, without trailing slash.
    public_base_url: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    pub async fn new(settings: S3Settings) -> StorageResult<Self> {
        let S3Settings {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            public_base_url,
        } = settings;

        if access_key_id.is_some() ^ secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut s3_config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials = Credentials::new(key_id, secret, None, None, "casa-config");
            s3_config_builder = s3_config_builder.credentials_provider(credentials);
        } else {
            let chain = DefaultCredentialsChain::builder()
                .region(aws_config::Region::new(resolved_region.clone()))
                .build()
                .await;
            s3_config_builder = s3_config_builder.credentials_provider(chain);
        }

        // Bare host:port endpoints (e.g. "minio:9000") get an http:// scheme.
        let normalized_endpoint = endpoint.map(|endpoint_url| {
            let lower = endpoint_url.to_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            }
        });

        if let Some(endpoint_url) = &normalized_endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);

            // Plain HTTP endpoints get an HTTP-only client so initialization
            // does not depend on native trust roots.
            if endpoint_url.to_ascii_lowercase().starts_with("http://") {
                s3_config_builder =
                    s3_config_builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }
        }

        if force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        let public_base_url = match (public_base_url, &normalized_endpoint) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(endpoint_url)) => {
                format!("{}/{}", endpoint_url.trim_end_matches('/'), bucket)
            }
            (None, None) => format!("https://{bucket}.s3.{resolved_region}.amazonaws.com"),
        };

        // Strip trailing slashes to avoid "prefix//key".
        let prefix = prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            client,
            bucket,
            prefix,
            public_base_url,
        })
    }

    /// Get the full object key for a key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    /// Strip the configured prefix from a full object key.
    fn strip_prefix<'a>(&self, full_key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(full_key),
            None => full_key,
        }
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list(&self, prefix: &str, options: ListOptions) -> StorageResult<Vec<ObjectEntry>> {
        let full_prefix = self.full_key(prefix);
        let mut results = Vec::new();
        let mut continuation_token: Option<String> = None;

        while results.len() < options.limit {
            let page = (options.limit - results.len()).min(MAX_LIST_PAGE);
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix)
                .max_keys(i32::try_from(page).unwrap_or(i32::MAX));

            match continuation_token.take() {
                Some(token) => request = request.continuation_token(token),
                None => {
                    if let Some(after) = &options.start_after {
                        request = request.start_after(format!("{full_prefix}{after}"));
                    }
                }
            }

            let output = request.send().await.map_err(map_s3_operation_error)?;

            for obj in output.contents() {
                let Some(obj_key) = obj.key() else { continue };
                let key = self.strip_prefix(obj_key);
                let Some(name) = key.strip_prefix(prefix) else {
                    continue;
                };
                if name.is_empty() || !options.admits(name) {
                    continue;
                }
                results.push(ObjectEntry {
                    name: name.to_string(),
                    key: key.to_string(),
                    size: obj.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                });
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        results.truncate(options.limit);
        Ok(results)
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .content_type(content_type)
            .body(data.into())
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3", count = keys.len()))]
    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        if keys.len() > MAX_DELETE_KEYS {
            return Err(StorageError::InvalidKey(format!(
                "remove accepts at most {MAX_DELETE_KEYS} keys per call, got {}",
                keys.len()
            )));
        }

        let objects = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(self.full_key(key))
                    .build()
                    .map_err(|e| StorageError::InvalidKey(format!("{key}: {e}")))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::Config(format!("invalid delete request: {e}")))?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        // Quiet mode only reports failures.
        if let Some(first) = output.errors().first() {
            for error in output.errors() {
                tracing::warn!(
                    key = error.key().unwrap_or("N/A"),
                    code = error.code().unwrap_or("N/A"),
                    message = error.message().unwrap_or("N/A"),
                    "S3 refused to delete object"
                );
            }
            return Err(StorageError::Provider(
                first
                    .message()
                    .or(first.code())
                    .unwrap_or("delete failed")
                    .to_string(),
            ));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(map_s3_operation_error(err)),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, self.full_key(key))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl> {
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let expires_at = expiry_after(ttl)?;
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Config(format!("invalid presign config: {e}")))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .presigned(config)
            .await
            .map_err(map_s3_operation_error)?;

        Ok(SignedUrl {
            url: presigned.uri().to_string(),
            expires_at,
        })
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

        let request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send();

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, request)
            .await
            .map_err(|_| {
                StorageError::Timeout("S3 health check timed out after 10 seconds".to_string())
            })?
            .map_err(map_s3_operation_error)?;
        Ok(())
    }
}
