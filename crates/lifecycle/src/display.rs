//! Display URL derivation.
//!
//! Resolution never hides a missing or unusable reference behind a default
//! image. It returns `value: None, is_placeholder: true` and leaves the
//! presentation to the caller.

use casa_core::AssetReference;
use casa_storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// A URL ready for display, or an explicit signal that there is none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisplayUrl {
    pub value: Option<String>,
    pub is_placeholder: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl DisplayUrl {
    pub fn placeholder() -> Self {
        Self {
            value: None,
            is_placeholder: true,
            expires_at: None,
        }
    }

    fn resolved(value: String) -> Self {
        Self {
            value: Some(value),
            is_placeholder: false,
            expires_at: None,
        }
    }
}

/// Append `v=<unix millis>` so a changed record defeats client caches.
///
/// No base yields `None`; no timestamp yields the base unchanged.
pub fn cache_busted(base: Option<&str>, modified_at: Option<OffsetDateTime>) -> Option<String> {
    let base = base.filter(|b| !b.is_empty())?;
    let Some(modified_at) = modified_at else {
        return Some(base.to_string());
    };
    let millis = modified_at.unix_timestamp_nanos() / 1_000_000;
    let separator = if base.contains('?') { '&' } else { '?' };
    Some(format!("{base}{separator}v={millis}"))
}

/// One key signed by [`DisplayResolver::signed_urls`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedEntry {
    pub key: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// One key [`DisplayResolver::signed_urls`] could not sign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SigningFailure {
    pub key: String,
    pub message: String,
}

/// Itemized outcome of signing a reference list. Both lists keep input order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SignedUrls {
    pub success: Vec<SignedEntry>,
    pub errors: Vec<SigningFailure>,
}

impl SignedUrls {
    /// Signed URLs in input order.
    pub fn urls(&self) -> Vec<&str> {
        self.success.iter().map(|entry| entry.url.as_str()).collect()
    }
}

/// Turns stored references into public or signed URLs.
pub struct DisplayResolver {
    store: Arc<dyn ObjectStore>,
    default_ttl: Duration,
}

impl DisplayResolver {
    pub fn new(store: Arc<dyn ObjectStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Unsigned URL for a stored reference.
    pub fn public(&self, reference: &str) -> DisplayUrl {
        match AssetReference::classify(reference) {
            AssetReference::Key(key) => {
                DisplayUrl::resolved(self.store.public_url(&key.to_path_string()))
            }
            AssetReference::Url(url) => DisplayUrl::resolved(url),
            AssetReference::Inline(_) | AssetReference::Invalid(_) => DisplayUrl::placeholder(),
        }
    }

    /// Time-boxed URL for a stored reference. `ttl` defaults to the configured value.
    ///
    /// External URLs pass through without an expiry. Any signing failure,
    /// including a missing object, yields a placeholder.
    pub async fn signed(&self, reference: &str, ttl: Option<Duration>) -> DisplayUrl {
        let key = match AssetReference::classify(reference) {
            AssetReference::Key(key) => key,
            AssetReference::Url(url) => return DisplayUrl::resolved(url),
            AssetReference::Inline(_) | AssetReference::Invalid(_) => {
                return DisplayUrl::placeholder();
            }
        };

        match self
            .store
            .signed_url(&key.to_path_string(), ttl.unwrap_or(self.default_ttl))
            .await
        {
            Ok(signed) => DisplayUrl {
                value: Some(signed.url),
                is_placeholder: false,
                expires_at: Some(signed.expires_at),
            },
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to sign display URL");
                DisplayUrl::placeholder()
            }
        }
    }

    /// Sign every storage key in `keys`, one call at a time.
    ///
    /// Entries that are not storage keys (external URLs, inline payloads,
    /// blanks) and keys the store refuses to sign land in `errors`.
    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    pub async fn signed_urls(&self, keys: &[String], ttl: Option<Duration>) -> SignedUrls {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut result = SignedUrls::default();

        for raw in keys {
            let key = match AssetReference::classify(raw) {
                AssetReference::Key(key) => key.to_path_string(),
                AssetReference::Url(_) => {
                    result.errors.push(failure(raw, "not a storage key (external URL)"));
                    continue;
                }
                AssetReference::Inline(_) => {
                    result.errors.push(failure(raw, "not a storage key (inline payload)"));
                    continue;
                }
                AssetReference::Invalid(_) => {
                    result.errors.push(failure(raw, "invalid storage key"));
                    continue;
                }
            };

            match self.store.signed_url(&key, ttl).await {
                Ok(signed) => result.success.push(SignedEntry {
                    key,
                    url: signed.url,
                    expires_at: signed.expires_at,
                }),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to sign URL");
                    result.errors.push(failure(&key, e.to_string()));
                }
            }
        }

        if !result.errors.is_empty() {
            tracing::info!(
                signed = result.success.len(),
                failed = result.errors.len(),
                "Signed URL batch finished with errors"
            );
        }
        result
    }

    /// Public URLs for a reference list, in order, skipping unusable entries.
    pub fn public_urls(&self, references: &[String]) -> Vec<String> {
        references
            .iter()
            .filter_map(|reference| self.public(reference).value)
            .collect()
    }

    /// Cache-busted public URL for a record's current reference.
    pub fn for_record(
        &self,
        reference: Option<&str>,
        modified_at: Option<OffsetDateTime>,
    ) -> DisplayUrl {
        let Some(reference) = reference.filter(|r| !r.is_empty()) else {
            return DisplayUrl::placeholder();
        };
        let base = self.public(reference);
        match cache_busted(base.value.as_deref(), modified_at) {
            Some(url) => DisplayUrl::resolved(url),
            None => base,
        }
    }
}

fn failure(key: &str, message: impl Into<String>) -> SigningFailure {
    SigningFailure {
        key: key.to_string(),
        message: message.into(),
    }
}
