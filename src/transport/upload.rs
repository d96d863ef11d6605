//! Source audio upload
//!
//! Stores the audio under a fresh key, asks the store for a fetchable URL
//! and checks that URL before anything is sent to the separation service.

use std::sync::Arc;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::error::{Result, StemError};
use crate::store::{BlobStore, UrlOptions};

const MAX_FILE_NAME_LEN: usize = 100;

/// Tokens that end up in URLs when a caller formats a missing value
const PLACEHOLDER_TOKENS: &[&str] = &["undefined", "[object"];

/// Uploads source audio into a [`BlobStore`].
pub struct Uploader {
    store: Arc<dyn BlobStore>,
    owner: String,
    options: UrlOptions,
    timeout: Duration,
}

impl Uploader {
    pub fn new(store: Arc<dyn BlobStore>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
            options: UrlOptions::public(),
            timeout: BackendConfig::default().upload_timeout(),
        }
    }

    /// Uploader with URL options and timeout from `config`
    pub fn from_config(store: Arc<dyn BlobStore>, owner: impl Into<String>, config: &BackendConfig) -> Self {
        let options = if config.signed_urls {
            UrlOptions::signed(config.signed_url_ttl_secs)
        } else {
            UrlOptions::public()
        };

        Self::new(store, owner)
            .with_url_options(options)
            .with_timeout(config.upload_timeout())
    }

    pub fn with_url_options(mut self, options: UrlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Store `bytes` and return a validated URL for them
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let key = object_key(&self.owner, file_name);
        let size = bytes.len();

        match tokio::time::timeout(self.timeout, self.store.put_object(&key, bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(err @ StemError::Upload { .. })) => return Err(err),
            Ok(Err(err)) => {
                return Err(StemError::Upload {
                    path: key,
                    reason: err.to_string(),
                    source: Some(Box::new(err)),
                })
            }
            Err(_) => {
                return Err(StemError::Timeout {
                    operation: "upload".to_string(),
                    elapsed_ms: self.timeout.as_millis() as u64,
                })
            }
        }

        let url = self
            .store
            .get_url(&key, self.options)
            .await
            .map_err(|e| StemError::InvalidLocation {
                url: key.clone(),
                reason: format!("store could not issue a URL: {}", e),
            })?;

        validate_issued_location(&url, &key)?;
        tracing::info!(key = %key, bytes = size, signed = self.options.signed, "source audio uploaded");
        Ok(url)
    }
}

/// Storage key `<owner>/<uuid>-<sanitized file name>`
pub fn object_key(owner: &str, file_name: &str) -> String {
    let owner = sanitize(owner);
    let owner = if owner.is_empty() { "anonymous".to_string() } else { owner };

    let name = sanitize(file_name);
    let name = if name.is_empty() { "audio".to_string() } else { name };

    format!("{}/{}-{}", owner, Uuid::new_v4(), name)
}

fn sanitize(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');
    let mut end = cleaned.len().min(MAX_FILE_NAME_LEN);
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    cleaned[..end].to_string()
}

/// Validate a URL the store issued for `key`.
///
/// The key embeds the caller's file name, so it is masked before the
/// placeholder scan and only store-produced text can fail it.
fn validate_issued_location(url: &str, key: &str) -> Result<Url> {
    let masked = url.replacen(key, "object", 1);
    validate_location(&masked).map_err(|err| match err {
        StemError::InvalidLocation { reason, .. } => StemError::InvalidLocation {
            url: url.to_string(),
            reason,
        },
        other => other,
    })?;

    Url::parse(url.trim()).map_err(|e| StemError::InvalidLocation {
        url: url.to_string(),
        reason: format!("not a URL: {}", e),
    })
}

/// Check that a storage URL can be handed to the separation service
pub fn validate_location(url: &str) -> Result<Url> {
    let invalid = |reason: &str| StemError::InvalidLocation {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty location"));
    }

    let lowered = trimmed.to_lowercase();
    if PLACEHOLDER_TOKENS.iter().any(|token| lowered.contains(token)) {
        return Err(invalid("location contains a placeholder token"));
    }

    let parsed = Url::parse(trimmed).map_err(|e| invalid(&format!("not a URL: {}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("location must use http or https"));
    }

    if parsed
        .path_segments()
        .is_some_and(|mut segments| segments.any(|s| s.eq_ignore_ascii_case("null")))
    {
        return Err(invalid("location contains a placeholder token"));
    }

    Ok(parsed)
}
