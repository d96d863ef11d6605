//! Filesystem-backed blob store
//!
//! Objects are written under a root directory that some web server exposes at
//! a public base URL. Signed URLs carry `expires` and `signature` query
//! parameters, where the signature is HMAC-SHA256 under the signing key over
//! the object path and the expiry timestamp.

use std::env;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use super::{BlobStore, UrlOptions};
use crate::error::{Result, StemError};

const DEFAULT_TTL_SECS: u64 = 3_600;

type HmacSha256 = Hmac<Sha256>;

/// Blob store writing into a local directory.
pub struct FsBlobStore {
    root: PathBuf,
    public_base: Url,
    signing_key: Option<String>,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, served from `public_base`
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Result<Self> {
        // A trailing slash makes `Url::join` append instead of replacing the last segment
        let normalized = format!("{}/", public_base.trim_end_matches('/'));
        let public_base = Url::parse(&normalized).map_err(|e| {
            StemError::configuration(format!("malformed blob public URL '{}': {}", public_base, e))
        })?;

        Ok(Self {
            root: root.into(),
            public_base,
            signing_key: None,
        })
    }

    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = Some(key.into());
        self
    }

    /// Build from `STEMDECK_BLOB_ROOT`, `STEMDECK_BLOB_PUBLIC_URL` and the
    /// optional `STEMDECK_BLOB_SIGNING_KEY`.
    pub fn from_env() -> Result<Self> {
        let root = env::var("STEMDECK_BLOB_ROOT")
            .map_err(|_| StemError::configuration("STEMDECK_BLOB_ROOT is not set"))?;
        let public = env::var("STEMDECK_BLOB_PUBLIC_URL")
            .map_err(|_| StemError::configuration("STEMDECK_BLOB_PUBLIC_URL is not set"))?;

        let store = Self::new(root, &public)?;
        Ok(match env::var("STEMDECK_BLOB_SIGNING_KEY") {
            Ok(key) if !key.is_empty() => store.with_signing_key(key),
            _ => store,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object path inside the root, rejecting escapes.
    fn object_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StemError::Store {
                reason: format!("invalid object path '{}'", path),
            });
        }
        Ok(self.root.join(relative))
    }

    fn mac(key: &str, path: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| StemError::Store {
            reason: format!("unusable signing key: {}", e),
        })?;
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    fn sign(key: &str, path: &str, expires: i64) -> Result<String> {
        let mac = Self::mac(key, path, expires)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check a signature produced by [`BlobStore::get_url`].
    pub fn verify_signature(&self, path: &str, expires: i64, signature: &str) -> bool {
        let Some(key) = &self.signing_key else {
            return false;
        };
        if expires < Utc::now().timestamp() {
            return false;
        }

        match (Self::mac(key, path, expires), hex::decode(signature)) {
            (Ok(mac), Ok(tag)) => mac.verify_slice(&tag).is_ok(),
            _ => false,
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let target = self.object_path(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        tracing::debug!(path, "stored object");
        Ok(())
    }

    async fn get_url(&self, path: &str, options: UrlOptions) -> Result<String> {
        let target = self.object_path(path)?;
        if tokio::fs::metadata(&target).await.is_err() {
            return Err(StemError::Store {
                reason: format!("no object stored at '{}'", path),
            });
        }

        let mut url = self.public_base.join(path).map_err(|e| StemError::Store {
            reason: format!("cannot build URL for '{}': {}", path, e),
        })?;

        if options.signed {
            match &self.signing_key {
                Some(key) => {
                    let ttl = options.ttl_seconds.unwrap_or(DEFAULT_TTL_SECS) as i64;
                    let expires = Utc::now().timestamp() + ttl;
                    let signature = Self::sign(key, path, expires)?;
                    url.query_pairs_mut()
                        .append_pair("expires", &expires.to_string())
                        .append_pair("signature", &signature);
                }
                None => {
                    tracing::warn!(path, "signed URL requested but no signing key configured, issuing public URL");
                }
            }
        }

        Ok(url.to_string())
    }
}
