//! Best-effort TTL cache in front of upstream fetches.
//!
//! Keys are derived from every result-affecting parameter
//! ([`CacheKey::derive`]); values are stored as JSON text so any
//! [`CacheBackend`] (in-process or remote) can hold them. A failing backend
//! is logged and bypassed by [`CacheLayer`]; callers never see cache errors.
//!
//! # Example
//!
//! ```rust
//! use ads_insight_client::cache::{CacheCategory, CacheKey, CacheLayer, CacheTtls, MemoryCache};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ads_insight_client::AdsError> {
//! let cache = CacheLayer::new(MemoryCache::new(), CacheTtls::default());
//! let key = CacheKey::derive("demo", &("account", 42))?;
//!
//! let value = cache
//!     .get_or_fetch(&key, CacheCategory::Performance, || async { Ok(vec![1, 2, 3]) })
//!     .await?;
//! assert_eq!(value, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryCache;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use sha2::{Digest, Sha256};

use crate::error::AdsError;

/// Fixed-length cache key: a namespace plus a hash of the parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash the JSON serialization of `params` under `namespace`.
    ///
    /// Struct fields serialize in declaration order, so equal parameters
    /// always produce equal keys.
    pub fn derive<T: Serialize + ?Sized>(namespace: &str, params: &T) -> Result<Self, AdsError> {
        let bytes = serde_json::to_vec(params)?;
        let digest = Sha256::digest(&bytes);
        Ok(Self(format!("{}:{}", namespace, URL_SAFE_NO_PAD.encode(digest))))
    }

    /// The key as stored by the backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Volatility class of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    /// Performance metrics, which change hourly.
    Performance,
    /// Near-static reference data (exclusion lists, schemas).
    Reference,
}

/// TTL per cache category.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    /// TTL for performance data.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "performance_secs")]
    pub performance: Duration,
    /// TTL for reference data.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "reference_secs")]
    pub reference: Duration,
}

impl CacheTtls {
    /// TTL for a category.
    pub fn ttl(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Performance => self.performance,
            CacheCategory::Reference => self.reference,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            performance: Duration::from_secs(3600),
            reference: Duration::from_secs(86_400),
        }
    }
}

/// Key/value store with per-entry TTL.
///
/// Errors should be [`AdsError::CacheUnavailable`]; they are never surfaced
/// past [`CacheLayer`].
pub trait CacheBackend: Send + Sync {
    /// Get a live entry.
    fn get(
        &self,
        key: &CacheKey,
    ) -> impl Future<Output = Result<Option<String>, AdsError>> + Send;

    /// Store an entry that expires after `ttl`.
    fn set(
        &self,
        key: &CacheKey,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), AdsError>> + Send;
}

impl<T: CacheBackend> CacheBackend for Arc<T> {
    fn get(
        &self,
        key: &CacheKey,
    ) -> impl Future<Output = Result<Option<String>, AdsError>> + Send {
        (**self).get(key)
    }

    fn set(
        &self,
        key: &CacheKey,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), AdsError>> + Send {
        (**self).set(key, value, ttl)
    }
}

/// Backend that stores nothing. Every read misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CacheBackend for NoCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<String>, AdsError> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _value: String, _ttl: Duration) -> Result<(), AdsError> {
        Ok(())
    }
}

/// Typed, best-effort front for a [`CacheBackend`].
#[derive(Debug, Clone)]
pub struct CacheLayer<B> {
    backend: B,
    ttls: CacheTtls,
}

impl<B: CacheBackend> CacheLayer<B> {
    /// Create a cache layer.
    pub fn new(backend: B, ttls: CacheTtls) -> Self {
        Self { backend, ttls }
    }

    /// Get a reference to the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Configured TTLs.
    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Read and decode an entry. Backend failures and undecodable entries read as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!(key = %key, "cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache unavailable, bypassing");
                None
            }
        }
    }

    /// Encode and store an entry with the category TTL. Failures are logged only.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, category: CacheCategory) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "value not cacheable");
                return;
            }
        };
        if let Err(e) = self.backend.set(key, raw, self.ttls.ttl(category)).await {
            tracing::warn!(key = %key, error = %e, "cache unavailable, skipping write");
        }
    }

    /// Return the cached value, or run `fetch` and cache its result.
    ///
    /// Errors from `fetch` propagate and nothing is cached.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: &CacheKey,
        category: CacheCategory,
        fetch: F,
    ) -> Result<T, AdsError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AdsError>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.set(key, &value, category).await;
        Ok(value)
    }
}
