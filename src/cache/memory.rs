//! In-process cache backend with per-entry expiry.
//!
//! Entries are evicted lazily when read past their expiry. Every 256th
//! insert also sweeps out expired entries that are never read again;
//! [`MemoryCache::purge_expired`] does the same on demand.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use ads_insight_client::cache::MemoryCache;
//!
//! let cache = MemoryCache::new();
//! cache.insert("k", "v".to_string(), Duration::from_secs(60));
//! assert_eq!(cache.lookup("k").as_deref(), Some("v"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::{CacheBackend, CacheKey};
use crate::error::AdsError;

/// Inserts between sweeps of expired entries.
const PURGE_EVERY: u64 = 256;

/// Thread-safe in-memory cache. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    inserts: AtomicU64,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache with a specific initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
            inserts: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a value that expires after `ttl`.
    pub fn insert(&self, key: impl Into<String>, value: String, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.lock();
        if (self.inserts.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY == 0 {
            let before = entries.len();
            entries.retain(|_, (_, expires_at)| now < *expires_at);
            tracing::debug!(purged = before - entries.len(), "purged expired cache entries");
        }
        entries.insert(key.into(), (value, now + ttl));
    }

    /// Get a live value, evicting it if expired.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Time left before an entry expires.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .and_then(|(_, expires_at)| expires_at.checked_duration_since(now))
            .filter(|left| !left.is_zero())
    }

    /// Remove an entry.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.lock().remove(key).map(|(value, _)| value)
    }

    /// Remove every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.lock().retain(|_, (_, expires_at)| now < *expires_at);
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, AdsError> {
        Ok(self.lookup(key.as_str()))
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), AdsError> {
        self.insert(key.as_str(), value, ttl);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_miss_after() {
        let cache = MemoryCache::new();
        cache.insert("k", "v".into(), Duration::from_secs(3600));

        tokio::time::advance(Duration::from_secs(1800)).await;
        assert_eq!(cache.lookup("k").as_deref(), Some("v"));
        assert_eq!(cache.remaining_ttl("k"), Some(Duration::from_secs(1800)));

        tokio::time::advance(Duration::from_secs(2200)).await;
        assert!(cache.lookup("k").is_none());
        // Lazily evicted on read
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_keeps_live_entries() {
        let cache = MemoryCache::with_capacity(4);
        cache.insert("short", "a".into(), Duration::from_secs(10));
        cache.insert("long", "b".into(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(cache.len(), 2);
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("long").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inserts_sweep_expired_entries() {
        let cache = MemoryCache::new();
        for i in 0..(PURGE_EVERY - 1) {
            cache.insert(format!("stale-{}", i), "x".into(), Duration::from_secs(10));
        }
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(cache.len() as u64, PURGE_EVERY - 1);

        cache.insert("fresh", "y".into(), Duration::from_secs(10));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("fresh").as_deref(), Some("y"));
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = MemoryCache::new();
        cache.insert("a", "1".into(), Duration::from_secs(60));
        cache.insert("b", "2".into(), Duration::from_secs(60));

        assert_eq!(cache.remove("a").as_deref(), Some("1"));
        assert!(cache.remove("a").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
