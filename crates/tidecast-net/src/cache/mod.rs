//! Two-tier response cache.
//!
//! The memory tier is a cost-bounded LRU map; the disk tier persists each
//! entry as a record under a directory owned by the cache. Lookups check
//! memory first, then disk, promoting disk hits into memory. Expired entries
//! are dropped from whichever tier they are found in.
//!
//! # Example
//!
//! ```ignore
//! use tidecast_net::cache::{CacheConfig, ResponseCache};
//! use tidecast_net::CachePolicy;
//!
//! let cache = ResponseCache::new(CacheConfig::default().with_disk_bytes(10 * 1024 * 1024));
//! cache.store(body, &signature, CachePolicy::Automatic).await;
//! if let Some(entry) = cache.retrieve(&signature).await {
//!     // use entry.payload
//! }
//! ```

mod disk;
mod memory;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;

use crate::config::ClientConfig;
use crate::logger::targets;
use crate::request::CachePolicy;
use crate::signature::RequestSignature;

use disk::DiskTier;
use memory::MemoryTier;

/// Shortest lifetime an entry can have, so expiry is always after creation.
const MIN_TTL: Duration = Duration::from_millis(1);

/// A cached response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    /// Response body.
    pub payload: Bytes,
    /// When the entry was created.
    pub created_at: SystemTime,
    /// When the entry stops being served. Always after `created_at`.
    pub expires_at: SystemTime,
    /// Validator tag (`ETag`) sent with the response.
    pub etag: Option<String>,
    /// Payload size in bytes.
    pub size: u64,
}

impl CacheEntry {
    /// Create an entry living for `ttl` from now.
    pub fn new(payload: Bytes, ttl: Duration, etag: Option<String>) -> Self {
        let created_at = SystemTime::now();
        let size = payload.len() as u64;
        Self {
            payload,
            created_at,
            expires_at: created_at + ttl.max(MIN_TTL),
            etag,
            size,
        }
    }

    /// Whether the entry has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// Whether the entry is expired at `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now > self.expires_at
    }
}

/// Configuration for a [`ResponseCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory owned by the disk tier.
    pub dir: PathBuf,
    /// Memory tier budget in bytes.
    pub memory_bytes: u64,
    /// Disk tier budget in bytes.
    pub disk_bytes: u64,
    /// Lifetime of stored entries.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for CacheConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            dir: config.resolved_cache_dir(),
            memory_bytes: config.memory_cache_bytes,
            disk_bytes: config.disk_cache_bytes,
            ttl: config.cache_ttl,
        }
    }
}

impl CacheConfig {
    /// Set the disk tier directory.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set the memory tier budget.
    #[must_use]
    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Set the disk tier budget.
    #[must_use]
    pub fn with_disk_bytes(mut self, bytes: u64) -> Self {
        self.disk_bytes = bytes;
        self
    }

    /// Set the entry lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Snapshot of cache occupancy and effectiveness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries in the memory tier.
    pub memory_entries: usize,
    /// Payload bytes in the memory tier.
    pub memory_bytes: u64,
    /// Entries on disk.
    pub disk_entries: usize,
    /// Bytes on disk.
    pub disk_bytes: u64,
    /// Lookups answered from either tier.
    pub hits: u64,
    /// Lookups that found nothing live.
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memory + disk response cache keyed by [`RequestSignature`].
pub struct ResponseCache {
    memory: MemoryTier,
    disk: DiskTier,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache. The disk directory is created on first use.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            memory: MemoryTier::new(config.memory_bytes),
            disk: DiskTier::new(config.dir, config.disk_bytes),
            ttl: config.ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Default entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Directory owned by the disk tier.
    pub fn dir(&self) -> &Path {
        self.disk.dir()
    }

    /// Store a payload with the default lifetime.
    pub async fn store(&self, payload: Bytes, signature: &RequestSignature, policy: CachePolicy) {
        let entry = CacheEntry::new(payload, self.ttl, None);
        self.store_entry(entry, signature, policy).await;
    }

    /// Store a prepared entry in the tiers `policy` selects.
    pub async fn store_entry(
        &self,
        entry: CacheEntry,
        signature: &RequestSignature,
        policy: CachePolicy,
    ) {
        let key = signature.as_str();
        if policy.uses_disk() {
            self.disk.store(key, &entry).await;
        }
        if policy.uses_memory() {
            self.memory.insert(key, entry);
        }
        tracing::trace!(target: targets::CACHE, key, ?policy, "stored");
    }

    /// Look up a live entry, memory first. A disk hit is promoted to memory.
    pub async fn retrieve(&self, signature: &RequestSignature) -> Option<CacheEntry> {
        let key = signature.as_str();

        if let Some(entry) = self.memory.get(key) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(target: targets::CACHE, key, "memory hit");
                return Some(entry);
            }
            self.memory.remove(key);
        }

        match self.disk.load(key).await {
            Some(entry) => {
                self.memory.insert(key, entry.clone());
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(target: targets::CACHE, key, "disk hit");
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop one entry from both tiers.
    pub async fn remove(&self, signature: &RequestSignature) {
        let key = signature.as_str();
        self.memory.remove(key);
        self.disk.remove(key).await;
    }

    /// Drop everything. Safe to call repeatedly.
    pub async fn clear_all(&self) {
        self.memory.clear();
        self.disk.clear().await;
        tracing::debug!(target: targets::CACHE, "cache cleared");
    }

    /// Drop expired entries from both tiers; returns how many were dropped.
    pub async fn clear_expired(&self) -> usize {
        let now = SystemTime::now();
        self.memory.clear_expired(now) + self.disk.clear_expired(now).await
    }

    /// Bytes tracked on disk.
    pub async fn disk_usage(&self) -> u64 {
        self.disk.usage().await
    }

    /// Payload bytes held in memory.
    pub fn memory_usage(&self) -> u64 {
        self.memory.usage()
    }

    /// Disk tier budget.
    pub fn max_disk_bytes(&self) -> u64 {
        self.disk.max_bytes()
    }

    /// Memory tier budget.
    pub fn max_memory_bytes(&self) -> u64 {
        self.memory.max_bytes()
    }

    /// Occupancy and hit counters.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.len(),
            memory_bytes: self.memory.usage(),
            disk_entries: self.disk.len().await,
            disk_bytes: self.disk.usage().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("dir", &self.disk.dir())
            .field("memory_bytes", &self.memory.usage())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(name: &str) -> RequestSignature {
        RequestSignature::from_hex(name)
    }

    fn cache(dir: &Path) -> ResponseCache {
        ResponseCache::new(
            CacheConfig::default()
                .with_dir(dir)
                .with_memory_bytes(1024)
                .with_disk_bytes(64 * 1024)
                .with_ttl(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_entry_expiry_after_creation() {
        let entry = CacheEntry::new(Bytes::from_static(b"x"), Duration::ZERO, None);
        assert!(entry.expires_at > entry.created_at);
        assert!(!entry.is_expired_at(entry.expires_at));
        assert!(entry.is_expired_at(entry.expires_at + Duration::from_nanos(1)));
        assert_eq!(entry.size, 1);
    }

    #[tokio::test]
    async fn test_memory_only_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let body = Bytes::from_static(br#"{"a":1}"#);

        cache.store(body.clone(), &sig("m"), CachePolicy::MemoryOnly).await;
        assert_eq!(cache.retrieve(&sig("m")).await.unwrap().payload, body);
        assert_eq!(cache.disk_usage().await, 0);
    }

    #[tokio::test]
    async fn test_disk_hit_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let body = Bytes::from_static(br#"{"b":2}"#);

        cache.store(body.clone(), &sig("d"), CachePolicy::DiskOnly).await;
        assert_eq!(cache.memory_usage(), 0);

        assert_eq!(cache.retrieve(&sig("d")).await.unwrap().payload, body);
        assert_eq!(cache.memory_usage(), body.len() as u64);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.disk_entries, 1);
        assert_eq!(stats.memory_entries, 1);
    }

    #[tokio::test]
    async fn test_none_policy_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.store(Bytes::from_static(b"{}"), &sig("n"), CachePolicy::None).await;
        assert!(cache.retrieve(&sig("n")).await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_remove_drops_both_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.store(Bytes::from_static(b"{}"), &sig("r"), CachePolicy::Automatic).await;

        cache.remove(&sig("r")).await;
        assert!(cache.retrieve(&sig("r")).await.is_none());
        assert_eq!(cache.memory_usage(), 0);
        assert_eq!(cache.disk_usage().await, 0);
    }
}
