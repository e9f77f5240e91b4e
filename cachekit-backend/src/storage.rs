//! L2 storage abstraction (module E).
//!
//! Only the trait and an in-memory test double ship from this workspace — concrete
//! network-backed adapters (Redis, Tarantool, feoxdb...) are out of scope (§1
//! Non-goals).

use async_trait::async_trait;
use cachekit_core::{CacheKey, CacheValue, Raw};
use dashmap::DashMap;
use smol_str::SmolStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::BackendError;
use crate::tag_index::TagIndex;

/// Result type for [`StorageProvider`] operations.
pub type StorageResult<T> = Result<T, BackendError>;

/// Point-in-time counters for a storage tier, mirroring `MemoryStore::stats()` (§4.D)
/// so `HybridStorage` can report L1 and L2 stats uniformly.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStats {
    /// Successful reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing (or an expired entry).
    pub misses: u64,
    /// Entries removed by eviction (not by explicit `remove`/`remove_by_tag`).
    pub evictions: u64,
    /// Current number of live entries.
    pub entry_count: u64,
    /// Current number of distinct tags tracked.
    pub tag_count: u64,
}

/// A pluggable L2 cache tier.
///
/// Implementations must honor TTLs and tag-set invalidation with semantics identical
/// to `MemoryStore` (§4.D); failures are surfaced through `Result` so `HybridStorage`
/// (§4.F) can degrade gracefully rather than propagate them to the caller.
#[async_trait]
pub trait StorageProvider: Send + Sync + std::fmt::Debug {
    /// Reads a raw cached value. `Ok(None)` on miss (including lazily-observed expiry).
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<CacheValue<Raw>>>;

    /// Writes a raw cached value, associating it with `tags` for later bulk removal.
    async fn set(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        ttl: Option<Duration>,
        tags: &[SmolStr],
    ) -> StorageResult<()>;

    /// Removes a single key.
    async fn remove(&self, key: &CacheKey) -> StorageResult<()>;

    /// Removes every key associated with `tag`.
    async fn remove_by_tag(&self, tag: &str) -> StorageResult<u64>;

    /// Whether `key` currently has a live entry.
    async fn exists(&self, key: &CacheKey) -> StorageResult<bool>;

    /// Liveness probe; `Ok(false)` (not `Err`) for an orderly "provider is up but
    /// degraded" report.
    async fn health(&self) -> StorageResult<bool>;

    /// Point-in-time counters.
    async fn stats(&self) -> StorageResult<StorageStats>;
}

/// An in-memory `StorageProvider` used for tests and as a reference implementation.
///
/// Mocks a backend with a `DashMap` for lock-free concurrent access across the
/// striped locks in `cachekit`'s `StripedLock` (module H).
#[derive(Debug, Default)]
pub struct InMemoryStorageProvider {
    entries: DashMap<CacheKey, CacheValue<Raw>>,
    tags: TagIndex,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryStorageProvider {
    /// Builds an empty provider.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<CacheValue<Raw>>> {
        match self.entries.get(key) {
            Some(entry) if entry.expire().is_none_or(|expire| expire > chrono::Utc::now()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.clone()))
            }
            Some(_) => {
                drop(self.entries.remove(key));
                self.tags.remove_key(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        _ttl: Option<Duration>,
        tags: &[SmolStr],
    ) -> StorageResult<()> {
        self.entries.insert(key.clone(), value);
        self.tags.associate(key.clone(), tags.iter().cloned());
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> StorageResult<()> {
        self.entries.remove(key);
        self.tags.remove_key(key);
        Ok(())
    }

    async fn remove_by_tag(&self, tag: &str) -> StorageResult<u64> {
        let keys = self.tags.drain_tag(tag);
        for key in &keys {
            self.entries.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn exists(&self, key: &CacheKey) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn health(&self) -> StorageResult<bool> {
        Ok(true)
    }

    async fn stats(&self) -> StorageResult<StorageStats> {
        Ok(StorageStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: 0,
            entry_count: self.entries.len() as u64,
            tag_count: self.tags.tag_count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> CacheKey {
        CacheKey::new(id, 0, vec![])
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let provider = InMemoryStorageProvider::new();
        assert!(provider.get(&key("a")).await.unwrap().is_none());

        provider
            .set(&key("a"), CacheValue::new(Raw::from_static(b"v"), None, None), None, &[])
            .await
            .unwrap();

        assert!(provider.get(&key("a")).await.unwrap().is_some());
        let stats = provider.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn remove_by_tag_drops_entries() {
        let provider = InMemoryStorageProvider::new();
        provider
            .set(
                &key("a"),
                CacheValue::new(Raw::from_static(b"v"), None, None),
                None,
                &[SmolStr::new("group")],
            )
            .await
            .unwrap();

        let removed = provider.remove_by_tag("group").await.unwrap();
        assert_eq!(removed, 1);
        assert!(provider.get(&key("a")).await.unwrap().is_none());
    }
}
