//! L1+L2 coordination (module F).
//!
//! Simplified from the teacher's `composition/` subtree: rather than the deeply
//! generic `CompositionBackend<L1, L2, CompositionPolicy<R, W, F>>` tower with its
//! bytemuck zero-copy envelope (`composition/envelope.rs`), this keeps one concrete
//! `HybridStorage<L1>` type and small trait objects for the read/write strategy. See
//! DESIGN.md's open-question resolutions for the rationale.

use async_trait::async_trait;
use cachekit_core::{CacheValue, Raw};
use cachekit_core::CacheKey;
use smol_str::SmolStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::BackendError;
use crate::storage::{StorageProvider, StorageResult, StorageStats};

/// What `HybridStorage` does with the in-process tier (L1).
///
/// Implemented by `cachekit_memory::MemoryStore`. Kept as a trait (rather than a
/// concrete dependency on `cachekit-memory`) so this crate never needs to depend
/// downward on the crate that depends on it.
#[async_trait]
pub trait L1Store: Send + Sync + std::fmt::Debug {
    /// Reads a raw value. `None` on miss or lazily-observed expiry.
    async fn get(&self, key: &CacheKey) -> Option<CacheValue<Raw>>;
    /// Writes a raw value with the given L1-clamped TTL and tag associations.
    async fn set(&self, key: &CacheKey, value: CacheValue<Raw>, ttl: Duration, tags: &[SmolStr]);
    /// Removes a single key.
    async fn remove(&self, key: &CacheKey);
    /// Removes every key associated with `tag`, returning the count removed.
    async fn remove_by_tag(&self, tag: &str) -> u64;
    /// Point-in-time counters.
    async fn stats(&self) -> StorageStats;
}

/// Notified whenever `HybridStorage` invalidates something, so a cross-instance
/// `Backplane` (module G, in the `cachekit` crate) can fan the event out.
pub trait InvalidationPublisher: Send + Sync + std::fmt::Debug {
    /// A single key was removed.
    fn publish_key_invalidation(&self, key: &CacheKey);
    /// Every key under `tag` was removed.
    fn publish_tag_invalidation(&self, tag: &str);
}

/// Which tiers participate in reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Only L1 is consulted; L2 is never read or written.
    L1Only,
    /// Only L2 is consulted; L1 is never read or written.
    L2Only,
    /// Both tiers; L2 writes are awaited before `set` returns.
    #[default]
    WriteThrough,
    /// Both tiers; L2 writes are offloaded to a bounded background task.
    WriteBehind,
}

/// Tuning knobs for [`HybridStorage`].
#[derive(Debug, Clone)]
pub struct HybridStorageConfig {
    /// Which tiers participate and how.
    pub strategy: Strategy,
    /// Floor for the L1-clamped TTL (§4.F TTL clamp).
    pub l1_min_default: Duration,
    /// Ceiling for the L1-clamped TTL.
    pub l1_max_expiration: Duration,
    /// Bound on concurrent in-flight L2 operations.
    pub max_concurrent_l2_ops: usize,
}

impl Default for HybridStorageConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::WriteThrough,
            l1_min_default: Duration::from_secs(5),
            l1_max_expiration: Duration::from_secs(300),
            max_concurrent_l2_ops: 64,
        }
    }
}

fn clamp_l1_ttl(requested: Option<Duration>, config: &HybridStorageConfig) -> Duration {
    let requested = requested.unwrap_or(config.l1_max_expiration);
    requested
        .min(config.l1_max_expiration)
        .max(config.l1_min_default)
}

/// Coordinates an in-process L1 tier with a pluggable L2 tier.
///
/// See §4.F for the read/write/invalidate algorithms this implements verbatim:
/// L1-first reads with L2 fallback and refill, L1-always-set writes with
/// strategy-dependent L2 propagation, and fan-out invalidation.
#[derive(Debug)]
pub struct HybridStorage<L1> {
    l1: Option<Arc<L1>>,
    l2: Option<Arc<dyn StorageProvider>>,
    config: HybridStorageConfig,
    l2_semaphore: Arc<Semaphore>,
    publisher: Option<Arc<dyn InvalidationPublisher>>,
}

impl<L1: L1Store + 'static> HybridStorage<L1> {
    /// Builds a hybrid storage coordinator.
    pub fn new(
        l1: Option<Arc<L1>>,
        l2: Option<Arc<dyn StorageProvider>>,
        config: HybridStorageConfig,
        publisher: Option<Arc<dyn InvalidationPublisher>>,
    ) -> Self {
        let l2_semaphore = Arc::new(Semaphore::new(config.max_concurrent_l2_ops.max(1)));
        Self {
            l1,
            l2,
            config,
            l2_semaphore,
            publisher,
        }
    }

    fn l1_enabled(&self) -> bool {
        self.l1.is_some() && self.config.strategy != Strategy::L2Only
    }

    fn l2_enabled(&self) -> bool {
        self.l2.is_some() && self.config.strategy != Strategy::L1Only
    }

    /// Reads a value, preferring L1, falling back to L2 and warming L1 on an L2 hit.
    pub async fn get(&self, key: &CacheKey) -> StorageResult<Option<CacheValue<Raw>>> {
        if self.l1_enabled()
            && let Some(value) = self.l1.as_ref().unwrap().get(key).await
        {
            return Ok(Some(value));
        }

        if !self.l2_enabled() {
            return Ok(None);
        }

        let _permit = self.l2_semaphore.acquire().await.map_err(|e| {
            BackendError::Internal(Box::new(std::io::Error::other(e.to_string())))
        })?;

        let l2_value = match self.l2.as_ref().unwrap().get(key).await {
            Ok(value) => value,
            Err(err) => {
                // L2 read failures degrade to a miss (§4.F failure policy); L1 stays authoritative.
                warn!(error = %err, "L2 read failed, treating as miss");
                None
            }
        };

        let Some(value) = l2_value else {
            return Ok(None);
        };

        if self.l1_enabled() {
            let l1_ttl = clamp_l1_ttl(value.ttl(), &self.config);
            self.l1
                .as_ref()
                .unwrap()
                .set(key, value.clone(), l1_ttl, &[])
                .await;
        }

        Ok(Some(value))
    }

    /// Writes a value to every enabled tier per the configured [`Strategy`].
    pub async fn set(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        ttl: Option<Duration>,
        tags: &[SmolStr],
    ) -> StorageResult<()> {
        if self.l1_enabled() {
            let l1_ttl = clamp_l1_ttl(ttl, &self.config);
            self.l1
                .as_ref()
                .unwrap()
                .set(key, value.clone(), l1_ttl, tags)
                .await;
        }

        if !self.l2_enabled() {
            return Ok(());
        }

        let l2 = self.l2.as_ref().unwrap().clone();
        let key = key.clone();
        let tags = tags.to_vec();

        match self.config.strategy {
            Strategy::WriteBehind => {
                let semaphore = self.l2_semaphore.clone();
                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    if let Err(err) = l2.set(&key, value, ttl, &tags).await {
                        warn!(error = %err, "write-behind L2 write failed");
                    }
                });
                Ok(())
            }
            _ => {
                let _permit = self.l2_semaphore.acquire().await.map_err(|e| {
                    BackendError::Internal(Box::new(std::io::Error::other(e.to_string())))
                })?;
                l2.set(&key, value, ttl, &tags).await
            }
        }
    }

    /// Removes a key from every enabled tier and notifies the invalidation publisher.
    pub async fn remove(&self, key: &CacheKey) -> StorageResult<()> {
        if self.l1_enabled() {
            self.l1.as_ref().unwrap().remove(key).await;
        }
        if self.l2_enabled()
            && let Err(err) = self.l2.as_ref().unwrap().remove(key).await
        {
            warn!(error = %err, "L2 remove failed");
        }
        if let Some(publisher) = &self.publisher {
            publisher.publish_key_invalidation(key);
        }
        Ok(())
    }

    /// Removes every key under `tag` from every enabled tier.
    pub async fn remove_by_tag(&self, tag: &str) -> StorageResult<u64> {
        let mut removed = 0;
        if self.l1_enabled() {
            removed += self.l1.as_ref().unwrap().remove_by_tag(tag).await;
        }
        if self.l2_enabled() {
            match self.l2.as_ref().unwrap().remove_by_tag(tag).await {
                Ok(count) => removed += count,
                Err(err) => warn!(error = %err, "L2 remove_by_tag failed"),
            }
        }
        if let Some(publisher) = &self.publisher {
            publisher.publish_tag_invalidation(tag);
        }
        Ok(removed)
    }

    /// Combined L1+L2 counters.
    pub async fn stats(&self) -> StorageResult<StorageStats> {
        let l1 = if self.l1_enabled() {
            self.l1.as_ref().unwrap().stats().await
        } else {
            StorageStats::default()
        };
        let l2 = if self.l2_enabled() {
            self.l2.as_ref().unwrap().stats().await.unwrap_or_default()
        } else {
            StorageStats::default()
        };
        Ok(StorageStats {
            hits: l1.hits + l2.hits,
            misses: l1.misses + l2.misses,
            evictions: l1.evictions + l2.evictions,
            entry_count: l1.entry_count + l2.entry_count,
            tag_count: l1.tag_count.max(l2.tag_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorageProvider;
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct FakeL1 {
        entries: AsyncMutex<HashMap<CacheKey, CacheValue<Raw>>>,
    }

    #[async_trait]
    impl L1Store for FakeL1 {
        async fn get(&self, key: &CacheKey) -> Option<CacheValue<Raw>> {
            self.entries.lock().await.get(key).cloned()
        }
        async fn set(&self, key: &CacheKey, value: CacheValue<Raw>, _ttl: Duration, _tags: &[SmolStr]) {
            self.entries.lock().await.insert(key.clone(), value);
        }
        async fn remove(&self, key: &CacheKey) {
            self.entries.lock().await.remove(key);
        }
        async fn remove_by_tag(&self, _tag: &str) -> u64 {
            0
        }
        async fn stats(&self) -> StorageStats {
            StorageStats::default()
        }
    }

    #[derive(Debug, Default)]
    struct RecordingPublisher {
        invalidated: Mutex<Vec<String>>,
    }

    impl InvalidationPublisher for RecordingPublisher {
        fn publish_key_invalidation(&self, key: &CacheKey) {
            self.invalidated.lock().unwrap().push(key.to_string());
        }
        fn publish_tag_invalidation(&self, tag: &str) {
            self.invalidated.lock().unwrap().push(tag.to_string());
        }
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::new(id, 0, vec![])
    }

    #[tokio::test]
    async fn l2_hit_warms_l1() {
        let l1 = Arc::new(FakeL1::default());
        let l2: Arc<dyn StorageProvider> = Arc::new(InMemoryStorageProvider::new());
        l2.set(&key("a"), CacheValue::new(Raw::from_static(b"v"), None, None), None, &[])
            .await
            .unwrap();

        let storage = HybridStorage::new(Some(l1.clone()), Some(l2), HybridStorageConfig::default(), None);
        let result = storage.get(&key("a")).await.unwrap();
        assert!(result.is_some());
        assert!(l1.get(&key("a")).await.is_some());
    }

    #[tokio::test]
    async fn remove_notifies_publisher() {
        let l1 = Arc::new(FakeL1::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let storage: HybridStorage<FakeL1> =
            HybridStorage::new(Some(l1), None, HybridStorageConfig::default(), Some(publisher.clone()));

        storage.remove(&key("a")).await.unwrap();
        assert_eq!(publisher.invalidated.lock().unwrap().len(), 1);
    }
}
