//! Bounded, concurrent, tag-aware in-process key/value store (module D: L1).
//!
//! Sharded like `spineldb`'s `Database` (`core/database/eviction.rs`): each shard is
//! locked independently so an eviction pass in one shard never blocks a read in
//! another. Eviction sampling (`SAMPLE_SIZE` candidates, pick the worst, repeat) is
//! the same reservoir-sampling approximation `spineldb` uses for its LRU/LFU/TTL
//! eviction policies, rather than maintaining exact per-policy ordering structures.

use cachekit_backend::TagIndex;
use cachekit_backend::storage::StorageStats;
use cachekit_core::{CacheKey, CacheValue, Raw};
use chrono::Utc;
use rand::Rng;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Approximation depth for eviction sampling, matching `spineldb`'s `SAMPLE_SIZE`.
const SAMPLE_SIZE: usize = 5;

/// Fraction of a shard's entries evicted in one pass once a bound is crossed.
const EVICTION_FRACTION: f64 = 0.1;

/// Which entries an over-capacity shard evicts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Evict the least-recently-used entry.
    #[default]
    Lru,
    /// Evict the least-frequently-used entry.
    Lfu,
    /// Evict the oldest-inserted entry, ignoring access patterns.
    Fifo,
    /// Evict the entry closest to expiry first; entries with no TTL are evicted last.
    TtlFirst,
}

/// Tuning knobs for [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Evict once the total live entry count reaches this.
    pub max_items: usize,
    /// Evict once the estimated memory usage reaches this many bytes.
    pub max_bytes: usize,
    /// Which policy picks eviction victims.
    pub eviction_policy: EvictionPolicy,
    /// How many independently-locked shards to split entries across.
    pub shard_count: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_items: 100_000,
            max_bytes: 256 * 1024 * 1024,
            eviction_policy: EvictionPolicy::Lru,
            shard_count: 16,
        }
    }
}

/// Raised by [`MemoryStore::get_typed`] when a cached value's recorded type tag
/// doesn't match what the caller expects (§4.D `TypeMismatch`). The mismatching
/// entry is removed as part of reporting this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cached value's type tag did not match the requested type")]
pub struct TypeMismatch;

#[derive(Debug, Clone)]
struct Entry {
    value: CacheValue<Raw>,
    type_tag: Option<SmolStr>,
    inserted_at_millis: u64,
    last_accessed_millis: u64,
    access_count: u64,
}

impl Entry {
    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.value.data().len()
    }
}

#[derive(Debug, Default)]
struct Shard {
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// A bounded, concurrent key/value store with tag support, TTL, and eviction.
///
/// This is the cache runtime's L1 tier: always in-process, never fallible. Every
/// public operation here corresponds 1:1 to §4.D.
#[derive(Debug)]
pub struct MemoryStore {
    shards: Vec<Shard>,
    tags: TagIndex,
    counters: Counters,
    config: MemoryStoreConfig,
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

impl MemoryStore {
    /// Builds a store with the given configuration.
    pub fn new(config: MemoryStoreConfig) -> Self {
        let shard_count = config.shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| Shard::default()).collect(),
            tags: TagIndex::new(),
            counters: Counters::default(),
            config,
        }
    }

    fn shard_for(&self, key: &CacheKey) -> &Shard {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Reads a value, removing and reporting a miss if it has lazily expired.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheValue<Raw>> {
        self.get_typed(key, None).ok().flatten()
    }

    /// Reads a value, additionally checking it was stored with a matching `type_tag`.
    ///
    /// A mismatch is reported as [`TypeMismatch`] and the offending entry is removed,
    /// matching §4.D's failure mode: treated as a miss from the caller's perspective.
    pub fn get_typed(
        &self,
        key: &CacheKey,
        type_tag: Option<&str>,
    ) -> Result<Option<CacheValue<Raw>>, TypeMismatch> {
        let shard = self.shard_for(key);
        let mut guard = shard.entries.lock().expect("memory store shard lock poisoned");

        let Some(entry) = guard.get_mut(key) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if entry.value.expire().is_some_and(|expire| expire <= Utc::now()) {
            guard.remove(key);
            drop(guard);
            self.tags.remove_key(key);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        if let (Some(expected), Some(actual)) = (type_tag, entry.type_tag.as_deref())
            && expected != actual
        {
            guard.remove(key);
            drop(guard);
            self.tags.remove_key(key);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Err(TypeMismatch);
        }

        entry.last_accessed_millis = now_millis();
        entry.access_count += 1;
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry.value.clone()))
    }

    /// Writes a value with an optional TTL and tag associations, evicting if the
    /// shard has crossed its capacity bound afterward.
    pub async fn set(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        ttl: Duration,
        tags: &[SmolStr],
    ) {
        self.set_typed(key, value, ttl, tags, None).await
    }

    /// [`set`](Self::set) with an explicit type tag, checked by [`get_typed`](Self::get_typed).
    pub async fn set_typed(
        &self,
        key: &CacheKey,
        value: CacheValue<Raw>,
        ttl: Duration,
        tags: &[SmolStr],
        type_tag: Option<SmolStr>,
    ) {
        let expire = Some(Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default());
        let stale = value.stale();
        let value = CacheValue::new(value.into_inner(), expire, stale);

        let entry = Entry {
            value,
            type_tag,
            inserted_at_millis: now_millis(),
            last_accessed_millis: now_millis(),
            access_count: 0,
        };

        let shard = self.shard_for(key);
        {
            let mut guard = shard.entries.lock().expect("memory store shard lock poisoned");
            guard.insert(key.clone(), entry);
        }

        if !tags.is_empty() {
            self.tags.associate(key.clone(), tags.iter().cloned());
        }

        self.evict_if_over_capacity(shard);
    }

    /// Removes a single key.
    pub async fn remove(&self, key: &CacheKey) {
        let shard = self.shard_for(key);
        shard
            .entries
            .lock()
            .expect("memory store shard lock poisoned")
            .remove(key);
        self.tags.remove_key(key);
    }

    /// Removes every key associated with `tag`, returning the count removed.
    pub async fn remove_by_tag(&self, tag: &str) -> u64 {
        let keys = self.tags.drain_tag(tag);
        for key in &keys {
            let shard = self.shard_for(key);
            shard
                .entries
                .lock()
                .expect("memory store shard lock poisoned")
                .remove(key);
        }
        keys.len() as u64
    }

    /// Whether `key` has a live (non-expired) entry.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        self.get(key).await.is_some()
    }

    /// Drops every entry and tag association.
    pub async fn clear(&self) {
        for shard in &self.shards {
            shard
                .entries
                .lock()
                .expect("memory store shard lock poisoned")
                .clear();
        }
    }

    /// Point-in-time counters: hits, misses, evictions, entry count, tag-mapping
    /// count, and an advisory estimate of memory usage.
    pub async fn stats(&self) -> StorageStats {
        let entry_count: usize = self
            .shards
            .iter()
            .map(|shard| shard.entries.lock().expect("shard lock poisoned").len())
            .sum();

        StorageStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entry_count: entry_count as u64,
            tag_count: self.tags.tag_count() as u64,
        }
    }

    /// Advisory-only estimate of total memory usage across all shards (open-question
    /// resolution #3: never load-bearing, purely diagnostic).
    pub fn estimated_memory_bytes(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .entries
                    .lock()
                    .expect("shard lock poisoned")
                    .values()
                    .map(Entry::memory_size)
                    .sum::<usize>()
            })
            .sum()
    }

    /// Spawns a background task that walks every shard on `interval` and removes
    /// entries past their expire timestamp, complementing the lazy removal
    /// [`get_typed`](Self::get_typed) performs on read. Keys that are written once and
    /// never read again would otherwise linger until an unrelated eviction pass;
    /// the sweeper bounds how long that can happen.
    ///
    /// Aborting the returned handle stops the sweeper; dropping it does not (the task
    /// keeps running detached), matching `tokio::spawn`'s usual semantics.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }

    /// Removes every currently-expired entry across all shards. Called on each
    /// sweeper tick; exposed separately so callers can also drive it manually (tests).
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        let mut removed_keys: Vec<CacheKey> = Vec::new();

        for shard in &self.shards {
            let mut guard = shard.entries.lock().expect("memory store shard lock poisoned");
            let expired: Vec<CacheKey> = guard
                .iter()
                .filter(|(_, entry)| entry.value.expire().is_some_and(|expire| expire <= now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                guard.remove(key);
            }
            removed_keys.extend(expired);
        }

        if !removed_keys.is_empty() {
            for key in &removed_keys {
                self.tags.remove_key(key);
            }
            tracing::debug!(count = removed_keys.len(), "sweeper removed expired entries");
        }
    }

    fn evict_if_over_capacity(&self, shard: &Shard) {
        let per_shard_max_items = self.config.max_items / self.shards.len().max(1);
        let per_shard_max_bytes = self.config.max_bytes / self.shards.len().max(1);

        let mut guard = shard.entries.lock().expect("memory store shard lock poisoned");
        let over_items = guard.len() >= per_shard_max_items.max(1);
        let over_bytes = guard.values().map(Entry::memory_size).sum::<usize>() >= per_shard_max_bytes.max(1);
        if !over_items && !over_bytes {
            return;
        }

        let target_evictions = ((guard.len() as f64) * EVICTION_FRACTION).ceil() as usize;
        let mut evicted = 0usize;
        let mut rng = rand::rng();

        while evicted < target_evictions && guard.len() > 0 {
            let keys: Vec<CacheKey> = guard.keys().cloned().collect();
            let sample_size = SAMPLE_SIZE.min(keys.len());
            let mut candidates: Vec<&CacheKey> = Vec::with_capacity(sample_size);
            for _ in 0..sample_size {
                let idx = rng.random_range(0..keys.len());
                candidates.push(&keys[idx]);
            }

            let Some(victim) = self.pick_victim(&guard, &candidates) else {
                break;
            };
            guard.remove(&victim);
            evicted += 1;
        }

        drop(guard);
        if evicted > 0 {
            self.counters.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    fn pick_victim(
        &self,
        entries: &HashMap<CacheKey, Entry>,
        candidates: &[&CacheKey],
    ) -> Option<CacheKey> {
        candidates
            .iter()
            .min_by_key(|key| {
                let entry = &entries[**key];
                match self.config.eviction_policy {
                    EvictionPolicy::Lru => entry.last_accessed_millis,
                    EvictionPolicy::Lfu => entry.access_count,
                    EvictionPolicy::Fifo => entry.inserted_at_millis,
                    EvictionPolicy::TtlFirst => entry
                        .value
                        .expire()
                        .map(|e| e.timestamp_millis().max(0) as u64)
                        .unwrap_or(u64::MAX),
                }
            })
            .map(|key| (*key).clone())
    }
}
