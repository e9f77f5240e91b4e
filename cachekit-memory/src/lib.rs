#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod store;

use async_trait::async_trait;
use cachekit_backend::hybrid::L1Store;
use cachekit_backend::storage::StorageStats;
use cachekit_core::{CacheKey, CacheValue, Raw};
use smol_str::SmolStr;
use std::time::Duration;

pub use store::{EvictionPolicy, MemoryStore, MemoryStoreConfig, TypeMismatch};

#[async_trait]
impl L1Store for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Option<CacheValue<Raw>> {
        MemoryStore::get(self, key).await
    }

    async fn set(&self, key: &CacheKey, value: CacheValue<Raw>, ttl: Duration, tags: &[SmolStr]) {
        MemoryStore::set(self, key, value, ttl, tags).await
    }

    async fn remove(&self, key: &CacheKey) {
        MemoryStore::remove(self, key).await
    }

    async fn remove_by_tag(&self, tag: &str) -> u64 {
        MemoryStore::remove_by_tag(self, tag).await
    }

    async fn stats(&self) -> StorageStats {
        MemoryStore::stats(self).await
    }
}
