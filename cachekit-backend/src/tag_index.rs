//! Tag-to-key reverse index for bulk invalidation (module C).
//!
//! Uses a sharded `DashMap` for lock-striped concurrent access, the same pattern
//! applied to the tag/key bipartite mapping as elsewhere in this crate.

use cachekit_core::CacheKey;
use dashmap::DashMap;
use smol_str::SmolStr;
use std::collections::HashSet;

/// Maps tags to the set of keys associated with them, and keys back to their tags.
///
/// Operations are atomic with respect to a single `TagIndex` instance. Under concurrent
/// `associate` calls for overlapping (key, tag) pairs, the index converges to whatever
/// the last-writer's call established for that key — consistent with §4.C's relaxed
/// ordering guarantee; lagging deletions from a since-evicted key are tolerated.
#[derive(Debug, Default)]
pub struct TagIndex {
    tag_to_keys: DashMap<SmolStr, HashSet<CacheKey>>,
    key_to_tags: DashMap<CacheKey, HashSet<SmolStr>>,
}

impl TagIndex {
    /// Builds an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `key` with every tag in `tags`, replacing any previous association
    /// for `key` (the last `associate` call for a key wins).
    pub fn associate(&self, key: CacheKey, tags: impl IntoIterator<Item = SmolStr>) {
        let tags: HashSet<SmolStr> = tags.into_iter().collect();

        if let Some((_, previous_tags)) = self.key_to_tags.remove(&key) {
            for tag in previous_tags.difference(&tags) {
                if let Some(mut keys) = self.tag_to_keys.get_mut(tag) {
                    keys.remove(&key);
                }
            }
        }

        for tag in &tags {
            self.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }

        if !tags.is_empty() {
            self.key_to_tags.insert(key, tags);
        }
    }

    /// Removes `key` from every tag it was associated with.
    pub fn remove_key(&self, key: &CacheKey) {
        if let Some((_, tags)) = self.key_to_tags.remove(key) {
            for tag in tags {
                if let Some(mut keys) = self.tag_to_keys.get_mut(&tag) {
                    keys.remove(key);
                }
            }
        }
    }

    /// Returns and removes every key associated with `tag`.
    pub fn drain_tag(&self, tag: &str) -> HashSet<CacheKey> {
        let Some((_, keys)) = self.tag_to_keys.remove(tag) else {
            return HashSet::new();
        };
        for key in &keys {
            if let Some(mut tags) = self.key_to_tags.get_mut(key) {
                tags.remove(tag);
            }
        }
        keys
    }

    /// Number of distinct tags currently tracked. Used for `MemoryStore::stats()`.
    pub fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }
}
