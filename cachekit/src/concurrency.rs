//! Dogpile prevention (module H: stampede protection via striped locks).
//!
//! When a cache entry expires, many concurrent callers can notice the miss at once
//! and all fetch from upstream together. A [`ConcurrencyManager`] lets only the first
//! `concurrency` callers for a given key proceed; the rest wait on a broadcast channel
//! for whichever caller resolves first.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use cachekit_core::{CacheKey, CacheValue, Raw};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};

/// Errors that can occur while waiting for a concurrent request.
#[derive(Debug, Clone)]
pub enum ConcurrencyError {
    /// Receiver lagged behind and missed messages.
    Lagged(u64),
    /// Broadcast channel closed before receiving a value.
    Closed,
}

/// Result of a concurrency check: whether to proceed with the upstream call or await
/// the in-flight one.
pub enum ConcurrencyDecision {
    /// Proceed with the upstream call, holding a permit.
    Proceed(OwnedSemaphorePermit),
    /// Proceed without a permit (no concurrency control configured).
    ProceedWithoutPermit,
    /// Await the in-flight request's result.
    Await(Pin<Box<dyn Future<Output = Result<CacheValue<Raw>, ConcurrencyError>> + Send>>),
}

/// Arbitrates concurrent upstream calls for the same cache key.
pub trait ConcurrencyManager: Send + Sync {
    /// Decide whether this caller should proceed to upstream or await an in-flight call.
    fn check(&self, cache_key: &CacheKey, concurrency: usize) -> ConcurrencyDecision;

    /// Notify waiters that the upstream call resolved, handing them the value.
    fn resolve(&self, cache_key: &CacheKey, cache_value: &CacheValue<Raw>);

    /// Drop any bookkeeping for `cache_key`, e.g. after an error prevents `resolve`.
    fn cleanup(&self, cache_key: &CacheKey);
}

/// Always lets every caller proceed; no stampede protection.
#[derive(Debug, Default)]
pub struct NoopConcurrencyManager;

impl ConcurrencyManager for NoopConcurrencyManager {
    fn check(&self, _cache_key: &CacheKey, _concurrency: usize) -> ConcurrencyDecision {
        ConcurrencyDecision::ProceedWithoutPermit
    }

    fn resolve(&self, _cache_key: &CacheKey, _cache_value: &CacheValue<Raw>) {}

    fn cleanup(&self, _cache_key: &CacheKey) {}
}

/// Broadcast-based concurrency manager.
///
/// The first `concurrency` callers for a key acquire a semaphore permit and proceed to
/// upstream; everyone after that subscribes to a broadcast channel and waits for
/// whichever of them calls [`resolve`](Self::resolve) first.
#[derive(Debug)]
pub struct BroadcastConcurrencyManager {
    in_flight: DashMap<CacheKey, (broadcast::Sender<Arc<CacheValue<Raw>>>, Arc<Semaphore>)>,
}

impl BroadcastConcurrencyManager {
    /// Builds an empty manager.
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }
}

impl Default for BroadcastConcurrencyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrencyManager for BroadcastConcurrencyManager {
    fn check(&self, cache_key: &CacheKey, concurrency: usize) -> ConcurrencyDecision {
        match self.in_flight.entry(cache_key.clone()) {
            Entry::Occupied(entry) => {
                let (sender, semaphore) = entry.get();
                if let Ok(permit) = semaphore.clone().try_acquire_owned() {
                    ConcurrencyDecision::Proceed(permit)
                } else {
                    let mut receiver = sender.subscribe();
                    let future = Box::pin(async move {
                        match receiver.recv().await {
                            Ok(value) => Ok((*value).clone()),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                Err(ConcurrencyError::Lagged(n))
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                Err(ConcurrencyError::Closed)
                            }
                        }
                    });
                    ConcurrencyDecision::Await(future)
                }
            }
            Entry::Vacant(entry) => {
                let (sender, _receiver) = broadcast::channel(16);
                let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
                let permit = semaphore
                    .clone()
                    .try_acquire_owned()
                    .expect("first permit acquisition never fails");
                entry.insert((sender, semaphore));
                ConcurrencyDecision::Proceed(permit)
            }
        }
    }

    fn resolve(&self, cache_key: &CacheKey, cache_value: &CacheValue<Raw>) {
        if let Some((_, (sender, _semaphore))) = self.in_flight.remove(cache_key) {
            let shared = Arc::new(cache_value.clone());
            let _ = sender.send(shared);
        }
    }

    fn cleanup(&self, cache_key: &CacheKey) {
        self.in_flight.remove(cache_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key() -> CacheKey {
        CacheKey::new("demo", 0, vec![])
    }

    #[tokio::test]
    async fn second_caller_waits_for_first() {
        let manager = Arc::new(BroadcastConcurrencyManager::new());
        let decision = manager.check(&key(), 1);
        assert!(matches!(decision, ConcurrencyDecision::Proceed(_)));

        let waiter = match manager.check(&key(), 1) {
            ConcurrencyDecision::Await(fut) => fut,
            _ => panic!("expected second caller to wait"),
        };

        let value = CacheValue::new(Raw::from_static(b"v"), Some(Utc::now()), None);
        manager.resolve(&key(), &value);

        let resolved = waiter.await.unwrap();
        assert_eq!(resolved.data(), value.data());
    }
}
