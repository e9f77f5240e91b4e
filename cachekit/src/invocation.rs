//! Orchestrates a single cacheable call: resolve policy, derive a key, consult storage,
//! arbitrate dogpiling callers, and fall back to upstream (module L).
//!
//! Implemented as plain async functions on [`InvocationCore`] rather than the teacher's
//! `State`/`Transition` finite-state-machine (see DESIGN.md's open-question resolutions):
//! the FSM's generic state enum existed to let a non-`Send`, poll-driven future avoid
//! boxing every intermediate step, a concern that doesn't apply once the flow is just
//! `async fn`s awaited normally under Tokio.

use std::future::Future;
use std::sync::Arc;

use cachekit_backend::hybrid::{HybridStorage, L1Store};
use cachekit_backend::keygen::{CanonicalArg, KeyGenerator};
use cachekit_core::value::CacheState;
use cachekit_core::{CacheKey, CacheValue, MethodId, Raw};
use chrono::Utc;
use smol_str::SmolStr;
use tracing::{debug, instrument};

use crate::concurrency::{ConcurrencyDecision, ConcurrencyManager};
use crate::error::CacheError;
use crate::offload::OffloadManager;
use crate::policy::{CacheBehaviorPolicy, RefreshMode, StalePolicy};
use crate::policy_registry::{PolicyRegistry, entity_config};

/// What an invocation returned and how it got there, for logging/metrics at the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served from cache, fresh.
    Hit,
    /// Served from cache, stale (per [`StalePolicy::Return`] or [`StalePolicy::OffloadRevalidate`]).
    Stale,
    /// Not found or expired; served from upstream and (if cacheable) stored.
    Miss,
    /// Waited on another in-flight call for the same key.
    Coalesced,
}

/// The result of one [`InvocationCore::invoke`] call.
#[derive(Debug)]
pub struct InvocationResult {
    /// The value served to the caller.
    pub value: CacheValue<Raw>,
    /// How it was produced.
    pub outcome: Outcome,
}

/// Builds a [`CacheValue`] with `expire` set `duration` out from now and, if
/// `stale_ttl` is configured, a `stale` timestamp `stale_ttl` out from now too (the
/// soft TTL). Once `stale_ttl` elapses but before `expire`, the entry reads as
/// [`CacheState::Stale`] and [`StalePolicy`] takes over instead of serving it plainly.
fn make_cache_value(data: Raw, duration: std::time::Duration, stale_ttl: Option<std::time::Duration>) -> CacheValue<Raw> {
    let now = Utc::now();
    let expire_at = now + chrono::Duration::from_std(duration).unwrap_or_default();
    let stale_at = stale_ttl.map(|st| now + chrono::Duration::from_std(st).unwrap_or_default());
    CacheValue::new(data, Some(expire_at), stale_at)
}

/// Ties together key derivation, policy resolution, storage, and stampede protection for
/// one logical cache in front of a set of upstream calls.
pub struct InvocationCore<L1> {
    storage: Arc<HybridStorage<L1>>,
    keygen: KeyGenerator,
    policies: PolicyRegistry,
    concurrency: Arc<dyn ConcurrencyManager>,
    offload: OffloadManager,
}

impl<L1: L1Store + 'static> InvocationCore<L1> {
    /// Builds an invocation core over the given storage, policy stack, and concurrency
    /// manager. Pass [`crate::concurrency::NoopConcurrencyManager`] to disable dogpile
    /// protection entirely.
    pub fn new(
        storage: Arc<HybridStorage<L1>>,
        keygen: KeyGenerator,
        policies: PolicyRegistry,
        concurrency: Arc<dyn ConcurrencyManager>,
        offload: OffloadManager,
    ) -> Self {
        Self {
            storage,
            keygen,
            policies,
            concurrency,
            offload,
        }
    }

    /// Runs one cacheable invocation of `method` with `args`.
    ///
    /// `upstream` is called at most once per logical miss (concurrent callers for the
    /// same key coalesce onto a single call, up to the policy's concurrency limit).
    #[instrument(skip(self, upstream), fields(method = %method))]
    pub async fn invoke<F, Fut>(
        &self,
        method: &MethodId,
        args: &[CanonicalArg],
        behavior: &CacheBehaviorPolicy,
        upstream: F,
    ) -> Result<InvocationResult, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Raw, String>> + Send + 'static,
    {
        let result = self.invoke_inner(method, args, behavior, upstream).await;
        if let Ok(result) = &result {
            crate::metrics::record_outcome(method.as_str(), result.outcome);
        }
        result
    }

    async fn invoke_inner<F, Fut>(
        &self,
        method: &MethodId,
        args: &[CanonicalArg],
        behavior: &CacheBehaviorPolicy,
        upstream: F,
    ) -> Result<InvocationResult, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Raw, String>> + Send + 'static,
    {
        let effective = self.policies.resolve(method).await;
        let Some(duration) = effective.policy.duration else {
            debug!("no cache duration configured, bypassing cache");
            let data = upstream().await.map_err(CacheError::Upstream)?;
            return Ok(InvocationResult {
                value: CacheValue::new(data, None, None),
                outcome: Outcome::Miss,
            });
        };
        let stale_ttl = entity_config(&effective).stale_ttl;

        let key = self.keygen.generate(method, args, effective.policy.version)?;
        let tags: Vec<SmolStr> = effective.policy.tags.clone();

        if let Some(value) = self.storage.get(&key).await.map_err(CacheError::Backend)? {
            match value.clone().cache_state() {
                CacheState::Actual(value) => {
                    return self
                        .handle_actual(method, &key, value, behavior, &tags, duration, stale_ttl, upstream)
                        .await;
                }
                CacheState::Stale(value) => {
                    return self
                        .handle_stale(method, &key, value, behavior, &tags, duration, stale_ttl, upstream)
                        .await;
                }
                CacheState::Expired(_) => {
                    // Fall through to a coalesced upstream fetch, same as a miss.
                }
            }
        }

        self.fetch_and_store(&key, &tags, duration, stale_ttl, behavior, upstream)
            .await
    }

    /// A hit that is still fresh. Per policy, this may still trigger a refresh in the
    /// background (or inline) to spread expirations out instead of letting them all
    /// dogpile upstream at the same instant (module L, "Probabilistic refresh" /
    /// "RefreshAhead").
    async fn handle_actual<F, Fut>(
        &self,
        method: &MethodId,
        key: &CacheKey,
        value: CacheValue<Raw>,
        behavior: &CacheBehaviorPolicy,
        tags: &[SmolStr],
        duration: std::time::Duration,
        stale_ttl: Option<std::time::Duration>,
        upstream: F,
    ) -> Result<InvocationResult, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Raw, String>> + Send + 'static,
    {
        match behavior.refresh {
            RefreshMode::None => Ok(InvocationResult { value, outcome: Outcome::Hit }),
            RefreshMode::Probabilistic { beta } => {
                let Some(ttl) = value.ttl() else {
                    return Ok(InvocationResult { value, outcome: Outcome::Hit });
                };
                let r = (ttl.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
                let probability = (1.0 - (-beta * (1.0 - r)).exp()).clamp(0.0, 1.0);
                if probability > 0.0 && rand::random::<f64>() < probability {
                    debug!(r, probability, "probabilistic refresh triggered on fresh hit");
                    self.spawn_background_refresh("probabilistic-refresh", method, key, tags, duration, stale_ttl, upstream);
                }
                Ok(InvocationResult { value, outcome: Outcome::Hit })
            }
            RefreshMode::RefreshAhead { window_secs } => {
                let window = std::time::Duration::from_secs(window_secs);
                if value.ttl().is_none_or(|ttl| ttl <= window) {
                    debug!(window_secs, "refresh-ahead window reached, scheduling background refresh");
                    self.spawn_background_refresh("refresh-ahead", method, key, tags, duration, stale_ttl, upstream);
                }
                Ok(InvocationResult { value, outcome: Outcome::Hit })
            }
        }
    }

    async fn handle_stale<F, Fut>(
        &self,
        method: &MethodId,
        key: &CacheKey,
        stale_value: CacheValue<Raw>,
        behavior: &CacheBehaviorPolicy,
        tags: &[SmolStr],
        duration: std::time::Duration,
        stale_ttl: Option<std::time::Duration>,
        upstream: F,
    ) -> Result<InvocationResult, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Raw, String>> + Send + 'static,
    {
        match behavior.stale {
            StalePolicy::Return => Ok(InvocationResult {
                value: stale_value,
                outcome: Outcome::Stale,
            }),
            StalePolicy::Revalidate => {
                self.fetch_and_store(key, tags, duration, stale_ttl, behavior, upstream)
                    .await
            }
            StalePolicy::OffloadRevalidate => {
                self.spawn_background_refresh("revalidate", method, key, tags, duration, stale_ttl, upstream);
                Ok(InvocationResult {
                    value: stale_value,
                    outcome: Outcome::Stale,
                })
            }
        }
    }

    /// Fires `upstream` on an offload task and, on success, writes the result back into
    /// storage with a freshly computed expiry (and stale window, if configured). Shared
    /// by [`StalePolicy::OffloadRevalidate`] and the proactive-refresh modes in
    /// [`Self::handle_actual`]; the caller keeps serving its current value in the
    /// meantime.
    fn spawn_background_refresh<F, Fut>(
        &self,
        kind: &'static str,
        method: &MethodId,
        key: &CacheKey,
        tags: &[SmolStr],
        duration: std::time::Duration,
        stale_ttl: Option<std::time::Duration>,
        upstream: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Raw, String>> + Send + 'static,
    {
        let storage = self.storage.clone();
        let key_owned = key.clone();
        let tags_owned = tags.to_vec();
        self.offload.spawn(format!("{kind}:{method}"), async move {
            match upstream().await {
                Ok(data) => {
                    let value = make_cache_value(data, duration, stale_ttl);
                    if let Err(err) = storage.set(&key_owned, value, Some(duration), &tags_owned).await {
                        tracing::warn!(error = %err, kind, "background refresh failed to store");
                    }
                }
                Err(err) => tracing::warn!(error = %err, kind, "background refresh upstream call failed"),
            }
        });
    }

    async fn fetch_and_store<F, Fut>(
        &self,
        key: &CacheKey,
        tags: &[SmolStr],
        duration: std::time::Duration,
        stale_ttl: Option<std::time::Duration>,
        behavior: &CacheBehaviorPolicy,
        upstream: F,
    ) -> Result<InvocationResult, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Raw, String>> + Send + 'static,
    {
        let concurrency = behavior
            .concurrency
            .map(|limit| usize::from(limit.get()))
            .unwrap_or(usize::MAX);

        let decision = self.concurrency.check(key, concurrency);
        let (value, outcome) = match decision {
            ConcurrencyDecision::Await(waiter) => match waiter.await {
                Ok(value) => (value, Outcome::Coalesced),
                Err(err) => {
                    debug!(?err, "coalesced wait failed, falling back to direct upstream call");
                    self.concurrency.cleanup(key);
                    let data = upstream().await.map_err(CacheError::Upstream)?;
                    (make_cache_value(data, duration, stale_ttl), Outcome::Miss)
                }
            },
            ConcurrencyDecision::Proceed(_permit) | ConcurrencyDecision::ProceedWithoutPermit => {
                let data = upstream().await.map_err(CacheError::Upstream)?;
                let value = make_cache_value(data, duration, stale_ttl);
                self.storage
                    .set(key, value.clone(), Some(duration), tags)
                    .await
                    .map_err(CacheError::Backend)?;
                self.concurrency.resolve(key, &value);
                (value, Outcome::Miss)
            }
        };

        Ok(InvocationResult { value, outcome })
    }

    /// Invalidates a single key, fanning the removal out to every storage tier and the
    /// invalidation publisher (if configured).
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.storage.remove(key).await.map_err(CacheError::Backend)
    }

    /// Invalidates every key under `tag`.
    pub async fn invalidate_tag(&self, tag: &str) -> Result<u64, CacheError> {
        self.storage.remove_by_tag(tag).await.map_err(CacheError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachekit_backend::hybrid::HybridStorageConfig;
    use cachekit_core::policy::CachePolicy;
    use cachekit_memory::{MemoryStore, MemoryStoreConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn core_with_ttl(secs: u64) -> InvocationCore<MemoryStore> {
        let storage = Arc::new(HybridStorage::new(
            Some(Arc::new(MemoryStore::new(MemoryStoreConfig::default()))),
            None,
            HybridStorageConfig::default(),
            None,
        ));
        let mut policies = PolicyRegistry::new();
        let mut source = crate::policy_source::StaticPolicySource::new("test");
        source.insert(
            MethodId::new("Orders.Get"),
            CachePolicy {
                duration: Some(std::time::Duration::from_secs(secs)),
                ..Default::default()
            },
        );
        policies.push(Arc::new(source));

        InvocationCore::new(
            storage,
            KeyGenerator::default(),
            policies,
            Arc::new(crate::concurrency::BroadcastConcurrencyManager::new()),
            OffloadManager::with_defaults(),
        )
    }

    #[tokio::test]
    async fn second_call_is_a_cache_hit() {
        let core = core_with_ttl(60);
        let method = MethodId::new("Orders.Get");
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let result = core
                .invoke(&method, &[], &CacheBehaviorPolicy::default(), move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Raw::from_static(b"payload"))
                    }
                })
                .await
                .unwrap();
            assert_eq!(result.value.data().as_ref(), &b"payload"[..]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call should hit cache, not call upstream again");
    }

    #[tokio::test]
    async fn uncached_method_calls_upstream_every_time() {
        let storage = Arc::new(HybridStorage::new(
            Some(Arc::new(MemoryStore::new(MemoryStoreConfig::default()))),
            None,
            HybridStorageConfig::default(),
            None,
        ));
        let core = InvocationCore::new(
            storage,
            KeyGenerator::default(),
            PolicyRegistry::new(),
            Arc::new(crate::concurrency::NoopConcurrencyManager),
            OffloadManager::with_defaults(),
        );
        let method = MethodId::new("Unconfigured.Method");
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            core.invoke(&method, &[], &CacheBehaviorPolicy::default(), move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Raw::from_static(b"payload"))
                }
            })
            .await
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
