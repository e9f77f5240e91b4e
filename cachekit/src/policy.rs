//! Runtime-level policy knobs layered on top of [`cachekit_core::policy`].
//!
//! `cachekit_core::policy` defines the merge model (fields, provenance, `merge_per_field`);
//! this module adds the operational knobs the invocation core reads off an
//! [`crate::policy_registry::PolicyRegistry`] resolution: how to treat stale data and
//! how many callers may race to upstream per key.

use bounded_integer::bounded_integer;
use serde::{Deserialize, Serialize};

bounded_integer! {
    /// Concurrency limit for dogpile prevention (1-255). A value of 1 means only one
    /// caller fetches from upstream at a time per key; the rest wait.
    #[repr(u8)]
    pub struct ConcurrencyLimit { 1..=255 }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self::new_saturating(1)
    }
}

/// How to treat a cache entry once it has gone stale but not yet expired.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub enum StalePolicy {
    /// Serve the stale value as-is, no revalidation.
    #[default]
    Return,
    /// Treat stale as a miss: block the caller and wait for a fresh value.
    Revalidate,
    /// Serve the stale value immediately and revalidate in the background (SWR).
    OffloadRevalidate,
}

/// Proactive-refresh stampede-protection mode for an otherwise-fresh hit.
///
/// Distinct from [`StalePolicy`], which only governs entries already past their
/// stale timestamp: these modes decide whether a hit that is still *fresh* should
/// trigger a refresh anyway, to spread out expirations instead of having them all
/// dogpile upstream at once. At most one mode is active at a time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum RefreshMode {
    /// No proactive refresh; a fresh hit is always returned as-is.
    #[default]
    None,
    /// On every hit, compute the remaining-lifetime ratio `r = ttl/duration` and
    /// refresh with probability `1 - exp(-beta * (1 - r))`.
    Probabilistic {
        /// Decay rate (β); higher values refresh more eagerly as `r` shrinks.
        beta: f64,
    },
    /// When the remaining TTL drops to or below `window_secs`, schedule a
    /// background refresh via the offload manager and keep serving the current
    /// value in the meantime.
    RefreshAhead {
        /// Remaining-TTL threshold, in seconds, that triggers a background refresh.
        window_secs: u64,
    },
}

/// Cache behavior knobs that aren't part of the field-level policy merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CacheBehaviorPolicy {
    /// How to handle a stale-but-not-expired hit.
    #[serde(default)]
    pub stale: StalePolicy,
    /// Concurrency limit for dogpile prevention. `None` means unlimited.
    #[serde(default)]
    pub concurrency: Option<ConcurrencyLimit>,
    /// Proactive-refresh mode applied to hits that are still fresh.
    #[serde(default)]
    pub refresh: RefreshMode,
}
