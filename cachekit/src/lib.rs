#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Cross-instance invalidation fan-out (module G).
pub mod backplane;

/// Dogpile prevention via striped/broadcast concurrency management (module H).
pub mod concurrency;

/// Error types for cache operations.
pub mod error;

/// Orchestrates a single cacheable call: policy resolution, key derivation, storage,
/// stampede protection, and upstream fallback (module L).
pub mod invocation;

/// Metrics collection for cache observability (module N2).
pub mod metrics;

/// Background task offloading for stale-while-revalidate (module N1).
pub mod offload;

/// Runtime-level policy knobs (stale handling, concurrency limits).
pub mod policy;

/// Resolves the effective policy for a method from a stack of sources (module K).
pub mod policy_registry;

/// Where per-method policy values come from (module J).
pub mod policy_source;

pub use error::CacheError;
pub use invocation::{InvocationCore, InvocationResult, Outcome};
pub use policy::{CacheBehaviorPolicy, ConcurrencyLimit, RefreshMode, StalePolicy};
pub use policy_registry::PolicyRegistry;
pub use policy_source::{PolicySource, RuntimeOverrides, StaticPolicySource};

pub use cachekit_core::{CacheKey, CacheState, CacheValue, MethodId, Raw};

/// The `cachekit` prelude.
///
/// ```rust
/// use cachekit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{CacheError, InvocationCore, InvocationResult, Outcome};
    pub use cachekit_core::{CacheKey, MethodId};
}
