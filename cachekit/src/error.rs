//! Error types surfaced by the cache runtime.

use cachekit_backend::error::{BackendError, KeyGenError};

/// Top-level error returned by [`crate::invocation`] operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Cache key generation failed.
    #[error("cache key generation failed: {0}")]
    KeyGen(#[from] KeyGenError),
    /// The storage layer (L1 and/or L2) failed.
    #[error("storage backend error: {0}")]
    Backend(#[from] BackendError),
    /// The upstream call the cache is fronting failed.
    #[error("upstream call failed: {0}")]
    Upstream(String),
    /// Waiting for an in-flight request to resolve failed.
    #[error("in-flight request did not resolve: {0}")]
    Concurrency(String),
}
