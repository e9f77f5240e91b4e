//! Tower layer for HTTP caching.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use cachekit_tower::Cache;
//! use cachekit_http::HttpCacheHandler;
//! # fn build<L1: cachekit_backend::hybrid::L1Store + 'static>(handler: HttpCacheHandler<L1>) {
//! let cache_layer = Cache::new(Arc::new(handler));
//! # let _ = cache_layer;
//! # }
//! ```

use std::sync::Arc;

use cachekit_http::HttpCacheHandler;
use tower::Layer;

use crate::service::CacheService;

/// Tower [`Layer`] that adds HTTP caching to a service.
///
/// `Cache` wraps any Tower service that takes a buffered HTTP request and
/// returns an HTTP response with caching, driven by an already-configured
/// [`HttpCacheHandler`].
#[derive(Clone)]
pub struct Cache<L1> {
    handler: Arc<HttpCacheHandler<L1>>,
}

impl<L1> Cache<L1> {
    /// Wraps responses produced through `handler`.
    pub fn new(handler: Arc<HttpCacheHandler<L1>>) -> Self {
        Self { handler }
    }
}

impl<S, L1> Layer<S> for Cache<L1> {
    type Service = CacheService<S, L1>;

    fn layer(&self, upstream: S) -> Self::Service {
        CacheService::new(upstream, Arc::clone(&self.handler))
    }
}
