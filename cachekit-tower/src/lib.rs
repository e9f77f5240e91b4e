#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Tower layer wrapping a service with an [`HttpCacheHandler`](cachekit_http::HttpCacheHandler).
pub mod layer;
/// The Tower service implementation that performs caching.
pub mod service;

pub use ::http::{Method, StatusCode};
pub use cachekit_http::DEFAULT_CACHE_STATUS_HEADER;
pub use layer::Cache;
pub use service::CacheService;
