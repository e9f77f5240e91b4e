#![doc = include_str!("../README.md")]

mod client;
mod upstream;

pub use client::CachingClient;
pub use upstream::buffered_body_to_reqwest;

pub use cachekit_http::{
    BufferedBody, CacheableHttpRequest, CacheableHttpResponse, DEFAULT_CACHE_STATUS_HEADER,
    HttpCacheHandler, SerializableHttpResponse,
};

/// Re-export of the reqwest body type, for convenience in type annotations.
pub use reqwest::Body as ReqwestBody;

pub use cachekit::{CacheBehaviorPolicy, CacheError, Outcome};
pub use cachekit::concurrency::{BroadcastConcurrencyManager, ConcurrencyManager, NoopConcurrencyManager};
pub use cachekit::offload::OffloadManager;
