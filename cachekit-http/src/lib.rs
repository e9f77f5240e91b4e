#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod body;
mod cache_status;
mod cacheable;
pub mod freshness;
mod handler;
pub mod query;
mod request;
mod response;

pub use body::{BufferedBody, CollectExactResult, PartialBufferedBody, Remaining};
pub use cache_status::{
    CACHE_AGE_HEADER, CACHE_TTL_HEADER, CacheStatusExt, DEFAULT_CACHE_STATUS_HEADER, HttpCacheOutcome,
};
pub use cacheable::CacheableSubject;
pub use handler::HttpCacheHandler;
pub use request::CacheableHttpRequest;
pub use response::{CacheableHttpResponse, SerializableHttpResponse};
