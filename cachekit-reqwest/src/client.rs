//! Cache-aware reqwest client.
//!
//! `cachekit`'s stampede protection ([`cachekit::concurrency::BroadcastConcurrencyManager`])
//! spawns the upstream call onto a background task so concurrent callers for the
//! same key can subscribe to the in-flight result, which requires the upstream
//! future passed to [`cachekit_http::HttpCacheHandler::handle`] to be `'static`.
//! `reqwest_middleware::Next<'a>` borrows the remaining middleware chain and can't
//! satisfy that bound, so instead of implementing `reqwest_middleware::Middleware`
//! this wraps a `reqwest::Client` directly and owns the whole request/response
//! round trip.

use std::sync::Arc;

use cachekit::CacheError;
use cachekit_backend::hybrid::L1Store;
use cachekit_http::{BufferedBody, CacheableHttpRequest, HttpCacheHandler};

use crate::upstream::buffered_body_to_reqwest;

/// A [`reqwest::Client`] fronted by a [`cachekit_http::HttpCacheHandler`].
///
/// Caches GET/HEAD responses according to the policy resolved for each request's
/// method id, coalescing concurrent requests for the same key.
pub struct CachingClient<L1> {
    client: reqwest::Client,
    handler: Arc<HttpCacheHandler<L1>>,
}

impl<L1: L1Store + 'static> CachingClient<L1> {
    /// Wraps `client` with caching through `handler`.
    pub fn new(client: reqwest::Client, handler: Arc<HttpCacheHandler<L1>>) -> Self {
        Self { client, handler }
    }

    /// Executes `request`, serving it from cache when the policy allows.
    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, CacheError> {
        let http_request: http::Request<reqwest::Body> = request
            .try_into()
            .map_err(|err: reqwest::Error| CacheError::Upstream(err.to_string()))?;
        let (parts, body) = http_request.into_parts();
        let buffered_request = http::Request::from_parts(parts, BufferedBody::Passthrough(body));
        let cacheable_request = CacheableHttpRequest::from_request(buffered_request);

        let client = self.client.clone();
        let response = self
            .handler
            .handle(cacheable_request, move |request| async move {
                let (parts, body) = request.into_parts();
                let body = buffered_body_to_reqwest(body);
                let reqwest_request: reqwest::Request = http::Request::from_parts(parts, body)
                    .try_into()
                    .map_err(|err: reqwest::Error| err.to_string())?;

                let response = client
                    .execute(reqwest_request)
                    .await
                    .map_err(|err| err.to_string())?;
                let status = response.status();
                let version = response.version();
                let headers = response.headers().clone();
                let bytes = response.bytes().await.map_err(|err| err.to_string())?;

                let mut builder = http::Response::builder().status(status).version(version);
                *builder.headers_mut().expect("builder not yet finalized") = headers;
                builder.body(bytes).map_err(|err| err.to_string())
            })
            .await?;

        let (parts, body) = response.into_response().into_parts();
        let bytes = match body {
            BufferedBody::Complete(Some(bytes)) => bytes,
            BufferedBody::Complete(None) => bytes::Bytes::new(),
            BufferedBody::Passthrough(_) | BufferedBody::Partial(_) => {
                unreachable!("HttpCacheHandler always returns a fully buffered response body")
            }
        };
        let reqwest_response: reqwest::Response =
            http::Response::from_parts(parts, reqwest::Body::from(bytes)).into();
        Ok(reqwest_response)
    }
}
