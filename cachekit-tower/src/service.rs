//! Tower service implementation for HTTP caching.
//!
//! This module provides [`CacheService`], the Tower [`Service`] that performs the
//! actual caching logic. Users typically don't construct this directly — it's
//! created by the [`Cache`](crate::Cache) layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use cachekit_backend::hybrid::L1Store;
use cachekit_http::{BufferedBody, CacheableHttpRequest, HttpCacheHandler};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Body as HttpBody;
use tower::{BoxError, Service};

/// Tower [`Service`] that wraps an upstream service with caching.
///
/// `CacheService` intercepts HTTP requests, checks the cache, and either
/// returns cached responses or forwards requests to the upstream service. It
/// adds a cache status header (`HIT`/`MISS`/`STALE`/`COALESCED`) to every
/// response.
///
/// You typically don't create this directly — it's produced when you apply a
/// [`Cache`](crate::Cache) layer to a service via [`tower::ServiceBuilder`].
pub struct CacheService<S, L1> {
    upstream: S,
    handler: Arc<HttpCacheHandler<L1>>,
}

impl<S, L1> CacheService<S, L1> {
    /// Wraps `upstream`, caching through `handler`.
    ///
    /// Prefer [`Cache`](crate::Cache) and [`tower::ServiceBuilder`] over
    /// constructing this directly.
    pub fn new(upstream: S, handler: Arc<HttpCacheHandler<L1>>) -> Self {
        CacheService { upstream, handler }
    }
}

impl<S: Clone, L1> Clone for CacheService<S, L1> {
    fn clone(&self) -> Self {
        Self {
            upstream: self.upstream.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<S, L1, ReqBody, ResBody> Service<Request<ReqBody>> for CacheService<S, L1>
where
    S: Service<Request<BufferedBody<ReqBody>>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
    ReqBody: HttpBody + Send + 'static,
    ReqBody::Data: Send,
    ResBody: HttpBody + Send + 'static,
    ResBody::Data: Send,
    L1: L1Store + 'static,
{
    type Response = Response<BufferedBody<Full<Bytes>>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.upstream.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (parts, body) = req.into_parts();
        let buffered_request = Request::from_parts(parts, BufferedBody::Passthrough(body));
        let cacheable_request = CacheableHttpRequest::from_request(buffered_request);

        let mut upstream = self.upstream.clone();
        let handler = self.handler.clone();

        Box::pin(async move {
            let response = handler
                .handle(cacheable_request, move |request| async move {
                    let response = upstream.call(request).await.map_err(|err| err.to_string())?;
                    let (parts, body) = response.into_parts();
                    let bytes = body
                        .collect()
                        .await
                        .map_err(|_| "failed to collect upstream response body".to_string())?
                        .to_bytes();
                    Ok(http::Response::from_parts(parts, bytes))
                })
                .await
                .map_err(Into::<BoxError>::into)?;
            Ok(response.into_response())
        })
    }
}
