//! Drives RFC 9111 freshness and revalidation over a single upstream (module M).
//!
//! Unlike the rest of this crate's call sites, this handler stores through
//! [`HybridStorage`] directly instead of delegating to [`cachekit::InvocationCore`]:
//! an HTTP response's lifetime comes from its own `Cache-Control`/`Expires` headers,
//! discovered fresh on every upstream call, not from a statically configured policy
//! duration, so key derivation, storage, and stampede protection are driven here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cachekit::concurrency::{ConcurrencyDecision, ConcurrencyManager};
use cachekit::offload::{OffloadKey, OffloadManager};
use cachekit::{CacheBehaviorPolicy, CacheError, StalePolicy};
use cachekit_backend::hybrid::{HybridStorage, L1Store};
use cachekit_backend::keygen::KeyGenerator;
use cachekit_core::{CacheKey, CacheValue, Raw};
use chrono::Utc;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use http_body_util::Full;
use hyper::body::Body as HttpBody;
use tracing::{debug, warn};

use crate::body::BufferedBody;
use crate::cache_status::{CacheStatusExt, DEFAULT_CACHE_STATUS_HEADER, HttpCacheOutcome};
use crate::freshness::{
    Cacheability, CacheControlDirectives, freshness_lifetime, is_cacheable_method, is_fresh,
    response_age, response_reported_age, should_cache_response, within_stale_while_revalidate,
};
use crate::request::CacheableHttpRequest;
use crate::response::{CacheableHttpResponse, SerializableHttpResponse};

/// HTTP-facing cache in front of a single upstream, wiring [`CacheableHttpRequest`]/
/// [`CacheableHttpResponse`] into a [`HybridStorage`] tier through header-driven
/// freshness rather than a configured cache policy.
pub struct HttpCacheHandler<L1> {
    storage: Arc<HybridStorage<L1>>,
    keygen: KeyGenerator,
    concurrency: Arc<dyn ConcurrencyManager>,
    offload: OffloadManager,
    behavior: CacheBehaviorPolicy,
    vary_headers: Vec<String>,
    status_header: HeaderName,
}

impl<L1: L1Store + 'static> HttpCacheHandler<L1> {
    /// Builds a handler over an existing storage tier.
    ///
    /// `vary_headers` lists request headers whose values participate in the cache key
    /// (in addition to the request's query string) — the HTTP analogue of a `Vary`
    /// response header, applied proactively rather than learned per-response.
    pub fn new(
        storage: Arc<HybridStorage<L1>>,
        keygen: KeyGenerator,
        concurrency: Arc<dyn ConcurrencyManager>,
        offload: OffloadManager,
        behavior: CacheBehaviorPolicy,
        vary_headers: Vec<String>,
    ) -> Self {
        Self {
            storage,
            keygen,
            concurrency,
            offload,
            behavior,
            vary_headers,
            status_header: DEFAULT_CACHE_STATUS_HEADER,
        }
    }

    /// Overrides the header name used to stamp the cache outcome (`x-cache-status` by
    /// default).
    pub fn with_status_header(mut self, header: HeaderName) -> Self {
        self.status_header = header;
        self
    }

    /// Serves `request`, calling `upstream` at most once per logical cache miss or
    /// synchronous revalidation (a stale-while-revalidate hit may call it once more,
    /// in the background, after this call already returned).
    ///
    /// `upstream` receives the unwrapped `http::Request` and must produce a fully
    /// buffered `http::Response<Bytes>` — any streaming response must be collected
    /// by the caller before it reaches here, since a cached copy needs the whole body.
    pub async fn handle<ReqBody, F, Fut>(
        &self,
        request: CacheableHttpRequest<ReqBody>,
        upstream: F,
    ) -> Result<CacheableHttpResponse<Full<Bytes>>, CacheError>
    where
        ReqBody: HttpBody + Send + 'static,
        ReqBody::Data: Send,
        F: FnOnce(http::Request<BufferedBody<ReqBody>>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<http::Response<Bytes>, String>> + Send + 'static,
    {
        let method = request.parts().method.clone();
        if !is_cacheable_method(&method) {
            let response = upstream(request.into_request()).await.map_err(CacheError::Upstream)?;
            let mut response = buffer_upstream_response(response);
            response.set_http_cache_status(HttpCacheOutcome::Miss, &self.status_header, None, None);
            return Ok(response);
        }

        let uri = request.parts().uri.clone();
        let version = request.parts().version;
        let headers = request.parts().headers.clone();
        let vary: Vec<&str> = self.vary_headers.iter().map(String::as_str).collect();
        let method_id = request.method_id();
        let args = request.canonical_args(&vary);
        let key = self.keygen.generate(&method_id, &args, None)?;

        let stored = self.storage.get(&key).await.map_err(CacheError::Backend)?;
        let Some(stored_value) = stored else {
            return self.fetch_and_store(&key, request.into_request(), upstream).await;
        };

        let cached = SerializableHttpResponse::from_raw(stored_value.data())
            .map_err(|err| CacheError::Upstream(err.to_string()))?;
        let directives = CacheControlDirectives::parse(cached.headers());
        let now = Utc::now();
        let age = response_age(cached.stored_at(), now, response_reported_age(cached.headers()));
        let lifetime = freshness_lifetime(&directives, cached.headers()).unwrap_or_default();

        if is_fresh(age, lifetime) {
            let mut response = cached.into_response::<Full<Bytes>>();
            response.set_http_cache_status(
                HttpCacheOutcome::Fresh,
                &self.status_header,
                Some(age),
                Some(lifetime.saturating_sub(age)),
            );
            return Ok(response);
        }

        let validators = Validators::from_headers(cached.headers());

        if within_stale_while_revalidate(age, lifetime, &directives) {
            let conditional_req = build_conditional_request::<ReqBody>(&method, &uri, version, &headers, &validators);
            self.spawn_background_revalidate(key.clone(), conditional_req, upstream);
            let mut response = cached.into_response::<Full<Bytes>>();
            response.set_http_cache_status(
                HttpCacheOutcome::StaleWhileRevalidate,
                &self.status_header,
                Some(age),
                None,
            );
            return Ok(response);
        }

        match self.behavior.stale {
            StalePolicy::Return => {
                let mut response = cached.into_response::<Full<Bytes>>();
                response.set_http_cache_status(HttpCacheOutcome::Stale, &self.status_header, Some(age), None);
                Ok(response)
            }
            StalePolicy::OffloadRevalidate => {
                let conditional_req = build_conditional_request::<ReqBody>(&method, &uri, version, &headers, &validators);
                self.spawn_background_revalidate(key.clone(), conditional_req, upstream);
                let mut response = cached.into_response::<Full<Bytes>>();
                response.set_http_cache_status(HttpCacheOutcome::Stale, &self.status_header, Some(age), None);
                Ok(response)
            }
            StalePolicy::Revalidate => {
                let conditional_req = build_conditional_request::<ReqBody>(&method, &uri, version, &headers, &validators);
                self.revalidate_sync(&key, cached, directives, age, conditional_req, upstream).await
            }
        }
    }

    /// No stored entry: runs `upstream` under dogpile protection and stores the
    /// result if it turns out to carry explicit freshness information.
    async fn fetch_and_store<ReqBody, F, Fut>(
        &self,
        key: &CacheKey,
        raw_request: http::Request<BufferedBody<ReqBody>>,
        upstream: F,
    ) -> Result<CacheableHttpResponse<Full<Bytes>>, CacheError>
    where
        ReqBody: HttpBody + Send + 'static,
        ReqBody::Data: Send,
        F: FnOnce(http::Request<BufferedBody<ReqBody>>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<http::Response<Bytes>, String>> + Send + 'static,
    {
        let concurrency = self
            .behavior
            .concurrency
            .map(|limit| usize::from(limit.get()))
            .unwrap_or(usize::MAX);

        let (cached, outcome, ttl) = match self.concurrency.check(key, concurrency) {
            ConcurrencyDecision::Await(waiter) => match waiter.await {
                Ok(value) => {
                    let cached = SerializableHttpResponse::from_raw(value.data())
                        .map_err(|err| CacheError::Upstream(err.to_string()))?;
                    (cached, HttpCacheOutcome::Coalesced, None)
                }
                Err(err) => {
                    debug!(?err, "coalesced wait failed, falling back to direct upstream call");
                    self.concurrency.cleanup(key);
                    let response = upstream(raw_request).await.map_err(CacheError::Upstream)?;
                    let (cached, value, ttl) = self.store_fresh_response(key, response).await?;
                    self.concurrency.resolve(key, &value);
                    (cached, HttpCacheOutcome::Miss, ttl)
                }
            },
            ConcurrencyDecision::Proceed(_permit) | ConcurrencyDecision::ProceedWithoutPermit => {
                let response = upstream(raw_request).await.map_err(CacheError::Upstream)?;
                let (cached, value, ttl) = self.store_fresh_response(key, response).await?;
                self.concurrency.resolve(key, &value);
                (cached, HttpCacheOutcome::Miss, ttl)
            }
        };

        let mut response = cached.into_response::<Full<Bytes>>();
        response.set_http_cache_status(outcome, &self.status_header, None, ttl);
        Ok(response)
    }

    /// Buffers an upstream response and, if it is cacheable and carries explicit
    /// freshness information, stores it. Returns the buffered snapshot, a
    /// [`CacheValue`] suitable for resolving dogpile waiters, and the freshness
    /// lifetime actually used (`None` if the response was served but not stored).
    async fn store_fresh_response(
        &self,
        key: &CacheKey,
        response: http::Response<Bytes>,
    ) -> Result<(SerializableHttpResponse, CacheValue<Raw>, Option<Duration>), CacheError> {
        let (parts, body) = response.into_parts();
        let cacheable = CacheableHttpResponse::from_response(http::Response::from_parts(
            parts,
            BufferedBody::<Full<Bytes>>::Complete(Some(body)),
        ));
        let cached = cacheable
            .into_cached()
            .await
            .map_err(|_| CacheError::Upstream("failed to buffer response body".to_string()))?;
        let directives = CacheControlDirectives::parse(cached.headers());
        let lifetime = cacheable_lifetime(cached.status(), &directives, cached.headers());
        let raw = cached.to_raw().map_err(|err| CacheError::Upstream(err.to_string()))?;
        let value = CacheValue::new(raw, None, None);
        if let Some(lifetime) = lifetime {
            let l1_ttl = lifetime + directives.stale_while_revalidate.unwrap_or_default().max(
                directives.stale_if_error.unwrap_or_default(),
            );
            self.storage
                .set(key, value.clone(), Some(l1_ttl), &[])
                .await
                .map_err(CacheError::Backend)?;
        }
        Ok((cached, value, lifetime))
    }

    /// Stale beyond any `stale-while-revalidate` window, with [`StalePolicy::Revalidate`]
    /// configured: blocks the caller on a conditional request to the origin.
    async fn revalidate_sync<ReqBody, F, Fut>(
        &self,
        key: &CacheKey,
        cached: SerializableHttpResponse,
        directives: CacheControlDirectives,
        age: Duration,
        conditional_req: http::Request<BufferedBody<ReqBody>>,
        upstream: F,
    ) -> Result<CacheableHttpResponse<Full<Bytes>>, CacheError>
    where
        ReqBody: HttpBody + Send + 'static,
        ReqBody::Data: Send,
        F: FnOnce(http::Request<BufferedBody<ReqBody>>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<http::Response<Bytes>, String>> + Send + 'static,
    {
        match upstream(conditional_req).await {
            Ok(response) if response.status() == StatusCode::NOT_MODIFIED => {
                let mut refreshed = cached;
                refreshed.refresh_from_not_modified(response.headers());
                let new_directives = CacheControlDirectives::parse(refreshed.headers());
                let lifetime = cacheable_lifetime(refreshed.status(), &new_directives, refreshed.headers());
                let raw = refreshed.to_raw().map_err(|err| CacheError::Upstream(err.to_string()))?;
                let value = CacheValue::new(raw, None, None);
                if let Some(lifetime) = lifetime {
                    let l1_ttl = lifetime
                        + new_directives
                            .stale_while_revalidate
                            .unwrap_or_default()
                            .max(new_directives.stale_if_error.unwrap_or_default());
                    self.storage
                        .set(key, value.clone(), Some(l1_ttl), &[])
                        .await
                        .map_err(CacheError::Backend)?;
                }
                self.concurrency.resolve(key, &value);
                let mut response = refreshed.into_response::<Full<Bytes>>();
                response.set_http_cache_status(
                    HttpCacheOutcome::Revalidated,
                    &self.status_header,
                    Some(Duration::ZERO),
                    lifetime,
                );
                Ok(response)
            }
            Ok(response) => {
                let (cached, value, lifetime) = self.store_fresh_response(key, response).await?;
                self.concurrency.resolve(key, &value);
                let mut response = cached.into_response::<Full<Bytes>>();
                response.set_http_cache_status(
                    HttpCacheOutcome::Revalidated,
                    &self.status_header,
                    Some(Duration::ZERO),
                    lifetime,
                );
                Ok(response)
            }
            Err(err) => {
                self.concurrency.cleanup(key);
                let lifetime = freshness_lifetime(&directives, cached.headers()).unwrap_or_default();
                let within_stale_if_error = directives
                    .stale_if_error
                    .is_some_and(|window| age < lifetime + window);
                if within_stale_if_error {
                    warn!(error = %err, "revalidation failed, serving stale-if-error copy");
                    let mut response = cached.into_response::<Full<Bytes>>();
                    response.set_http_cache_status(
                        HttpCacheOutcome::StaleIfError,
                        &self.status_header,
                        Some(age),
                        None,
                    );
                    Ok(response)
                } else {
                    Err(CacheError::Upstream(err))
                }
            }
        }
    }

    /// Serves a stale-while-revalidate or offload-revalidate hit immediately; the
    /// conditional request to the origin happens on an offload task, deduplicated by
    /// cache key so concurrent stale hits for the same entry don't each spawn one.
    fn spawn_background_revalidate<ReqBody, F, Fut>(
        &self,
        key: CacheKey,
        conditional_req: http::Request<BufferedBody<ReqBody>>,
        upstream: F,
    ) where
        ReqBody: HttpBody + Send + 'static,
        ReqBody::Data: Send,
        F: FnOnce(http::Request<BufferedBody<ReqBody>>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<http::Response<Bytes>, String>> + Send + 'static,
    {
        let storage = self.storage.clone();
        let concurrency = self.concurrency.clone();
        self.offload.spawn_with_key(OffloadKey::Cache(key.clone()), async move {
            let stored = match storage.get(&key).await {
                Ok(Some(value)) => value,
                _ => return,
            };
            let Ok(cached) = SerializableHttpResponse::from_raw(stored.data()) else {
                return;
            };

            match upstream(conditional_req).await {
                Ok(response) if response.status() == StatusCode::NOT_MODIFIED => {
                    let mut refreshed = cached;
                    refreshed.refresh_from_not_modified(response.headers());
                    let directives = CacheControlDirectives::parse(refreshed.headers());
                    let Some(lifetime) = cacheable_lifetime(refreshed.status(), &directives, refreshed.headers())
                    else {
                        return;
                    };
                    let Ok(raw) = refreshed.to_raw() else { return };
                    let l1_ttl = lifetime
                        + directives
                            .stale_while_revalidate
                            .unwrap_or_default()
                            .max(directives.stale_if_error.unwrap_or_default());
                    let value = CacheValue::new(raw, None, None);
                    if let Err(err) = storage.set(&key, value.clone(), Some(l1_ttl), &[]).await {
                        warn!(error = %err, "background revalidation failed to store 304 refresh");
                        return;
                    }
                    concurrency.resolve(&key, &value);
                }
                Ok(response) => {
                    let (parts, body) = response.into_parts();
                    let cacheable = CacheableHttpResponse::from_response(http::Response::from_parts(
                        parts,
                        BufferedBody::<Full<Bytes>>::Complete(Some(body)),
                    ));
                    let Ok(fresh) = cacheable.into_cached().await else { return };
                    let directives = CacheControlDirectives::parse(fresh.headers());
                    let Some(lifetime) = cacheable_lifetime(fresh.status(), &directives, fresh.headers()) else {
                        return;
                    };
                    let Ok(raw) = fresh.to_raw() else { return };
                    let l1_ttl = lifetime
                        + directives
                            .stale_while_revalidate
                            .unwrap_or_default()
                            .max(directives.stale_if_error.unwrap_or_default());
                    let value = CacheValue::new(raw, None, None);
                    if let Err(err) = storage.set(&key, value.clone(), Some(l1_ttl), &[]).await {
                        warn!(error = %err, "background revalidation failed to store");
                        return;
                    }
                    concurrency.resolve(&key, &value);
                }
                Err(err) => warn!(error = %err, "background revalidation upstream call failed"),
            }
        });
    }
}

/// `ETag`/`Last-Modified` validators lifted off a cached response, used to build the
/// conditional request sent when revalidating it.
struct Validators {
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl Validators {
    fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: headers.get(header::ETAG).cloned(),
            last_modified: headers.get(header::LAST_MODIFIED).cloned(),
        }
    }
}

/// Rebuilds a request against the same method/URI/headers the original caller sent,
/// adding `If-None-Match`/`If-Modified-Since` from the cached response's validators
/// (RFC 9111 §4.3.1). `http::request::Parts` isn't `Clone`, so this reconstructs by
/// hand rather than cloning the original request's parts.
fn build_conditional_request<ReqBody>(
    method: &Method,
    uri: &http::Uri,
    version: http::Version,
    headers: &HeaderMap,
    validators: &Validators,
) -> http::Request<BufferedBody<ReqBody>>
where
    ReqBody: HttpBody,
{
    let mut builder = http::Request::builder().method(method.clone()).uri(uri.clone()).version(version);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    if let Some(etag) = &validators.etag {
        builder = builder.header(header::IF_NONE_MATCH, etag.clone());
    }
    if let Some(last_modified) = &validators.last_modified {
        builder = builder.header(header::IF_MODIFIED_SINCE, last_modified.clone());
    }
    builder
        .body(BufferedBody::Complete(None))
        .expect("conditional request built from a valid method/URI/headers always builds")
}

/// Whether a response may be stored at all, gating the RFC 9111 default-cacheable-
/// status exception behind an explicit freshness requirement: this cache only ever
/// stores a response whose lifetime it can actually compute from headers, so a
/// heuristic (header-less) freshness lifetime is never synthesized.
fn cacheable_lifetime(status: StatusCode, directives: &CacheControlDirectives, headers: &HeaderMap) -> Option<Duration> {
    if matches!(
        should_cache_response(status, directives, headers),
        Cacheability::NonCacheable(_)
    ) {
        return None;
    }
    freshness_lifetime(directives, headers)
}

fn buffer_upstream_response(response: http::Response<Bytes>) -> CacheableHttpResponse<Full<Bytes>> {
    let (parts, body) = response.into_parts();
    CacheableHttpResponse::from_response(http::Response::from_parts(
        parts,
        BufferedBody::Complete(Some(body)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachekit::concurrency::BroadcastConcurrencyManager;
    use cachekit_backend::hybrid::HybridStorageConfig;
    use cachekit_memory::{MemoryStore, MemoryStoreConfig};
    use http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handler() -> HttpCacheHandler<MemoryStore> {
        let storage = Arc::new(HybridStorage::new(
            Some(Arc::new(MemoryStore::new(MemoryStoreConfig::default()))),
            None,
            HybridStorageConfig::default(),
            None,
        ));
        HttpCacheHandler::new(
            storage,
            KeyGenerator::default(),
            Arc::new(BroadcastConcurrencyManager::new()),
            OffloadManager::with_defaults(),
            CacheBehaviorPolicy::default(),
            vec![],
        )
    }

    fn get(uri: &str) -> CacheableHttpRequest<Full<Bytes>> {
        CacheableHttpRequest::from_request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(BufferedBody::<Full<Bytes>>::Complete(None))
                .unwrap(),
        )
    }

    fn body_bytes(body: &BufferedBody<Full<Bytes>>) -> Bytes {
        match body {
            BufferedBody::Complete(Some(bytes)) => bytes.clone(),
            BufferedBody::Complete(None) => Bytes::new(),
            other => panic!("expected a buffered body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let handler = handler();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let response = handler
                .handle(get("https://example.com/orders/42"), move |_req| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(http::Response::builder()
                        .status(200)
                        .header("cache-control", "max-age=60")
                        .body(Bytes::from_static(b"{}"))
                        .unwrap())
                })
                .await
                .unwrap();
            assert_eq!(response.parts.status, http::StatusCode::OK);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn response_with_no_freshness_info_is_never_cached() {
        let handler = handler();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            handler
                .handle(get("https://example.com/orders/7"), move |_req| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(http::Response::builder()
                        .status(201)
                        .body(Bytes::from_static(b"{}"))
                        .unwrap())
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_while_revalidate_serves_stale_then_refreshes_in_background() {
        let handler = handler();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_1 = calls.clone();
        let first = handler
            .handle(get("https://example.com/quote"), move |_req| async move {
                calls_1.fetch_add(1, Ordering::SeqCst);
                Ok(http::Response::builder()
                    .status(200)
                    .header("cache-control", "max-age=0, stale-while-revalidate=60")
                    .body(Bytes::from_static(b"v1"))
                    .unwrap())
            })
            .await
            .unwrap();
        assert_eq!(body_bytes(&first.body), Bytes::from_static(b"v1"));

        let calls_2 = calls.clone();
        let second = handler
            .handle(get("https://example.com/quote"), move |_req| async move {
                calls_2.fetch_add(1, Ordering::SeqCst);
                Ok(http::Response::builder()
                    .status(200)
                    .header("cache-control", "max-age=60")
                    .body(Bytes::from_static(b"v2"))
                    .unwrap())
            })
            .await
            .unwrap();
        assert_eq!(
            second.parts.headers.get(DEFAULT_CACHE_STATUS_HEADER).unwrap(),
            "STALE-WHILE-REVALIDATE"
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        let third = handler
            .handle(get("https://example.com/quote"), move |_req| async move {
                panic!("fresh hit should not call upstream");
            })
            .await
            .unwrap();
        assert_eq!(
            third.parts.headers.get(DEFAULT_CACHE_STATUS_HEADER).unwrap(),
            "HIT"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn revalidate_policy_handles_304_by_keeping_the_stored_body() {
        let storage = Arc::new(HybridStorage::new(
            Some(Arc::new(MemoryStore::new(MemoryStoreConfig::default()))),
            None,
            HybridStorageConfig::default(),
            None,
        ));
        let handler = HttpCacheHandler::new(
            storage,
            KeyGenerator::default(),
            Arc::new(BroadcastConcurrencyManager::new()),
            OffloadManager::with_defaults(),
            CacheBehaviorPolicy {
                stale: StalePolicy::Revalidate,
                ..Default::default()
            },
            vec![],
        );

        let first = handler
            .handle(get("https://example.com/widgets/1"), move |_req| async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("cache-control", "max-age=0")
                    .header("etag", "\"abc\"")
                    .body(Bytes::from_static(b"widget-1"))
                    .unwrap())
            })
            .await
            .unwrap();
        assert_eq!(body_bytes(&first.body), Bytes::from_static(b"widget-1"));

        let second = handler
            .handle(get("https://example.com/widgets/1"), move |req| async move {
                assert_eq!(req.headers().get("if-none-match").unwrap(), "\"abc\"");
                Ok(http::Response::builder()
                    .status(304)
                    .body(Bytes::new())
                    .unwrap())
            })
            .await
            .unwrap();
        assert_eq!(second.parts.status, http::StatusCode::OK);
        assert_eq!(body_bytes(&second.body), Bytes::from_static(b"widget-1"));
        assert_eq!(
            second.parts.headers.get(DEFAULT_CACHE_STATUS_HEADER).unwrap(),
            "REVALIDATED"
        );
    }
}
