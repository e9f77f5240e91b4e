//! Integration tests for `CacheService` over a `tower::service_fn` upstream.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use cachekit::concurrency::BroadcastConcurrencyManager;
use cachekit::offload::OffloadManager;
use cachekit::CacheBehaviorPolicy;
use cachekit_backend::hybrid::{HybridStorage, HybridStorageConfig};
use cachekit_backend::keygen::KeyGenerator;
use cachekit_http::{BufferedBody, HttpCacheHandler};
use cachekit_memory::{MemoryStore, MemoryStoreConfig};
use cachekit_tower::Cache;
use http::{Request, Response};
use http_body_util::Full;
use tower::{Layer, Service, service_fn};

fn handler() -> Arc<HttpCacheHandler<MemoryStore>> {
    let storage = Arc::new(HybridStorage::new(
        Some(Arc::new(MemoryStore::new(MemoryStoreConfig::default()))),
        None,
        HybridStorageConfig::default(),
        None,
    ));
    Arc::new(HttpCacheHandler::new(
        storage,
        KeyGenerator::default(),
        Arc::new(BroadcastConcurrencyManager::new()),
        OffloadManager::with_defaults(),
        CacheBehaviorPolicy::default(),
        vec![],
    ))
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream_calls = calls.clone();
    let upstream = service_fn(move |_req: Request<BufferedBody<Full<Bytes>>>| {
        let calls = upstream_calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(
                Response::builder()
                    .status(200)
                    .header("cache-control", "max-age=60")
                    .body(Full::new(Bytes::from_static(b"{}")))
                    .unwrap(),
            )
        }
    });

    let mut service = Cache::new(handler()).layer(upstream);

    for _ in 0..2 {
        let request = Request::builder()
            .method("GET")
            .uri("https://example.com/widgets")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = service.call(request).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
