//! Integration tests for `CachingClient` using wiremock.

use std::sync::Arc;
use std::time::Duration;

use cachekit::concurrency::BroadcastConcurrencyManager;
use cachekit::offload::OffloadManager;
use cachekit::CacheBehaviorPolicy;
use cachekit_backend::hybrid::{HybridStorage, HybridStorageConfig};
use cachekit_backend::keygen::KeyGenerator;
use cachekit_http::HttpCacheHandler;
use cachekit_memory::{MemoryStore, MemoryStoreConfig};
use cachekit_reqwest::CachingClient;
use reqwest::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn caching_client(_method_path: &str, _ttl: Duration) -> CachingClient<MemoryStore> {
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
        CacheBehaviorPolicy::default(),
        vec![],
    );
    CachingClient::new(Client::new(), Arc::new(handler))
}

fn get(url: &str) -> reqwest::Request {
    reqwest::Request::new(reqwest::Method::GET, url.parse().unwrap())
}

/// Test 1: Cache MISS then HIT - basic caching works.
#[tokio::test]
async fn test_cache_miss_then_hit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "message": "Hello from server"
                }))
                .insert_header("cache-control", "max-age=60"),
        )
        .expect(1) // Should only be called once due to caching
        .mount(&mock_server)
        .await;

    let client = caching_client("GET /data", Duration::from_secs(60));
    let url = format!("{}/data", mock_server.uri());

    // First request - should be a cache miss
    let response1 = client.execute(get(&url)).await.unwrap();
    assert_eq!(response1.status(), 200);
    assert_eq!(response1.headers().get("x-cache-status").unwrap(), "MISS");
    let body1: serde_json::Value = serde_json::from_str(&response1.text().await.unwrap()).unwrap();
    assert_eq!(body1["message"], "Hello from server");

    // Second request - should be a cache hit
    let response2 = client.execute(get(&url)).await.unwrap();
    assert_eq!(response2.status(), 200);
    assert_eq!(response2.headers().get("x-cache-status").unwrap(), "HIT");
    let body2: serde_json::Value = serde_json::from_str(&response2.text().await.unwrap()).unwrap();
    assert_eq!(body2["message"], "Hello from server");
}

/// Test 2: Response integrity - body, headers, status preserved after caching.
#[tokio::test]
async fn test_response_integrity() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/headers"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("response body content")
                .insert_header("x-custom-header", "custom-value")
                .insert_header("x-another-header", "another-value")
                .insert_header("cache-control", "max-age=60"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = caching_client("GET /headers", Duration::from_secs(60));
    let url = format!("{}/headers", mock_server.uri());

    let response1 = client.execute(get(&url)).await.unwrap();
    assert_eq!(response1.status(), 200);
    assert_eq!(
        response1.headers().get("x-custom-header").unwrap(),
        "custom-value"
    );
    assert_eq!(
        response1.headers().get("x-another-header").unwrap(),
        "another-value"
    );
    assert_eq!(response1.text().await.unwrap(), "response body content");

    let response2 = client.execute(get(&url)).await.unwrap();
    assert_eq!(response2.headers().get("x-cache-status").unwrap(), "HIT");
    assert_eq!(response2.status(), 200);
    assert_eq!(
        response2.headers().get("x-custom-header").unwrap(),
        "custom-value"
    );
    assert_eq!(
        response2.headers().get("x-another-header").unwrap(),
        "another-value"
    );
    assert_eq!(response2.text().await.unwrap(), "response body content");
}

/// Test 3: a response with no freshness information is never cached, so
/// upstream is called on every request for it.
#[tokio::test]
async fn test_missing_freshness_is_never_cached() {
    let mock_server = MockServer::start().await;

    let body = "x".repeat(200);
    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .expect(2) // called on every request since the response is never cacheable
        .mount(&mock_server)
        .await;

    let client = caching_client("GET /large", Duration::from_secs(60));
    let url = format!("{}/large", mock_server.uri());

    let response1 = client.execute(get(&url)).await.unwrap();
    assert_eq!(response1.status(), 200);
    assert_eq!(response1.headers().get("x-cache-status").unwrap(), "MISS");
    assert_eq!(response1.text().await.unwrap(), body);

    let response2 = client.execute(get(&url)).await.unwrap();
    assert_eq!(response2.status(), 200);
    assert_eq!(
        response2.headers().get("x-cache-status").unwrap(),
        "MISS",
        "response carries no explicit freshness info, so it's never cached"
    );
    assert_eq!(response2.text().await.unwrap(), body);
}
