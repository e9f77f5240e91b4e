//! Cache status header for HTTP responses.

use std::time::Duration;

use http::{HeaderValue, header::HeaderName};
use hyper::body::Body as HttpBody;

use cachekit::Outcome;

use crate::CacheableHttpResponse;

/// Default header name for cache status (HIT/MISS/STALE/COALESCED).
pub const DEFAULT_CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache-status");

/// Header carrying a served response's age, in seconds, as tracked by this cache.
pub const CACHE_AGE_HEADER: HeaderName = HeaderName::from_static("x-cache-age");

/// Header carrying a served response's remaining freshness lifetime, in seconds.
pub const CACHE_TTL_HEADER: HeaderName = HeaderName::from_static("x-cache-ttl");

/// How an HTTP response was produced, per RFC 9111's freshness and revalidation
/// model (module M), distinct from the generic [`Outcome`] the invocation core uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCacheOutcome {
    /// Served from cache, still within its freshness lifetime.
    Fresh,
    /// Served from cache, stale, without revalidating (`StalePolicy::Return`).
    Stale,
    /// Served from cache, stale but within its `stale-while-revalidate` window; a
    /// revalidation request was sent to the origin in the background.
    StaleWhileRevalidate,
    /// Revalidation against the origin failed, but the response was still within
    /// its `stale-if-error` window, so the stale copy was served anyway.
    StaleIfError,
    /// Revalidated against the origin (a fresh 200, or a 304 against the stored
    /// copy) before being served.
    Revalidated,
    /// Waited on another in-flight request for the same key.
    Coalesced,
    /// Not found, or found but past any stale-serving window; fetched from upstream.
    Miss,
}

impl HttpCacheOutcome {
    fn as_header_value(self) -> HeaderValue {
        match self {
            HttpCacheOutcome::Fresh => HeaderValue::from_static("HIT"),
            HttpCacheOutcome::Stale => HeaderValue::from_static("STALE"),
            HttpCacheOutcome::StaleWhileRevalidate => {
                HeaderValue::from_static("STALE-WHILE-REVALIDATE")
            }
            HttpCacheOutcome::StaleIfError => HeaderValue::from_static("STALE-IF-ERROR"),
            HttpCacheOutcome::Revalidated => HeaderValue::from_static("REVALIDATED"),
            HttpCacheOutcome::Coalesced => HeaderValue::from_static("COALESCED"),
            HttpCacheOutcome::Miss => HeaderValue::from_static("MISS"),
        }
    }
}

/// Stamps cache-status headers onto a response, reflecting how it was produced.
pub trait CacheStatusExt {
    /// Inserts a header named `header` carrying `outcome`'s status text.
    fn set_cache_status(&mut self, outcome: Outcome, header: &HeaderName);

    /// Inserts `header` carrying `outcome`'s status text, plus `X-Cache-Age`/
    /// `X-Cache-Ttl` diagnostic headers whenever `age`/`ttl` are known.
    fn set_http_cache_status(
        &mut self,
        outcome: HttpCacheOutcome,
        header: &HeaderName,
        age: Option<Duration>,
        ttl: Option<Duration>,
    );
}

impl<ResBody> CacheStatusExt for CacheableHttpResponse<ResBody>
where
    ResBody: HttpBody,
{
    fn set_cache_status(&mut self, outcome: Outcome, header: &HeaderName) {
        let value = match outcome {
            Outcome::Hit => HeaderValue::from_static("HIT"),
            Outcome::Stale => HeaderValue::from_static("STALE"),
            Outcome::Miss => HeaderValue::from_static("MISS"),
            Outcome::Coalesced => HeaderValue::from_static("COALESCED"),
        };
        self.parts.headers.insert(header.clone(), value);
    }

    fn set_http_cache_status(
        &mut self,
        outcome: HttpCacheOutcome,
        header: &HeaderName,
        age: Option<Duration>,
        ttl: Option<Duration>,
    ) {
        self.parts
            .headers
            .insert(header.clone(), outcome.as_header_value());
        if let Some(age) = age {
            self.parts
                .headers
                .insert(CACHE_AGE_HEADER, HeaderValue::from(age.as_secs()));
        }
        if let Some(ttl) = ttl {
            self.parts
                .headers
                .insert(CACHE_TTL_HEADER, HeaderValue::from(ttl.as_secs()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BufferedBody;
    use http::Response;
    use http_body_util::Full;

    #[test]
    fn inserts_header_matching_outcome() {
        let response = Response::new(BufferedBody::<Full<bytes::Bytes>>::Complete(None));
        let mut response = CacheableHttpResponse::from_response(response);
        response.set_cache_status(Outcome::Hit, &DEFAULT_CACHE_STATUS_HEADER);
        assert_eq!(
            response.parts.headers.get(DEFAULT_CACHE_STATUS_HEADER).unwrap(),
            "HIT"
        );
    }

    #[test]
    fn http_cache_status_carries_age_and_ttl() {
        let response = Response::new(BufferedBody::<Full<bytes::Bytes>>::Complete(None));
        let mut response = CacheableHttpResponse::from_response(response);
        response.set_http_cache_status(
            HttpCacheOutcome::StaleWhileRevalidate,
            &DEFAULT_CACHE_STATUS_HEADER,
            Some(Duration::from_secs(70)),
            Some(Duration::from_secs(0)),
        );
        assert_eq!(
            response.parts.headers.get(DEFAULT_CACHE_STATUS_HEADER).unwrap(),
            "STALE-WHILE-REVALIDATE"
        );
        assert_eq!(response.parts.headers.get(CACHE_AGE_HEADER).unwrap(), "70");
        assert_eq!(response.parts.headers.get(CACHE_TTL_HEADER).unwrap(), "0");
    }
}
