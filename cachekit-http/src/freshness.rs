//! RFC 9111 cacheability and freshness rules (module M).
//!
//! This module has no teacher counterpart: HTTP semantics are re-derived from
//! RFC 9111 directly rather than ported, grounded on the request/response wrapper
//! types the rest of this crate already provides.

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, StatusCode, header};

/// Parsed `Cache-Control` directives relevant to caching a response.
///
/// Unrecognized directives are ignored; malformed numeric directives are treated as
/// absent rather than rejecting the whole header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControlDirectives {
    /// `no-store`: never cache this response.
    pub no_store: bool,
    /// `no-cache`: may cache, but must revalidate before reuse.
    pub no_cache: bool,
    /// `private`: not cacheable by a shared cache.
    pub private: bool,
    /// `max-age=N`.
    pub max_age: Option<Duration>,
    /// `s-maxage=N`, overriding `max-age` for shared caches.
    pub s_maxage: Option<Duration>,
    /// `stale-while-revalidate=N`.
    pub stale_while_revalidate: Option<Duration>,
    /// `stale-if-error=N`.
    pub stale_if_error: Option<Duration>,
    /// `must-revalidate`: stale responses must not be served without revalidation.
    pub must_revalidate: bool,
    /// `immutable`: never needs revalidation while fresh.
    pub immutable: bool,
}

impl CacheControlDirectives {
    /// Parses every `Cache-Control` header present on `headers`, merging directives
    /// across repeated occurrences (as HTTP permits for list-valued headers).
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut directives = Self::default();
        for value in headers.get_all(header::CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for token in value.split(',') {
                let token = token.trim();
                let (name, arg) = match token.split_once('=') {
                    Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                    None => (token, None),
                };
                match name.to_ascii_lowercase().as_str() {
                    "no-store" => directives.no_store = true,
                    "no-cache" => directives.no_cache = true,
                    "private" => directives.private = true,
                    "must-revalidate" => directives.must_revalidate = true,
                    "immutable" => directives.immutable = true,
                    "max-age" => directives.max_age = arg.and_then(parse_seconds),
                    "s-maxage" => directives.s_maxage = arg.and_then(parse_seconds),
                    "stale-while-revalidate" => {
                        directives.stale_while_revalidate = arg.and_then(parse_seconds);
                    }
                    "stale-if-error" => directives.stale_if_error = arg.and_then(parse_seconds),
                    _ => {}
                }
            }
        }
        directives
    }
}

fn parse_seconds(raw: &str) -> Option<Duration> {
    raw.parse::<u64>().ok().map(Duration::from_secs)
}

/// Why a response was judged non-cacheable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonCacheableReason {
    /// `Cache-Control: no-store` was present.
    NoStore,
    /// `Cache-Control: private` was present.
    Private,
    /// The request method isn't cacheable (anything but `GET`/`HEAD`).
    NonCacheableMethod,
    /// The status code has no defined cacheable semantics.
    UnsupportedStatus,
    /// No freshness information (`max-age`, `s-maxage`, or `Expires`) was present.
    MissingFreshnessInfo,
}

/// Whether a response may be stored at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cacheability {
    /// Safe to store and later reuse.
    Cacheable,
    /// Must not be stored, or stored but never served without revalidation.
    NonCacheable(NonCacheableReason),
}

/// Status codes RFC 9111 §3 lists as cacheable by default, absent explicit
/// freshness information to the contrary.
const DEFAULT_CACHEABLE_STATUSES: &[StatusCode] = &[
    StatusCode::OK,
    StatusCode::NON_AUTHORITATIVE_INFORMATION,
    StatusCode::NO_CONTENT,
    StatusCode::PARTIAL_CONTENT,
    StatusCode::MULTIPLE_CHOICES,
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::NOT_FOUND,
    StatusCode::METHOD_NOT_ALLOWED,
    StatusCode::GONE,
    StatusCode::URI_TOO_LONG,
    StatusCode::NOT_IMPLEMENTED,
];

/// Whether the request method is one this cache ever stores a response for.
pub fn is_cacheable_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

/// Decides whether a response may be cached, given its status and directives.
///
/// Freshness information (`max-age`/`s-maxage`/`Expires`) is required unless the
/// status is one of RFC 9111's defaults-to-cacheable statuses.
pub fn should_cache_response(
    status: StatusCode,
    directives: &CacheControlDirectives,
    headers: &HeaderMap,
) -> Cacheability {
    if directives.no_store {
        return Cacheability::NonCacheable(NonCacheableReason::NoStore);
    }
    if directives.private {
        return Cacheability::NonCacheable(NonCacheableReason::Private);
    }
    let has_freshness = directives.max_age.is_some()
        || directives.s_maxage.is_some()
        || headers.contains_key(header::EXPIRES);
    if !has_freshness && !DEFAULT_CACHEABLE_STATUSES.contains(&status) {
        return Cacheability::NonCacheable(NonCacheableReason::MissingFreshnessInfo);
    }
    if status.as_u16() >= 600 {
        return Cacheability::NonCacheable(NonCacheableReason::UnsupportedStatus);
    }
    Cacheability::Cacheable
}

/// Computes how long a response stays fresh, per RFC 9111 §4.2.1: `s-maxage` wins
/// for shared caches, then `max-age`, then `Expires` minus `Date` (or "now" if no
/// `Date` header is present).
pub fn freshness_lifetime(directives: &CacheControlDirectives, headers: &HeaderMap) -> Option<Duration> {
    if let Some(s_maxage) = directives.s_maxage {
        return Some(s_maxage);
    }
    if let Some(max_age) = directives.max_age {
        return Some(max_age);
    }
    let expires = parse_http_date(headers, header::EXPIRES)?;
    let date = parse_http_date(headers, header::DATE).unwrap_or_else(Utc::now);
    let lifetime = expires.signed_duration_since(date);
    lifetime.to_std().ok()
}

fn parse_http_date(headers: &HeaderMap, name: header::HeaderName) -> Option<DateTime<Utc>> {
    let value = headers.get(name)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Response age per RFC 9111 §4.2.3, given when it was stored and an optional
/// `Age` header value already present on the upstream response.
pub fn response_age(stored_at: DateTime<Utc>, now: DateTime<Utc>, upstream_age: Option<Duration>) -> Duration {
    let resident_time = (now - stored_at).to_std().unwrap_or_default();
    upstream_age.unwrap_or_default() + resident_time
}

/// Whether a response of the given age and freshness lifetime is still fresh.
pub fn is_fresh(age: Duration, freshness_lifetime: Duration) -> bool {
    age < freshness_lifetime
}

/// Whether a stale response may still be served without revalidation, per the
/// `stale-while-revalidate` extension (RFC 5861).
pub fn within_stale_while_revalidate(
    age: Duration,
    freshness_lifetime: Duration,
    directives: &CacheControlDirectives,
) -> bool {
    if directives.must_revalidate {
        return false;
    }
    match directives.stale_while_revalidate {
        Some(window) => age < freshness_lifetime + window,
        None => false,
    }
}

/// Parses an upstream-reported `Age` header (RFC 9111 §5.1), if present and
/// well-formed. Fed into [`response_age`] so a response re-served by an intermediate
/// cache still accumulates age correctly rather than resetting to zero here.
pub fn response_reported_age(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(header::AGE)?.to_str().ok()?;
    value.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn parses_max_age_and_stale_while_revalidate() {
        let headers = headers(&[(
            header::CACHE_CONTROL,
            "max-age=60, stale-while-revalidate=30",
        )]);
        let directives = CacheControlDirectives::parse(&headers);
        assert_eq!(directives.max_age, Some(Duration::from_secs(60)));
        assert_eq!(directives.stale_while_revalidate, Some(Duration::from_secs(30)));
    }

    #[test]
    fn no_store_overrides_everything() {
        let headers = headers(&[(header::CACHE_CONTROL, "no-store, max-age=60")]);
        let directives = CacheControlDirectives::parse(&headers);
        assert_eq!(
            should_cache_response(StatusCode::OK, &directives, &headers),
            Cacheability::NonCacheable(NonCacheableReason::NoStore)
        );
    }

    #[test]
    fn missing_freshness_on_non_default_status_is_not_cacheable() {
        let headers = HeaderMap::new();
        let directives = CacheControlDirectives::default();
        assert_eq!(
            should_cache_response(StatusCode::CREATED, &directives, &headers),
            Cacheability::NonCacheable(NonCacheableReason::MissingFreshnessInfo)
        );
    }

    #[test]
    fn not_found_is_cacheable_without_explicit_freshness() {
        let headers = HeaderMap::new();
        let directives = CacheControlDirectives::default();
        assert_eq!(
            should_cache_response(StatusCode::NOT_FOUND, &directives, &headers),
            Cacheability::Cacheable
        );
    }

    #[test]
    fn stale_while_revalidate_extends_the_serve_window() {
        let directives = CacheControlDirectives {
            stale_while_revalidate: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let fresh_for = Duration::from_secs(60);
        assert!(within_stale_while_revalidate(
            Duration::from_secs(70),
            fresh_for,
            &directives
        ));
        assert!(!within_stale_while_revalidate(
            Duration::from_secs(100),
            fresh_for,
            &directives
        ));
    }

    #[test]
    fn parses_reported_age() {
        let headers = headers(&[(header::AGE, "42")]);
        assert_eq!(response_reported_age(&headers), Some(Duration::from_secs(42)));
        assert_eq!(response_reported_age(&HeaderMap::new()), None);
    }
}
