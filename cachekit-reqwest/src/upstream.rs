//! Conversions between [`BufferedBody`] and [`reqwest::Body`].

use bytes::Bytes;
use cachekit_http::BufferedBody;

/// Converts a buffered request body back into a `reqwest::Body` for dispatch.
///
/// - Passthrough: unwraps the inner body (zero cost).
/// - Complete: builds a body from the buffered bytes.
/// - Partial: wraps `PartialBufferedBody`, which replays the buffered prefix
///   then the remaining stream (or surfaces the read error) as an `HttpBody`.
pub fn buffered_body_to_reqwest(buffered: BufferedBody<reqwest::Body>) -> reqwest::Body {
    match buffered {
        BufferedBody::Passthrough(body) => body,
        BufferedBody::Complete(Some(bytes)) => reqwest::Body::from(bytes),
        BufferedBody::Complete(None) => reqwest::Body::from(Bytes::new()),
        BufferedBody::Partial(partial) => reqwest::Body::wrap(partial),
    }
}
