use bytes::Bytes;
use cachekit_core::Raw;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Response, response::Parts};
use hyper::body::Body as HttpBody;
use serde::{Deserialize, Serialize};

use crate::CacheableSubject;
use crate::body::BufferedBody;

/// A buffered HTTP response, ready to be serialized into the cache or built back up
/// from a cached [`SerializableHttpResponse`].
#[derive(Debug)]
pub struct CacheableHttpResponse<ResBody>
where
    ResBody: HttpBody,
{
    pub parts: Parts,
    pub body: BufferedBody<ResBody>,
}

impl<ResBody> CacheableHttpResponse<ResBody>
where
    ResBody: HttpBody,
{
    /// Wraps an `http::Response` for caching.
    pub fn from_response(response: Response<BufferedBody<ResBody>>) -> Self {
        let (parts, body) = response.into_parts();
        CacheableHttpResponse { parts, body }
    }

    /// Unwraps back into a plain `http::Response`.
    pub fn into_response(self) -> Response<BufferedBody<ResBody>> {
        Response::from_parts(self.parts, self.body)
    }
}

impl<ResBody> CacheableSubject for CacheableHttpResponse<ResBody>
where
    ResBody: HttpBody,
{
    type Body = ResBody;
    type Parts = Parts;

    fn into_parts(self) -> (Self::Parts, BufferedBody<Self::Body>) {
        (self.parts, self.body)
    }

    fn from_parts(parts: Self::Parts, body: BufferedBody<Self::Body>) -> Self {
        Self { parts, body }
    }
}

impl<ResBody> CacheableHttpResponse<ResBody>
where
    ResBody: HttpBody + Send + 'static,
    ResBody::Data: Send,
{
    /// Buffers the body and flattens status, version, headers, and body into a
    /// [`SerializableHttpResponse`] suitable for storing as [`Raw`] bytes.
    ///
    /// Returns the original response, reconstructed, if the body fails to collect.
    pub async fn into_cached(self) -> Result<SerializableHttpResponse, Self> {
        match self.body.collect().await {
            Ok(body) => Ok(SerializableHttpResponse {
                status: self.parts.status,
                version: format!("{:?}", self.parts.version),
                body,
                headers: self.parts.headers,
                stored_at: Utc::now(),
            }),
            Err(error_body) => Err(CacheableHttpResponse {
                parts: self.parts,
                body: error_body,
            }),
        }
    }
}

/// Flattened, serializable snapshot of an HTTP response: status, version, headers,
/// and fully-buffered body.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SerializableHttpResponse {
    #[serde(with = "http_serde::status_code")]
    status: http::StatusCode,
    version: String,
    body: Bytes,
    #[serde(with = "http_serde::header_map")]
    headers: HeaderMap,
    /// When this snapshot was written into the cache, for computing the response's
    /// age (RFC 9111 §4.2.3) on a later read rather than trusting a static TTL.
    stored_at: DateTime<Utc>,
}

impl SerializableHttpResponse {
    /// Rebuilds a `BufferedBody`-wrapped response from a cached snapshot.
    pub fn into_response<ResBody>(self) -> CacheableHttpResponse<ResBody>
    where
        ResBody: HttpBody,
    {
        let body = BufferedBody::Complete(Some(self.body));
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        CacheableHttpResponse::from_response(response)
    }

    /// The response's status code.
    pub fn status(&self) -> http::StatusCode {
        self.status
    }

    /// The response's headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// When this snapshot was stored.
    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    /// Updates stored metadata from a `304 Not Modified` response received while
    /// revalidating (RFC 9111 §4.3.4): the cached body is kept as-is, but any header
    /// the fresh response carries replaces the stored one, and the freshness clock
    /// restarts from now.
    pub fn refresh_from_not_modified(&mut self, fresh_headers: &HeaderMap) {
        for (name, value) in fresh_headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self.stored_at = Utc::now();
    }

    /// Serializes this snapshot with `bincode`, the same compact format
    /// [`cachekit_backend::serializer::Serializer`] uses for other cached values.
    pub fn to_raw(&self) -> Result<Raw, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map(|bytes| Raw::from(bytes))
    }

    /// Deserializes a snapshot previously produced by [`Self::to_raw`].
    pub fn from_raw(raw: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        bincode::serde::decode_from_slice(raw, bincode::config::standard())
            .map(|(value, _)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    #[tokio::test]
    async fn into_cached_then_to_raw_round_trips() {
        let response = Response::builder()
            .status(200)
            .header("content-type", "application/json")
            .body(BufferedBody::Passthrough(Full::new(Bytes::from(
                "{\"ok\":true}",
            ))))
            .unwrap();
        let cached = CacheableHttpResponse::from_response(response)
            .into_cached()
            .await
            .expect("body collects");

        let raw = cached.to_raw().expect("encodes");
        let decoded = SerializableHttpResponse::from_raw(&raw).expect("decodes");
        assert_eq!(decoded.status(), http::StatusCode::OK);
        assert_eq!(
            decoded.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
