use cachekit_backend::keygen::CanonicalArg;
use cachekit_core::MethodId;
use http::{Request, request::Parts};
use hyper::body::Body as HttpBody;

use crate::CacheableSubject;
use crate::body::BufferedBody;

/// A buffered HTTP request, ready to be matched against cache policy and turned
/// into a cache key.
#[derive(Debug)]
pub struct CacheableHttpRequest<ReqBody>
where
    ReqBody: HttpBody,
{
    parts: Parts,
    body: BufferedBody<ReqBody>,
}

impl<ReqBody> CacheableHttpRequest<ReqBody>
where
    ReqBody: HttpBody,
{
    /// Wraps an `http::Request` for caching.
    pub fn from_request(request: Request<BufferedBody<ReqBody>>) -> Self {
        let (parts, body) = request.into_parts();
        Self { parts, body }
    }

    /// Unwraps back into a plain `http::Request`.
    pub fn into_request(self) -> Request<BufferedBody<ReqBody>> {
        Request::from_parts(self.parts, self.body)
    }

    /// Borrows the request's metadata (method, URI, headers, ...).
    pub fn parts(&self) -> &Parts {
        &self.parts
    }

    /// Splits into metadata and body.
    pub fn into_parts(self) -> (Parts, BufferedBody<ReqBody>) {
        (self.parts, self.body)
    }

    /// Derives the [`MethodId`] this request is cached under: `"{METHOD} {path}"`.
    pub fn method_id(&self) -> MethodId {
        MethodId::from_parts(self.parts.method.as_str(), self.parts.uri.path())
    }

    /// Canonical key arguments: the query string and the value of each header named
    /// in a `Vary` response header seen on a prior response for this route, in the
    /// order requested by the caller.
    pub fn canonical_args(&self, vary_headers: &[&str]) -> Vec<CanonicalArg> {
        let mut args: Vec<CanonicalArg> = vec![
            self.parts
                .uri
                .query()
                .map(|query| smol_str::SmolStr::new(query)),
        ];
        for header in vary_headers {
            let value = self
                .parts
                .headers
                .get(*header)
                .and_then(|value| value.to_str().ok())
                .map(smol_str::SmolStr::new);
            args.push(value);
        }
        args
    }
}

impl<ReqBody> CacheableSubject for CacheableHttpRequest<ReqBody>
where
    ReqBody: HttpBody,
{
    type Body = ReqBody;
    type Parts = Parts;

    fn into_parts(self) -> (Self::Parts, BufferedBody<Self::Body>) {
        (self.parts, self.body)
    }

    fn from_parts(parts: Self::Parts, body: BufferedBody<Self::Body>) -> Self {
        Self { parts, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn request(uri: &str) -> CacheableHttpRequest<Full<bytes::Bytes>> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(BufferedBody::Complete(None))
            .unwrap();
        CacheableHttpRequest::from_request(request)
    }

    #[test]
    fn method_id_combines_method_and_path() {
        let request = request("https://example.com/orders/42");
        assert_eq!(request.method_id().as_str(), "GET /orders/42");
    }

    #[test]
    fn canonical_args_carries_query_then_vary_headers() {
        let mut builder = Request::builder().method("GET").uri("https://example.com/orders?page=2");
        builder
            .headers_mut()
            .unwrap()
            .insert("accept-language", "en-US".parse().unwrap());
        let request =
            CacheableHttpRequest::from_request(builder.body(BufferedBody::Complete(None)).unwrap());

        let args = request.canonical_args(&["accept-language"]);
        assert_eq!(args[0].as_deref(), Some("page=2"));
        assert_eq!(args[1].as_deref(), Some("en-US"));
    }
}
