use hyper::body::Body as HttpBody;

use crate::BufferedBody;

/// Lets request and response wrappers be decomposed into metadata plus body and
/// reconstructed, uniformly.
///
/// This abstracts over the common pattern of taking a message apart to inspect or
/// buffer its body, then putting it back together for forwarding upstream.
///
/// # For Implementors
///
/// Implementations must ensure round-trip consistency: calling `from_parts` with
/// the result of `into_parts` must produce an equivalent subject.
///
/// ```
/// use cachekit_http::CacheableSubject;
///
/// fn round_trip<S: CacheableSubject>(subject: S) -> S {
///     let (parts, body) = subject.into_parts();
///     S::from_parts(parts, body)
///     // reconstructed should be equivalent to subject
/// }
/// ```
///
/// # Caveats
///
/// After `into_parts`, the body may be in a different state than before: once
/// something has read from it, the body transitions from `Passthrough` to `Partial`
/// or `Complete`. Callers must handle all [`BufferedBody`] states.
pub trait CacheableSubject {
    /// The HTTP body type.
    type Body: HttpBody;

    /// The metadata type (e.g., [`http::request::Parts`] or [`http::response::Parts`]).
    type Parts;

    /// Decomposes this subject into metadata and body.
    ///
    /// After this call, the body may be in any [`BufferedBody`] state depending
    /// on prior operations.
    fn into_parts(self) -> (Self::Parts, BufferedBody<Self::Body>);

    /// Reconstructs a subject from metadata and body.
    ///
    /// This is the inverse of [`into_parts`](Self::into_parts).
    fn from_parts(parts: Self::Parts, body: BufferedBody<Self::Body>) -> Self;
}
