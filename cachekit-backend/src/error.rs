//! Error types for backend and storage operations.

use thiserror::Error;

/// Error type for serialization and deserialization.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Serialization failed.
    #[error("serialize error: {0}")]
    Serialize(Box<dyn std::error::Error + Send + Sync>),
    /// Deserialization failed.
    #[error("deserialize error: {0}")]
    Deserialize(Box<dyn std::error::Error + Send + Sync>),
}

/// Error type for compression and decompression.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// Compression failed.
    #[error("compress error: {0}")]
    Compress(Box<dyn std::error::Error + Send + Sync>),
    /// Decompression failed.
    #[error("decompress error: {0}")]
    Decompress(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by a [`crate::keygen::KeyGenerator`].
#[derive(Debug, Error)]
pub enum KeyGenError {
    /// An argument could not be given a canonical encoding and does not implement
    /// `CacheKeyPart`.
    #[error("argument at position {position} has no canonical encoding for key generation")]
    UnhashableArgument {
        /// Zero-based position of the offending argument.
        position: usize,
    },
}

/// Error type shared by [`crate::storage::StorageProvider`] (L2) implementations.
///
/// The in-process `MemoryStore` (L1) never fails by contract (§4.D); only L2
/// providers, which cross a process or network boundary, surface this type.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Internal state or computation error, unrelated to network interaction.
    #[error("internal backend error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// Network interaction with a remote L2 provider failed.
    #[error("connection error: {0}")]
    Connection(Box<dyn std::error::Error + Send + Sync>),
    /// Serialization or deserialization error.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// Compression or decompression error.
    #[error(transparent)]
    Compression(#[from] CompressionError),
    /// The provider reported itself unhealthy; callers should treat this the same
    /// as a miss/failed write per §4.F's failure policy.
    #[error("storage provider unhealthy: {0}")]
    Unhealthy(String),
}
