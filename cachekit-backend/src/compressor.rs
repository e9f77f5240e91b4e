//! Optional value compression, applied after serialization and before storage.

use bytes::Bytes;

use crate::error::CompressionError;

/// Compresses and decompresses serialized values.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Compresses bytes.
    fn compress(&self, data: &[u8]) -> Result<Bytes, CompressionError>;
    /// Decompresses bytes produced by [`compress`](Self::compress).
    fn decompress(&self, data: &[u8]) -> Result<Bytes, CompressionError>;
}

/// No-op compressor; the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompressor;

impl Compressor for PassthroughCompressor {
    fn compress(&self, data: &[u8]) -> Result<Bytes, CompressionError> {
        Ok(Bytes::copy_from_slice(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Bytes, CompressionError> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// Zstandard compression, for backends storing large values over a network L2.
#[cfg(feature = "zstd")]
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

#[cfg(feature = "zstd")]
impl Default for ZstdCompressor {
    fn default() -> Self {
        Self { level: 3 }
    }
}

#[cfg(feature = "zstd")]
impl ZstdCompressor {
    /// Builds a compressor at the given zstd level (1-22).
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

#[cfg(feature = "zstd")]
impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8]) -> Result<Bytes, CompressionError> {
        zstd::bulk::compress(data, self.level)
            .map(Bytes::from)
            .map_err(|e| CompressionError::Compress(Box::new(e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Bytes, CompressionError> {
        zstd::bulk::decompress(data, 64 * 1024 * 1024)
            .map(Bytes::from)
            .map_err(|e| CompressionError::Decompress(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_is_identity() {
        let data = b"hello world";
        let compressed = PassthroughCompressor.compress(data).unwrap();
        let decompressed = PassthroughCompressor.decompress(&compressed).unwrap();
        assert_eq!(&decompressed[..], data);
    }
}
