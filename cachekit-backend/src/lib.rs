#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod compressor;
pub mod error;
pub mod hybrid;
pub mod keygen;
pub mod serializer;
pub mod storage;
pub mod tag_index;

pub use compressor::{Compressor, PassthroughCompressor};
pub use error::{BackendError, CompressionError, FormatError, KeyGenError};
pub use hybrid::{HybridStorage, HybridStorageConfig, InvalidationPublisher, L1Store, Strategy};
pub use keygen::{CacheKeyPart, CanonicalArg, KeyGenerator, KeyStrategy};
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer};
pub use storage::{InMemoryStorageProvider, StorageProvider, StorageResult, StorageStats};
pub use tag_index::TagIndex;
