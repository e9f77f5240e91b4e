//! Cache key derivation from a method id and its arguments (module B).
//!
//! `CacheKey`'s shape (prefix/version/parts) lives in `cachekit-core`; this module is
//! the operation that turns a method call into one. The actual attribute/codegen layer
//! that extracts `CacheKeyPart` from live arguments is out of scope for a library crate
//! (§1 Non-goals) — callers hand in already-canonicalized argument strings.

use cachekit_core::{CacheKey, KeyPart, MethodId};
use smol_str::SmolStr;
use std::hash::{Hash, Hasher};

use crate::error::KeyGenError;

/// Implemented by argument types with a stable, verbatim cache-key representation.
///
/// Types that don't implement this must still provide *some* canonical encoding
/// (e.g. a JSON or Debug rendering) before calling [`KeyGenerator::generate`];
/// arguments with no canonical encoding at all surface as [`KeyGenError::UnhashableArgument`].
pub trait CacheKeyPart {
    /// Returns this value's verbatim cache-key contribution.
    fn cache_key_part(&self) -> SmolStr;
}

impl CacheKeyPart for SmolStr {
    fn cache_key_part(&self) -> SmolStr {
        self.clone()
    }
}

impl CacheKeyPart for String {
    fn cache_key_part(&self) -> SmolStr {
        SmolStr::new(self)
    }
}

impl CacheKeyPart for &str {
    fn cache_key_part(&self) -> SmolStr {
        SmolStr::new(*self)
    }
}

/// One positional argument's canonical encoding, or `None` if it has none.
pub type CanonicalArg = Option<SmolStr>;

/// Selects how [`KeyGenerator`] combines canonical argument encodings into one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// Hashes the concatenated canonical encoding and hex-encodes the digest.
    ///
    /// Smallest, opaque keys. The teacher's equivalent base64-encodes; this crate
    /// hex-encodes instead since no base64 crate is in the dependency stack and hex
    /// meets the same goal (short, URL-safe, deterministic).
    #[default]
    FastHash,
    /// Renders the argument list as a JSON array. Human-readable, good for debugging.
    Json,
    /// Renders the argument list with the compact binary `Serializer` (bincode).
    ///
    /// Named for parity with the spec's "MessagePack" strategy slot; substituted with
    /// bincode since msgpack is not part of this workspace's dependency stack.
    Compact,
}

/// Derives a [`CacheKey`] from a method id, its canonicalized arguments, and an
/// optional policy version.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator {
    strategy: KeyStrategy,
}

impl KeyGenerator {
    /// Builds a generator using the given strategy.
    pub fn new(strategy: KeyStrategy) -> Self {
        Self { strategy }
    }

    /// Derives a cache key.
    ///
    /// `version`, when present, is embedded so that distinct versions of the same
    /// method/argument combination produce disjoint keys.
    pub fn generate(
        &self,
        method: &MethodId,
        args: &[CanonicalArg],
        version: Option<u32>,
    ) -> Result<CacheKey, KeyGenError> {
        let canonical: Vec<SmolStr> = args
            .iter()
            .enumerate()
            .map(|(position, arg)| arg.clone().ok_or(KeyGenError::UnhashableArgument { position }))
            .collect::<Result<_, _>>()?;

        let combined = match self.strategy {
            KeyStrategy::FastHash => self.fast_hash(&canonical),
            KeyStrategy::Json => {
                serde_json::to_string(&canonical).expect("Vec<SmolStr> always serializes")
            }
            KeyStrategy::Compact => {
                let bytes = bincode::serde::encode_to_vec(&canonical, bincode::config::standard())
                    .expect("Vec<SmolStr> always encodes");
                hex_encode(&bytes)
            }
        };

        let part = KeyPart::new("args", Some(combined));
        Ok(CacheKey::new(method.as_str(), version.unwrap_or(0), vec![part]))
    }

    fn fast_hash(&self, canonical: &[SmolStr]) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for part in canonical {
            part.hash(&mut hasher);
            0u8.hash(&mut hasher); // separator, avoids "ab","c" colliding with "a","bc"
        }
        hex_encode(&hasher.finish().to_be_bytes())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to String cannot fail");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_args_same_strategy_same_key() {
        let method = MethodId::from_parts("UserService", "GetUser");
        let args = vec![Some(SmolStr::new("42"))];
        let gen = KeyGenerator::new(KeyStrategy::FastHash);
        let a = gen.generate(&method, &args, None).unwrap();
        let b = gen.generate(&method, &args, None).unwrap();
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn version_changes_the_key() {
        let method = MethodId::from_parts("UserService", "GetUser");
        let args = vec![Some(SmolStr::new("42"))];
        let gen = KeyGenerator::new(KeyStrategy::FastHash);
        let v1 = gen.generate(&method, &args, Some(1)).unwrap();
        let v2 = gen.generate(&method, &args, Some(2)).unwrap();
        assert_ne!(v1.to_string(), v2.to_string());
    }

    #[test]
    fn unhashable_argument_is_rejected() {
        let method = MethodId::from_parts("UserService", "GetUser");
        let args = vec![None];
        let gen = KeyGenerator::default();
        let err = gen.generate(&method, &args, None).unwrap_err();
        matches!(err, KeyGenError::UnhashableArgument { position: 0 });
    }
}
