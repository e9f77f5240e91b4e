#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod key;
pub mod method;
pub mod policy;
pub mod value;

pub use key::{CacheKey, KeyPart, KeyParts};
pub use method::MethodId;
pub use policy::{
    CachePolicy, CachePolicyFields, ChangeReason, EffectivePolicy, EntityPolicyConfig,
    PolicyChange, PolicyContribution, PolicyDelta, PolicyKind, PolicySnapshot, merge_per_field,
};
pub use value::{CacheMeta, CacheState, CacheValue};

#[doc(hidden)]
pub use smol_str::SmolStr;

/// Raw byte data type used for serialized cache values.
/// Using `Bytes` provides efficient zero-copy cloning via reference counting.
pub type Raw = bytes::Bytes;
