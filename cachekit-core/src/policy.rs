//! Cache policy data model: immutable policies, per-field provenance, and merging.
//!
//! A [`CachePolicy`] is never mutated in place; "updating" it means building a new
//! value, typically via [`merge_per_field`]. Every contribution that touched a policy
//! is recorded in [`CachePolicy::provenance`] so the effective value of any field can
//! be traced back to the source and moment that set it.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::method::MethodId;

bitflags! {
    /// Which fields of a [`CachePolicy`] a given contribution actually touched.
    ///
    /// A source that only sets `Duration` must never be treated as clobbering another
    /// source's `Tags`; merges consult this bitset field-by-field rather than replacing
    /// the whole record.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct CachePolicyFields: u8 {
        /// `CachePolicy::duration`.
        const DURATION = 1 << 0;
        /// `CachePolicy::tags`.
        const TAGS = 1 << 1;
        /// `CachePolicy::key_generator_kind`.
        const KEY_GENERATOR = 1 << 2;
        /// `CachePolicy::version`.
        const VERSION = 1 << 3;
        /// `CachePolicy::require_idempotent`.
        const REQUIRE_IDEMPOTENT = 1 << 4;
        /// `CachePolicy::metadata`.
        const METADATA = 1 << 5;
    }
}

/// Whether a [`PolicyContribution`] sets or clears the fields it names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    /// The contribution assigns new values to the named fields.
    Set,
    /// The contribution clears the named fields back to unset.
    Clear,
}

/// Audit record of one source setting (or clearing) some fields of a policy.
///
/// `Provenance` on a [`CachePolicy`] is an append-only sequence of these; merging two
/// policies concatenates their provenance rather than discarding either side's.
#[derive(Clone, Debug)]
pub struct PolicyContribution {
    /// Stable identifier of the contributing source (e.g. `"Attribute"`, `"RuntimeOverrides"`).
    pub source_id: SmolStr,
    /// Fields this contribution touched.
    pub fields_set: CachePolicyFields,
    /// Whether the fields were set or cleared.
    pub kind: PolicyKind,
    /// When the contribution was produced.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata attached to the contribution (e.g. config file path).
    pub metadata: Option<BTreeMap<SmolStr, SmolStr>>,
    /// Free-form diagnostic notes.
    pub notes: Option<SmolStr>,
}

/// An immutable cache policy.
///
/// "Modification" is always structural replacement: build a new `CachePolicy` (usually
/// through [`merge_per_field`]) rather than mutating this one.
#[derive(Clone, Debug, Default)]
pub struct CachePolicy {
    /// Logical TTL for the cached artifact.
    pub duration: Option<Duration>,
    /// Invalidation labels. Order is irrelevant for set semantics but preserved for
    /// diagnostics.
    pub tags: Vec<SmolStr>,
    /// Selects the key-derivation strategy.
    pub key_generator_kind: Option<SmolStr>,
    /// Embedded in keys; bumping invalidates the whole method.
    pub version: Option<u32>,
    /// Refuses to cache non-idempotent callers when `Some(true)`.
    pub require_idempotent: Option<bool>,
    /// Extension slots (e.g. group name, HTTP-ETag hints).
    pub metadata: Option<BTreeMap<SmolStr, SmolStr>>,
    /// Audit chain of which source set which fields, in application order.
    pub provenance: Vec<PolicyContribution>,
}

impl CachePolicy {
    /// Returns the bitset of fields this policy currently has a value for.
    pub fn fields_set(&self) -> CachePolicyFields {
        let mut fields = CachePolicyFields::empty();
        if self.duration.is_some() {
            fields |= CachePolicyFields::DURATION;
        }
        if !self.tags.is_empty() {
            fields |= CachePolicyFields::TAGS;
        }
        if self.key_generator_kind.is_some() {
            fields |= CachePolicyFields::KEY_GENERATOR;
        }
        if self.version.is_some() {
            fields |= CachePolicyFields::VERSION;
        }
        if self.require_idempotent.is_some() {
            fields |= CachePolicyFields::REQUIRE_IDEMPOTENT;
        }
        if self.metadata.is_some() {
            fields |= CachePolicyFields::METADATA;
        }
        fields
    }

    /// Returns a copy of this policy with one [`PolicyContribution`] appended to
    /// `provenance`. Used by a `PolicySource` when it produces a snapshot so the
    /// snapshot's own policy carries a record of itself.
    pub fn with_contribution(mut self, contribution: PolicyContribution) -> Self {
        self.provenance.push(contribution);
        self
    }
}

/// Merge two policies field-by-field: every field named in `fields_of_high` is taken
/// from `high`, everything else is inherited from `low`.
///
/// `Provenance` is the concatenation of `low`'s then `high`'s contributions, so callers
/// folding a list of sources low-to-high priority end up with provenance in priority
/// order (see `PolicyRegistry`'s resolver).
pub fn merge_per_field(high: &CachePolicy, low: &CachePolicy, fields_of_high: CachePolicyFields) -> CachePolicy {
    let metadata = if fields_of_high.contains(CachePolicyFields::METADATA) {
        high.metadata.clone()
    } else {
        low.metadata.clone()
    };

    let mut provenance = low.provenance.clone();
    provenance.extend(high.provenance.iter().cloned());

    CachePolicy {
        duration: if fields_of_high.contains(CachePolicyFields::DURATION) {
            high.duration
        } else {
            low.duration
        },
        tags: if fields_of_high.contains(CachePolicyFields::TAGS) {
            high.tags.clone()
        } else {
            low.tags.clone()
        },
        key_generator_kind: if fields_of_high.contains(CachePolicyFields::KEY_GENERATOR) {
            high.key_generator_kind.clone()
        } else {
            low.key_generator_kind.clone()
        },
        version: if fields_of_high.contains(CachePolicyFields::VERSION) {
            high.version
        } else {
            low.version
        },
        require_idempotent: if fields_of_high.contains(CachePolicyFields::REQUIRE_IDEMPOTENT) {
            high.require_idempotent
        } else {
            low.require_idempotent
        },
        metadata,
        provenance,
    }
}

/// One source's view of one method's policy at a moment in time.
#[derive(Clone, Debug)]
pub struct PolicySnapshot {
    /// Stable identifier of the source that produced this snapshot.
    pub source_id: SmolStr,
    /// The method this snapshot applies to.
    pub method_id: MethodId,
    /// The policy value.
    pub policy: CachePolicy,
    /// When the snapshot was produced.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata about the snapshot itself (distinct from policy metadata).
    pub metadata: Option<BTreeMap<SmolStr, SmolStr>>,
}

/// Why a [`PolicyChange`] was emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeReason {
    /// A method was newly configured by this source.
    Added,
    /// An existing configuration was modified.
    Updated,
    /// The source no longer configures this method.
    Removed,
}

/// The delta carried by a [`PolicyChange`].
#[derive(Clone, Debug)]
pub struct PolicyDelta {
    /// Fields this change sets.
    pub set_fields: CachePolicyFields,
    /// Fields this change clears.
    pub cleared_fields: CachePolicyFields,
    /// The resulting policy value from this source alone.
    pub policy: CachePolicy,
}

/// A single source's policy change event, as produced by a `PolicySource`'s watch stream.
#[derive(Clone, Debug)]
pub struct PolicyChange {
    /// Stable identifier of the source emitting the change.
    pub source_id: SmolStr,
    /// The method affected.
    pub method_id: MethodId,
    /// What changed.
    pub delta: PolicyDelta,
    /// Why it changed.
    pub reason: ChangeReason,
    /// When the change occurred.
    pub timestamp: DateTime<Utc>,
}

/// The result of merging all live [`PolicySnapshot`]s for a method id by priority.
#[derive(Clone, Debug)]
pub struct EffectivePolicy {
    /// The method this policy applies to.
    pub method_id: MethodId,
    /// The merged policy.
    pub policy: CachePolicy,
    /// When this value was resolved.
    pub resolved_at: DateTime<Utc>,
}

/// TTL configuration for a cached entity, pairing expiry with an optional stale window
/// for stale-while-revalidate style refresh.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntityPolicyConfig {
    /// Time until the entry expires and becomes invalid.
    pub ttl: Option<Duration>,
    /// Time until the entry becomes stale (should refresh in background).
    pub stale_ttl: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(source: &str, fields: CachePolicyFields) -> PolicyContribution {
        PolicyContribution {
            source_id: SmolStr::new(source),
            fields_set: fields,
            kind: PolicyKind::Set,
            timestamp: Utc::now(),
            metadata: None,
            notes: None,
        }
    }

    #[test]
    fn merge_per_field_only_overrides_named_fields() {
        let low = CachePolicy {
            duration: Some(Duration::from_secs(900)),
            tags: vec![SmolStr::new("low-tag")],
            ..Default::default()
        }
        .with_contribution(contribution("low", CachePolicyFields::DURATION | CachePolicyFields::TAGS));

        let high = CachePolicy {
            duration: Some(Duration::from_secs(5)),
            ..Default::default()
        }
        .with_contribution(contribution("high", CachePolicyFields::DURATION));

        let merged = merge_per_field(&high, &low, CachePolicyFields::DURATION);

        assert_eq!(merged.duration, Some(Duration::from_secs(5)));
        assert_eq!(merged.tags, vec![SmolStr::new("low-tag")]);
        assert_eq!(merged.provenance.len(), 2);
        assert_eq!(merged.provenance[0].source_id, "low");
        assert_eq!(merged.provenance[1].source_id, "high");
    }

    #[test]
    fn fields_set_reflects_populated_fields() {
        let policy = CachePolicy {
            duration: Some(Duration::from_secs(1)),
            version: Some(2),
            ..Default::default()
        };
        let fields = policy.fields_set();
        assert!(fields.contains(CachePolicyFields::DURATION));
        assert!(fields.contains(CachePolicyFields::VERSION));
        assert!(!fields.contains(CachePolicyFields::TAGS));
    }
}
