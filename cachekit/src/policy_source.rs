//! Where per-method policy values come from (module J).
//!
//! A [`PolicySource`] supplies a [`CachePolicy`] for a [`MethodId`](cachekit_core::MethodId),
//! self-provenanced via [`CachePolicy::with_contribution`]. Multiple sources are layered by a
//! [`crate::policy_registry::PolicyRegistry`] in priority order and merged field-by-field with
//! [`cachekit_core::policy::merge_per_field`].

use async_trait::async_trait;
use cachekit_core::MethodId;
use cachekit_core::policy::{
    CachePolicy, CachePolicyFields, ChangeReason, PolicyChange, PolicyContribution, PolicyDelta, PolicyKind,
    PolicySnapshot,
};
use futures::stream::BoxStream;
use smol_str::SmolStr;

/// A single place policy data can come from: code defaults, a config file, a remote
/// control plane, and so on.
#[async_trait]
pub trait PolicySource: Send + Sync + std::fmt::Debug {
    /// Human-readable name used in provenance trails, e.g. `"static"` or `"file:prod.toml"`.
    fn name(&self) -> &str;

    /// This source's policy value for `method`, if it has an opinion. The returned
    /// policy should already carry its own contribution in `provenance`.
    async fn resolve(&self, method: &MethodId) -> Option<CachePolicy>;

    /// Every method/policy pair this source currently holds an opinion on. Used by
    /// [`crate::policy_registry::PolicyRegistry::get_all_policies`] and
    /// [`crate::policy_registry::PolicyRegistry::find_by_source`] to enumerate
    /// configuration without requiring the caller to already know every `MethodId`.
    ///
    /// Sources that can't cheaply enumerate their contents (e.g. a source that only
    /// answers point lookups) may leave this at the default empty snapshot.
    async fn snapshot(&self) -> Vec<PolicySnapshot> {
        Vec::new()
    }

    /// A live stream of this source's changes, for sources that can detect them (file
    /// watches, runtime overrides, a control-plane push feed). The default never
    /// produces an item: most sources are static for their lifetime.
    fn watch(&self) -> BoxStream<'static, PolicyChange> {
        Box::pin(futures::stream::empty())
    }
}

/// A source backed by an in-memory map, populated at startup.
///
/// Grounded on the teacher's `EntityPolicyConfig` being a static, code-provided default;
/// this generalizes it to hold one policy per method rather than a single global one.
#[derive(Debug, Default)]
pub struct StaticPolicySource {
    name: String,
    entries: std::collections::HashMap<MethodId, CachePolicy>,
}

impl StaticPolicySource {
    /// Builds an empty source identified by `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: std::collections::HashMap::new(),
        }
    }

    /// Registers (or replaces) the policy for `method`.
    ///
    /// `policy` is stamped with a contribution naming this source before being stored,
    /// so `provenance` always reflects where the value came from.
    pub fn insert(&mut self, method: MethodId, policy: CachePolicy) -> &mut Self {
        use cachekit_core::policy::PolicyContribution;
        use cachekit_core::policy::PolicyKind;
        use smol_str::SmolStr;

        let fields = policy.fields_set();
        let policy = policy.with_contribution(PolicyContribution {
            source_id: SmolStr::new(&self.name),
            fields_set: fields,
            kind: PolicyKind::Set,
            timestamp: chrono::Utc::now(),
            metadata: None,
            notes: None,
        });
        self.entries.insert(method, policy);
        self
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, method: &MethodId) -> Option<CachePolicy> {
        self.entries.get(method).cloned()
    }

    async fn snapshot(&self) -> Vec<PolicySnapshot> {
        let now = chrono::Utc::now();
        self.entries
            .iter()
            .map(|(method_id, policy)| PolicySnapshot {
                source_id: SmolStr::new(&self.name),
                method_id: method_id.clone(),
                policy: policy.clone(),
                timestamp: now,
                metadata: None,
            })
            .collect()
    }
}

/// Runtime-settable policy overrides, at the highest priority in the stack (a control
/// endpoint or admin tool calling [`Self::apply_overrides`] should win over every file
/// or code default). Backed by a concurrent map so reads from [`PolicyRegistry::resolve`]
/// never block on a writer, and a broadcast channel so [`Self::watch`] subscribers see
/// every change as it happens.
///
/// [`PolicyRegistry::resolve`]: crate::policy_registry::PolicyRegistry::resolve
#[derive(Debug)]
pub struct RuntimeOverrides {
    name: SmolStr,
    entries: dashmap::DashMap<MethodId, CachePolicy>,
    changes: tokio::sync::broadcast::Sender<PolicyChange>,
}

impl RuntimeOverrides {
    /// The priority this source is documented to run at: above every file or
    /// code-default source, so an operator override always takes effect immediately.
    pub const PRIORITY: u16 = 100;

    /// Builds an empty override set.
    pub fn new() -> Self {
        let (changes, _receiver) = tokio::sync::broadcast::channel(256);
        Self {
            name: SmolStr::new("RuntimeOverrides"),
            entries: dashmap::DashMap::new(),
            changes,
        }
    }

    /// Sets (or replaces) the override for `method`, emitting a [`PolicyChange`] to
    /// every active [`Self::watch`] subscriber.
    pub fn apply_overrides(&self, method: MethodId, policy: CachePolicy) {
        let fields = policy.fields_set();
        let contributed = policy.with_contribution(PolicyContribution {
            source_id: self.name.clone(),
            fields_set: fields,
            kind: PolicyKind::Set,
            timestamp: chrono::Utc::now(),
            metadata: None,
            notes: None,
        });
        let reason = if self.entries.contains_key(&method) {
            ChangeReason::Updated
        } else {
            ChangeReason::Added
        };
        self.entries.insert(method.clone(), contributed.clone());
        let _ = self.changes.send(PolicyChange {
            source_id: self.name.clone(),
            method_id: method,
            delta: PolicyDelta {
                set_fields: fields,
                cleared_fields: CachePolicyFields::empty(),
                policy: contributed,
            },
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Clears the override for `method`, if one is set, emitting a
    /// [`ChangeReason::Removed`] change.
    pub fn remove_override(&self, method: &MethodId) {
        let Some((_, removed)) = self.entries.remove(method) else {
            return;
        };
        let _ = self.changes.send(PolicyChange {
            source_id: self.name.clone(),
            method_id: method.clone(),
            delta: PolicyDelta {
                set_fields: CachePolicyFields::empty(),
                cleared_fields: removed.fields_set(),
                policy: CachePolicy::default(),
            },
            reason: ChangeReason::Removed,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Clears every override.
    pub fn clear_overrides(&self) {
        let methods: Vec<MethodId> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        for method in methods {
            self.remove_override(&method);
        }
    }

    /// The overrides currently in effect, as snapshots.
    pub fn get_effective_policies(&self) -> Vec<PolicySnapshot> {
        let now = chrono::Utc::now();
        self.entries
            .iter()
            .map(|entry| PolicySnapshot {
                source_id: self.name.clone(),
                method_id: entry.key().clone(),
                policy: entry.value().clone(),
                timestamp: now,
                metadata: None,
            })
            .collect()
    }
}

impl Default for RuntimeOverrides {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicySource for RuntimeOverrides {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, method: &MethodId) -> Option<CachePolicy> {
        self.entries.get(method).map(|entry| entry.value().clone())
    }

    async fn snapshot(&self) -> Vec<PolicySnapshot> {
        self.get_effective_policies()
    }

    fn watch(&self) -> BoxStream<'static, PolicyChange> {
        let receiver = self.changes.subscribe();
        Box::pin(futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(change) => return Some((change, receiver)),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn static_source_returns_registered_policy_with_provenance() {
        let mut source = StaticPolicySource::new("static");
        let method = MethodId::new("Orders.Get");
        source.insert(
            method.clone(),
            CachePolicy {
                duration: Some(Duration::from_secs(30)),
                ..Default::default()
            },
        );

        let resolved = source.resolve(&method).await.expect("policy registered");
        assert_eq!(resolved.duration, Some(Duration::from_secs(30)));
        assert_eq!(resolved.provenance.len(), 1);
        assert_eq!(resolved.provenance[0].source_id, "static");
        assert!(source.resolve(&MethodId::new("Orders.List")).await.is_none());
    }

    #[tokio::test]
    async fn static_source_snapshot_lists_every_entry() {
        let mut source = StaticPolicySource::new("static");
        source.insert(MethodId::new("Orders.Get"), CachePolicy::default());
        source.insert(MethodId::new("Orders.List"), CachePolicy::default());

        let snapshot = source.snapshot().await;
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn runtime_overrides_resolve_and_emit_changes() {
        use futures::StreamExt;

        let overrides = RuntimeOverrides::new();
        let method = MethodId::new("Orders.Get");
        let mut changes = overrides.watch();

        overrides.apply_overrides(
            method.clone(),
            CachePolicy {
                duration: Some(Duration::from_secs(10)),
                ..Default::default()
            },
        );

        let resolved = overrides.resolve(&method).await.expect("override applied");
        assert_eq!(resolved.duration, Some(Duration::from_secs(10)));

        let change = changes.next().await.expect("change emitted");
        assert_eq!(change.reason, ChangeReason::Added);
        assert_eq!(change.method_id, method);

        overrides.remove_override(&method);
        assert!(overrides.resolve(&method).await.is_none());
        let removal = changes.next().await.expect("removal emitted");
        assert_eq!(removal.reason, ChangeReason::Removed);
    }

    #[tokio::test]
    async fn runtime_overrides_clear_removes_every_entry() {
        let overrides = RuntimeOverrides::new();
        overrides.apply_overrides(MethodId::new("A"), CachePolicy::default());
        overrides.apply_overrides(MethodId::new("B"), CachePolicy::default());
        assert_eq!(overrides.get_effective_policies().len(), 2);

        overrides.clear_overrides();
        assert!(overrides.get_effective_policies().is_empty());
    }
}
