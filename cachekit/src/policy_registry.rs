//! Resolves the effective policy for a method from a stack of [`PolicySource`]s (module K).
//!
//! Sources are registered lowest-priority first; resolution folds them left to right with
//! [`merge_per_field`], so a later source's fields win wherever it has an opinion and
//! everything else falls back to the earlier sources. The result's `provenance` therefore
//! reads in priority order: defaults first, overrides last.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use cachekit_core::MethodId;
use cachekit_core::policy::{CachePolicy, EffectivePolicy, PolicyContribution, PolicySnapshot, merge_per_field};
use chrono::Utc;

use crate::policy_source::PolicySource;

/// Stacks [`PolicySource`]s and resolves a method's effective [`CachePolicy`].
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    sources: Vec<Arc<dyn PolicySource>>,
}

impl std::fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl PolicyRegistry {
    /// Builds a registry with no sources. A method with no sources registered resolves
    /// to [`CachePolicy::default`], i.e. caching is disabled until a source opts it in.
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    /// Registers `source` as the new highest-priority source.
    pub fn push(&mut self, source: Arc<dyn PolicySource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    /// Resolves `method`'s effective policy by folding every source's contribution,
    /// lowest priority first.
    pub async fn resolve(&self, method: &MethodId) -> EffectivePolicy {
        let mut current = CachePolicy::default();

        for source in &self.sources {
            if let Some(contribution) = source.resolve(method).await {
                let fields = contribution.fields_set();
                current = merge_per_field(&contribution, &current, fields);
            }
        }

        EffectivePolicy {
            method_id: method.clone(),
            policy: current,
            resolved_at: Utc::now(),
        }
    }

    /// Alias for [`Self::resolve`], named to match the diagnostic surface: "give me the
    /// policy that would actually apply" reads more clearly than "resolve" to an
    /// operator inspecting configuration rather than an invocation in flight.
    pub async fn get_policy(&self, method: &MethodId) -> EffectivePolicy {
        self.resolve(method).await
    }

    /// Resolves every method any source has an opinion on, by unioning each source's
    /// [`PolicySource::snapshot`] and resolving each distinct method id once. Methods
    /// only ever reached by exact point-lookup (a source that can't enumerate and whose
    /// method isn't also held by another source) won't appear here.
    pub async fn get_all_policies(&self) -> Vec<EffectivePolicy> {
        let mut methods = BTreeSet::new();
        for source in &self.sources {
            for snapshot in source.snapshot().await {
                methods.insert(snapshot.method_id);
            }
        }

        let mut resolved = Vec::with_capacity(methods.len());
        for method in methods {
            resolved.push(self.resolve(&method).await);
        }
        resolved
    }

    /// The contributions a single `source_id` made to `method`'s resolved policy, in
    /// application order. Empty if that source never touched this method.
    pub async fn get_contributions(&self, method: &MethodId, source_id: &str) -> Vec<PolicyContribution> {
        self.resolve(method)
            .await
            .policy
            .provenance
            .into_iter()
            .filter(|contribution| contribution.source_id == source_id)
            .collect()
    }

    /// Every policy `source_id` currently holds an opinion on, straight from that
    /// source's own [`PolicySource::snapshot`] (not merged with any other source).
    /// Returns an empty list if no registered source matches `source_id`.
    pub async fn find_by_source(&self, source_id: &str) -> Vec<PolicySnapshot> {
        for source in &self.sources {
            if source.name() == source_id {
                return source.snapshot().await;
            }
        }
        Vec::new()
    }
}

/// Convenience accessor pairing an [`EffectivePolicy`] with the TTL/stale-window split
/// the invocation core actually needs.
pub fn entity_config(policy: &EffectivePolicy) -> cachekit_core::policy::EntityPolicyConfig {
    cachekit_core::policy::EntityPolicyConfig {
        ttl: policy.policy.duration,
        stale_ttl: policy
            .policy
            .metadata
            .as_ref()
            .and_then(|m| m.get("stale_ttl_secs"))
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy_source::StaticPolicySource;

    #[tokio::test]
    async fn higher_priority_source_wins_named_fields_only() {
        let mut defaults = StaticPolicySource::new("defaults");
        let method = MethodId::new("Orders.Get");
        defaults.insert(
            method.clone(),
            CachePolicy {
                duration: Some(Duration::from_secs(900)),
                tags: vec!["orders".into()],
                ..Default::default()
            },
        );

        let mut overrides = StaticPolicySource::new("overrides");
        overrides.insert(
            method.clone(),
            CachePolicy {
                duration: Some(Duration::from_secs(30)),
                ..Default::default()
            },
        );

        let mut registry = PolicyRegistry::new();
        registry.push(Arc::new(defaults));
        registry.push(Arc::new(overrides));

        let effective = registry.resolve(&method).await;
        assert_eq!(effective.policy.duration, Some(Duration::from_secs(30)));
        assert_eq!(effective.policy.tags, vec!["orders".to_string()]);
        assert_eq!(effective.policy.provenance.len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_method_resolves_to_default() {
        let registry = PolicyRegistry::new();
        let effective = registry.resolve(&MethodId::new("Unknown.Method")).await;
        assert!(effective.policy.duration.is_none());
    }

    fn two_source_registry() -> (PolicyRegistry, MethodId) {
        let method = MethodId::new("Orders.Get");
        let mut defaults = StaticPolicySource::new("defaults");
        defaults.insert(
            method.clone(),
            CachePolicy {
                duration: Some(Duration::from_secs(900)),
                ..Default::default()
            },
        );
        let mut overrides = StaticPolicySource::new("overrides");
        overrides.insert(
            method.clone(),
            CachePolicy {
                duration: Some(Duration::from_secs(30)),
                ..Default::default()
            },
        );

        let mut registry = PolicyRegistry::new();
        registry.push(Arc::new(defaults));
        registry.push(Arc::new(overrides));
        (registry, method)
    }

    #[tokio::test]
    async fn get_policy_is_an_alias_for_resolve() {
        let (registry, method) = two_source_registry();
        let via_get = registry.get_policy(&method).await;
        let via_resolve = registry.resolve(&method).await;
        assert_eq!(via_get.policy.duration, via_resolve.policy.duration);
    }

    #[tokio::test]
    async fn get_all_policies_covers_every_known_method() {
        let (registry, method) = two_source_registry();
        let all = registry.get_all_policies().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].method_id, method);
        assert_eq!(all[0].policy.duration, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn get_contributions_filters_by_source() {
        let (registry, method) = two_source_registry();
        let defaults_contrib = registry.get_contributions(&method, "defaults").await;
        assert_eq!(defaults_contrib.len(), 1);

        let overrides_contrib = registry.get_contributions(&method, "overrides").await;
        assert_eq!(overrides_contrib.len(), 1);

        let unknown = registry.get_contributions(&method, "nonexistent").await;
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn find_by_source_returns_that_sources_raw_snapshot() {
        let (registry, method) = two_source_registry();
        let snapshot = registry.find_by_source("defaults").await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].method_id, method);
        assert_eq!(snapshot[0].policy.duration, Some(Duration::from_secs(900)));

        assert!(registry.find_by_source("missing").await.is_empty());
    }
}
