//! Loads per-method cache policies from a YAML configuration file.
//!
//! Entries are matched top to bottom; the first whose `method` pattern matches wins,
//! mirroring the layered, first-match-wins endpoint lists the runtime's policy sources
//! are stacked in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use cachekit::PolicySource;
use cachekit_core::MethodId;
use cachekit_core::policy::{
    CachePolicy, CachePolicyFields, ChangeReason, PolicyChange, PolicyContribution, PolicyDelta, PolicyKind,
    PolicySnapshot,
};
use futures::stream::BoxStream;
use notify::Watcher;
use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::ConfigError;

/// One method-to-policy mapping parsed out of a configuration file.
///
/// `method` matches a [`MethodId`]'s string form exactly, or as a prefix when it ends
/// in `*` (e.g. `"Orders.*"` matches every method whose name starts with `"Orders."`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodPolicyEntry {
    /// Exact method name, or a `*`-suffixed prefix.
    pub method: String,
    /// Cache TTL, in seconds. Absent means "do not cache this method".
    pub ttl_secs: Option<u64>,
    /// Invalidation tags to associate with cached entries.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Policy version embedded in derived keys.
    pub version: Option<u32>,
    /// Refuse to cache non-idempotent callers.
    pub require_idempotent: Option<bool>,
}

impl MethodPolicyEntry {
    fn matches(&self, method: &str) -> bool {
        match self.method.strip_suffix('*') {
            Some(prefix) => method.starts_with(prefix),
            None => self.method == method,
        }
    }

    fn into_policy(self, source_name: &str) -> CachePolicy {
        let policy = CachePolicy {
            duration: self.ttl_secs.map(std::time::Duration::from_secs),
            tags: self.tags.into_iter().map(SmolStr::new).collect(),
            version: self.version,
            require_idempotent: self.require_idempotent,
            ..Default::default()
        };
        let fields = policy.fields_set();
        policy.with_contribution(PolicyContribution {
            source_id: SmolStr::new(source_name),
            fields_set: fields,
            kind: PolicyKind::Set,
            timestamp: chrono::Utc::now(),
            metadata: Some(std::collections::BTreeMap::from([(
                SmolStr::new("source"),
                SmolStr::new(source_name),
            )])),
            notes: None,
        })
    }
}

/// A file-backed [`PolicySource`]: a flat, ordered list of method-to-policy entries.
///
/// ```yaml
/// entries:
///   - method: "Orders.Get"
///     ttl_secs: 30
///     tags: ["orders"]
///   - method: "Orders.*"
///     ttl_secs: 5
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationFile {
    entries: Vec<MethodPolicyEntry>,
    #[serde(skip, default = "default_source_name")]
    source_name: String,
}

fn default_source_name() -> String {
    "ConfigurationFile".to_string()
}

impl ConfigurationFile {
    /// Parses a configuration document from a YAML string.
    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(yaml).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Reads and parses a configuration document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_str(&contents)?;
        config.source_name = format!("ConfigurationFile({})", path.display());
        Ok(config)
    }

    /// Names this source after `name` instead of the default/path-derived name, so
    /// provenance records are easier to tell apart when several files are layered.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    fn resolve_sync(&self, method: &str) -> Option<CachePolicy> {
        let entry = self.entries.iter().find(|entry| entry.matches(method))?;
        Some(entry.clone().into_policy(&self.source_name))
    }

    fn snapshot_sync(&self) -> Vec<PolicySnapshot> {
        let now = chrono::Utc::now();
        self.entries
            .iter()
            .map(|entry| PolicySnapshot {
                source_id: SmolStr::new(&self.source_name),
                method_id: MethodId::new(&entry.method),
                policy: entry.clone().into_policy(&self.source_name),
                timestamp: now,
                metadata: None,
            })
            .collect()
    }
}

#[async_trait]
impl PolicySource for ConfigurationFile {
    fn name(&self) -> &str {
        &self.source_name
    }

    async fn resolve(&self, method: &MethodId) -> Option<CachePolicy> {
        self.resolve_sync(method.as_str())
    }

    async fn snapshot(&self) -> Vec<PolicySnapshot> {
        self.snapshot_sync()
    }
}

/// A [`ConfigurationFile`] that watches its backing path and reloads on change.
///
/// Filesystem events are debounced: a burst of writes (editors often truncate-then-write,
/// producing several events per save) collapses into a single reload once events stop
/// arriving for `debounce`. Each reload diffs the new entries against the previous ones
/// by `method` pattern and emits a [`PolicyChange`] per added, updated, or removed entry
/// on [`Self::watch`]'s stream; [`PolicySource::resolve`] always reads the latest loaded
/// version.
pub struct WatchedConfigurationFile {
    path: PathBuf,
    source_name: String,
    current: RwLock<ConfigurationFile>,
    changes: tokio::sync::broadcast::Sender<PolicyChange>,
    _watcher: notify::RecommendedWatcher,
}

impl std::fmt::Debug for WatchedConfigurationFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchedConfigurationFile")
            .field("path", &self.path)
            .field("source_name", &self.source_name)
            .finish()
    }
}

impl WatchedConfigurationFile {
    /// Loads `path` and starts watching it for changes, debounced by `debounce`.
    ///
    /// The returned value is `Arc`-wrapped because the background reload thread holds
    /// its own handle to it; dropping every other handle still leaves that thread (and
    /// the underlying `notify` watcher) running until the process exits, matching how
    /// `MemoryStore::spawn_sweeper`'s detached task behaves.
    pub fn watch(path: impl AsRef<Path>, debounce: Duration) -> Result<Arc<Self>, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let initial = ConfigurationFile::from_path(&path)?;
        let source_name = format!("ConfigurationFile({})", path.display());
        let (changes, _receiver) = tokio::sync::broadcast::channel(256);

        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            if let Ok(event) = event {
                let _ = event_tx.send(event);
            }
        })
        .map_err(|source| ConfigError::Watch { path: path.clone(), source })?;
        watcher
            .watch(&path, notify::RecursiveMode::NonRecursive)
            .map_err(|source| ConfigError::Watch { path: path.clone(), source })?;

        let this = Arc::new(Self {
            path: path.clone(),
            source_name,
            current: RwLock::new(initial),
            changes,
            _watcher: watcher,
        });

        let reloader = Arc::clone(&this);
        std::thread::spawn(move || {
            while let Ok(first) = event_rx.recv() {
                let _ = first;
                while event_rx.recv_timeout(debounce).is_ok() {
                    // Drain the rest of this burst; only reload once it quiets down.
                }
                reloader.reload_and_diff();
            }
        });

        Ok(this)
    }

    /// Re-reads the backing file and emits a [`PolicyChange`] for every entry that was
    /// added, changed, or disappeared since the last load. Parse failures are logged and
    /// leave the previously loaded configuration in effect.
    fn reload_and_diff(&self) {
        let new_config = match ConfigurationFile::from_path(&self.path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to reload configuration file, keeping previous version");
                return;
            }
        };

        let mut current = self.current.write().expect("configuration lock poisoned");
        let old_by_method: HashMap<&str, &MethodPolicyEntry> =
            current.entries.iter().map(|entry| (entry.method.as_str(), entry)).collect();
        let new_by_method: HashMap<&str, &MethodPolicyEntry> =
            new_config.entries.iter().map(|entry| (entry.method.as_str(), entry)).collect();
        let now = chrono::Utc::now();

        for (method, new_entry) in &new_by_method {
            let reason = match old_by_method.get(method) {
                None => ChangeReason::Added,
                Some(old_entry) if *old_entry != *new_entry => ChangeReason::Updated,
                Some(_) => continue,
            };
            let policy = (*new_entry).clone().into_policy(&self.source_name);
            let _ = self.changes.send(PolicyChange {
                source_id: SmolStr::new(&self.source_name),
                method_id: MethodId::new(method),
                delta: PolicyDelta {
                    set_fields: policy.fields_set(),
                    cleared_fields: CachePolicyFields::empty(),
                    policy,
                },
                reason,
                timestamp: now,
            });
        }

        for method in old_by_method.keys() {
            if !new_by_method.contains_key(method) {
                let _ = self.changes.send(PolicyChange {
                    source_id: SmolStr::new(&self.source_name),
                    method_id: MethodId::new(method),
                    delta: PolicyDelta {
                        set_fields: CachePolicyFields::empty(),
                        cleared_fields: CachePolicyFields::all(),
                        policy: CachePolicy::default(),
                    },
                    reason: ChangeReason::Removed,
                    timestamp: now,
                });
            }
        }

        *current = new_config;
    }
}

#[async_trait]
impl PolicySource for WatchedConfigurationFile {
    fn name(&self) -> &str {
        &self.source_name
    }

    async fn resolve(&self, method: &MethodId) -> Option<CachePolicy> {
        self.current.read().expect("configuration lock poisoned").resolve_sync(method.as_str())
    }

    async fn snapshot(&self) -> Vec<PolicySnapshot> {
        self.current.read().expect("configuration lock poisoned").snapshot_sync()
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

    #[tokio::test]
    async fn exact_match_wins_over_prefix() {
        let config = ConfigurationFile::from_str(
            r#"
entries:
  - method: "Orders.Get"
    ttl_secs: 30
    tags: ["orders"]
  - method: "Orders.*"
    ttl_secs: 5
"#,
        )
        .expect("valid configuration");

        let policy = config
            .resolve(&MethodId::new("Orders.Get"))
            .await
            .expect("method is configured");
        assert_eq!(policy.duration, Some(std::time::Duration::from_secs(30)));
        assert_eq!(policy.tags, vec![SmolStr::new("orders")]);
    }

    #[tokio::test]
    async fn prefix_entry_catches_unmatched_methods() {
        let config = ConfigurationFile::from_str(
            r#"
entries:
  - method: "Orders.Get"
    ttl_secs: 30
  - method: "Orders.*"
    ttl_secs: 5
"#,
        )
        .expect("valid configuration");

        let policy = config
            .resolve(&MethodId::new("Orders.List"))
            .await
            .expect("prefix entry matches");
        assert_eq!(policy.duration, Some(std::time::Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn unconfigured_method_resolves_to_none() {
        let config = ConfigurationFile::from_str("entries: []").expect("valid configuration");
        assert!(config.resolve(&MethodId::new("Unrelated")).await.is_none());
    }

    #[tokio::test]
    async fn watched_file_reloads_and_emits_changes_on_write() {
        use futures::StreamExt;
        use std::io::Write;

        let mut path = std::env::temp_dir();
        path.push(format!("cachekit-watch-test-{}.yaml", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "entries:\n  - method: \"Orders.Get\"\n    ttl_secs: 30\n").unwrap();
        }

        let watched = WatchedConfigurationFile::watch(&path, Duration::from_millis(20)).expect("can watch file");
        let mut changes = watched.watch();

        assert_eq!(
            watched.resolve(&MethodId::new("Orders.Get")).await.unwrap().duration,
            Some(Duration::from_secs(30))
        );

        {
            let mut file = std::fs::OpenOptions::new().write(true).truncate(true).open(&path).unwrap();
            writeln!(file, "entries:\n  - method: \"Orders.Get\"\n    ttl_secs: 60\n").unwrap();
        }

        let change = tokio::time::timeout(Duration::from_secs(5), changes.next())
            .await
            .expect("change observed within timeout")
            .expect("stream yields a change");
        assert_eq!(change.reason, ChangeReason::Updated);
        assert_eq!(change.method_id, MethodId::new("Orders.Get"));

        let _ = std::fs::remove_file(&path);
    }
}
