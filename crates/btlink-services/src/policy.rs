//! Connection policy store, keyed by (profile, peer).
//!
//! An absent rule reads as `Unknown`, which permits connections. Setting
//! `Unknown` removes the rule. With a `persist_path` every mutation is
//! written to disk as JSON and the rules are reloaded on construction, so
//! policy changes made over the API survive a daemon restart.

use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use btlink_core::{ConnectionPolicy, PeerAddress};

/// On-disk form: profile name → address string → policy.
type Snapshot = HashMap<String, HashMap<String, ConnectionPolicy>>;

#[derive(Clone, Default)]
pub struct PolicyStore {
    rules: Arc<DashMap<(String, PeerAddress), ConnectionPolicy>>,
    persist_path: Arc<Option<PathBuf>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store backed by the given file, loading it if it exists.
    pub fn with_persistence(path: PathBuf) -> Self {
        let store = Self {
            rules: Arc::new(DashMap::new()),
            persist_path: Arc::new(Some(path)),
        };
        store.load_from_disk();
        store
    }

    pub fn get(&self, profile: &str, peer: &PeerAddress) -> ConnectionPolicy {
        self.rules
            .get(&(profile.to_string(), *peer))
            .map(|r| *r.value())
            .unwrap_or_default()
    }

    pub fn set(&self, profile: &str, peer: PeerAddress, policy: ConnectionPolicy) {
        let key = (profile.to_string(), peer);
        match policy {
            ConnectionPolicy::Unknown => {
                self.rules.remove(&key);
            }
            _ => {
                self.rules.insert(key, policy);
            }
        }
        self.save_to_disk();
        tracing::info!(profile, peer = %peer, policy = ?policy, "connection policy set");
    }

    /// Explicit rules for one profile, sorted by address.
    pub fn list(&self, profile: &str) -> Vec<(PeerAddress, ConnectionPolicy)> {
        let mut rules: Vec<_> = self
            .rules
            .iter()
            .filter(|entry| entry.key().0 == profile)
            .map(|entry| (entry.key().1, *entry.value()))
            .collect();
        rules.sort_by_key(|(peer, _)| *peer);
        rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl PolicyStore {
    /// Best-effort: failures are logged, the in-memory rule stays.
    fn save_to_disk(&self) {
        let Some(path) = self.persist_path.as_ref() else {
            return;
        };
        let mut snapshot = Snapshot::new();
        for entry in self.rules.iter() {
            let (profile, peer) = entry.key();
            snapshot
                .entry(profile.clone())
                .or_default()
                .insert(peer.to_string(), *entry.value());
        }
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist connection policies");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize connection policies");
            }
        }
    }

    fn load_from_disk(&self) {
        let Some(path) = self.persist_path.as_ref() else {
            return;
        };
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to read connection policies");
                return;
            }
        };
        let snapshot: Snapshot = match serde_json::from_str(&text) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to parse connection policies");
                return;
            }
        };
        let mut loaded = 0usize;
        for (profile, peers) in snapshot {
            for (addr, policy) in peers {
                match addr.parse::<PeerAddress>() {
                    Ok(peer) if policy != ConnectionPolicy::Unknown => {
                        self.rules.insert((profile.clone(), peer), policy);
                        loaded += 1;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "skipping persisted policy"),
                }
            }
        }
        if loaded > 0 {
            tracing::info!(count = loaded, path = %path.display(), "loaded persisted connection policies");
        }
    }
}
