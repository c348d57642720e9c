//! In-memory registry of running worker instances.

use crate::config::GatewayConfig;
use crate::{RelayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Registration payload pushed by a worker or built by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRegistration {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub sha256: String,
}

fn default_host() -> String {
    GatewayConfig::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    GatewayConfig::DEFAULT_PORT
}

impl InstanceRegistration {
    /// Identity key: sha256 when present, md5 otherwise.
    pub fn binary_id(&self) -> Option<&str> {
        [self.sha256.as_str(), self.md5.as_str()]
            .into_iter()
            .find(|hash| !hash.is_empty())
    }
}

/// A registered worker instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub binary_id: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub module: String,
    pub md5: String,
    pub sha256: String,
    pub registered_at: DateTime<Utc>,
}

impl InstanceEntry {
    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            binary_id: self.binary_id.clone(),
            module: self.module.clone(),
            path: self.path.clone(),
            port: self.port,
        }
    }

    fn matches_hash(&self, key: &str) -> bool {
        (!self.sha256.is_empty() && self.sha256 == key) || (!self.md5.is_empty() && self.md5 == key)
    }
}

/// Public view of an instance served by `GET /instances`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub binary_id: String,
    pub module: String,
    pub path: String,
    pub port: u16,
}

/// Outcome of [`InstanceRegistry::route_candidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCandidate {
    None,
    One(InstanceEntry),
    Many(usize),
}

/// Process-wide registry of worker instances keyed by binary identity.
///
/// Entries are kept in a `BTreeMap`, so "first match" lookups by module name
/// or path walk instances in identity order and are reproducible.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: Mutex<BTreeMap<String, InstanceEntry>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, InstanceEntry>> {
        // A panic while holding the guard cannot leave the map half-written,
        // so a poisoned lock still guards consistent data.
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register or refresh an instance. Idempotent per identity.
    pub fn register(&self, registration: InstanceRegistration) -> Result<String> {
        self.insert(registration).map(|(binary_id, _)| binary_id)
    }

    /// Register or refresh an instance, reporting whether its identity was new.
    ///
    /// The check and the write happen under one lock, so concurrent callers
    /// inserting the same identity see `true` exactly once.
    pub fn insert(&self, registration: InstanceRegistration) -> Result<(String, bool)> {
        let binary_id = registration
            .binary_id()
            .map(str::to_string)
            .ok_or_else(|| RelayError::Validation {
                field: "sha256".to_string(),
                message: "No sha256 or md5 provided".to_string(),
            })?;

        let entry = InstanceEntry {
            binary_id: binary_id.clone(),
            host: registration.host,
            port: registration.port,
            path: registration.path,
            module: registration.module,
            md5: registration.md5,
            sha256: registration.sha256,
            registered_at: Utc::now(),
        };

        let refreshed = self.lock().insert(binary_id.clone(), entry).is_some();
        debug!(
            binary_id = %binary_id,
            refreshed,
            "Registered instance"
        );

        Ok((binary_id, !refreshed))
    }

    /// Remove an instance by identity, falling back to its sha256 or md5.
    pub fn unregister(&self, key: &str) -> Result<String> {
        let mut instances = self.lock();

        let matched = if instances.contains_key(key) {
            Some(key.to_string())
        } else {
            instances
                .values()
                .find(|entry| entry.matches_hash(key))
                .map(|entry| entry.binary_id.clone())
        };

        match matched {
            Some(binary_id) if !key.is_empty() => {
                instances.remove(&binary_id);
                debug!(binary_id = %binary_id, "Unregistered instance");
                Ok(binary_id)
            }
            _ => Err(RelayError::InstanceNotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Resolve a selector: exact identity, then module name, then path substring.
    pub fn find(&self, selector: &str) -> Option<InstanceEntry> {
        let instances = self.lock();

        if let Some(entry) = instances.get(selector) {
            return Some(entry.clone());
        }

        if let Some(entry) = instances.values().find(|e| e.module == selector) {
            return Some(entry.clone());
        }

        instances
            .values()
            .find(|e| e.path.contains(selector))
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// How many instances a request without a selector could go to.
    ///
    /// Decided under one lock, so the answer never mixes two registry states.
    pub fn route_candidate(&self) -> RouteCandidate {
        let instances = self.lock();
        let mut entries = instances.values();
        match (entries.next(), instances.len()) {
            (None, _) => RouteCandidate::None,
            (Some(entry), 1) => RouteCandidate::One(entry.clone()),
            (Some(_), count) => RouteCandidate::Many(count),
        }
    }

    /// Any registered instance; workers are assumed to expose the same tools.
    pub fn any(&self) -> Option<InstanceEntry> {
        self.lock().values().next().cloned()
    }

    /// Point-in-time snapshot of every instance.
    pub fn list(&self) -> Vec<InstanceEntry> {
        self.lock().values().cloned().collect()
    }

    pub fn summaries(&self) -> Vec<InstanceSummary> {
        self.lock().values().map(InstanceEntry::summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(sha256: &str, md5: &str, module: &str, path: &str, port: u16) -> InstanceRegistration {
        InstanceRegistration {
            host: "127.0.0.1".into(),
            port,
            path: path.into(),
            module: module.into(),
            md5: md5.into(),
            sha256: sha256.into(),
        }
    }

    #[test]
    fn test_register_prefers_sha256() {
        let registry = InstanceRegistry::new();
        let id = registry
            .register(registration("aa11", "bb22", "calc.exe", "/tmp/calc.exe", 13338))
            .unwrap();
        assert_eq!(id, "aa11");
    }

    #[test]
    fn test_register_falls_back_to_md5() {
        let registry = InstanceRegistry::new();
        let id = registry
            .register(registration("", "bb22", "calc.exe", "/tmp/calc.exe", 13338))
            .unwrap();
        assert_eq!(id, "bb22");
    }

    #[test]
    fn test_register_without_hashes_fails_and_leaves_registry_unchanged() {
        let registry = InstanceRegistry::new();
        registry
            .register(registration("aa11", "", "a.exe", "/a.exe", 13338))
            .unwrap();

        let err = registry
            .register(registration("", "", "b.exe", "/b.exe", 13339))
            .unwrap_err();

        assert!(matches!(err, RelayError::Validation { .. }));
        assert_eq!(err.to_string(), "Validation error for sha256: No sha256 or md5 provided");
        assert_eq!(registry.count(), 1);
        assert!(registry.find("b.exe").is_none());
    }

    #[test]
    fn test_reregistration_overwrites_in_place() {
        let registry = InstanceRegistry::new();
        registry
            .register(registration("aa11", "", "old.exe", "/old.exe", 13338))
            .unwrap();
        let first_seen = registry.find("aa11").unwrap().registered_at;

        registry
            .register(registration("aa11", "", "new.exe", "/new.exe", 13340))
            .unwrap();

        assert_eq!(registry.count(), 1);
        let entry = registry.find("aa11").unwrap();
        assert_eq!(entry.module, "new.exe");
        assert_eq!(entry.port, 13340);
        assert!(entry.registered_at >= first_seen);
    }

    #[test]
    fn test_find_identity_beats_module_and_path() {
        let registry = InstanceRegistry::new();
        // Module name and path of this record both equal the other record's identity.
        registry
            .register(registration("zz99", "", "aa11", "/bin/aa11", 13338))
            .unwrap();
        registry
            .register(registration("aa11", "", "other.exe", "/other.exe", 13339))
            .unwrap();

        let found = registry.find("aa11").unwrap();
        assert_eq!(found.binary_id, "aa11");
        assert_eq!(found.port, 13339);
    }

    #[test]
    fn test_find_module_beats_path() {
        let registry = InstanceRegistry::new();
        registry
            .register(registration("aa11", "", "x.dll", "/samples/notepad.exe.bak", 13338))
            .unwrap();
        registry
            .register(registration("bb22", "", "notepad.exe", "/other/n.exe", 13339))
            .unwrap();

        assert_eq!(registry.find("notepad.exe").unwrap().binary_id, "bb22");
    }

    #[test]
    fn test_find_path_substring() {
        let registry = InstanceRegistry::new();
        registry
            .register(registration("aa11", "", "calc.exe", "/home/re/samples/calc.exe", 13338))
            .unwrap();

        assert_eq!(registry.find("samples/calc").unwrap().binary_id, "aa11");
        assert!(registry.find("notepad").is_none());
    }

    #[test]
    fn test_unregister_by_identity_and_by_hash() {
        let registry = InstanceRegistry::new();
        registry
            .register(registration("aa11", "m1", "a.exe", "/a.exe", 13338))
            .unwrap();
        registry
            .register(registration("bb22", "m2", "b.exe", "/b.exe", 13339))
            .unwrap();

        assert_eq!(registry.unregister("aa11").unwrap(), "aa11");
        // md5 of the second record resolves to its sha256 identity.
        assert_eq!(registry.unregister("m2").unwrap(), "bb22");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_unknown_key_fails() {
        let registry = InstanceRegistry::new();
        registry
            .register(registration("", "m1", "a.exe", "/a.exe", 13338))
            .unwrap();

        assert!(matches!(
            registry.unregister("nope"),
            Err(RelayError::InstanceNotFound { .. })
        ));
        assert!(registry.unregister("").is_err());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_route_candidate_counts_instances() {
        let registry = InstanceRegistry::new();
        assert_eq!(registry.route_candidate(), RouteCandidate::None);

        registry
            .register(registration("aa11", "", "a.exe", "/a.exe", 13338))
            .unwrap();
        assert!(matches!(
            registry.route_candidate(),
            RouteCandidate::One(entry) if entry.binary_id == "aa11"
        ));

        registry
            .register(registration("bb22", "", "b.exe", "/b.exe", 13339))
            .unwrap();
        assert_eq!(registry.route_candidate(), RouteCandidate::Many(2));
        assert!(registry.any().is_some());
    }

    #[test]
    fn test_insert_reports_new_identity_once() {
        let registry = InstanceRegistry::new();
        let (id, new) = registry
            .insert(registration("aa11", "", "a.exe", "/a.exe", 13338))
            .unwrap();
        assert_eq!(id, "aa11");
        assert!(new);

        let (_, new) = registry
            .insert(registration("aa11", "", "a.exe", "/a.exe", 13340))
            .unwrap();
        assert!(!new);
    }

    #[test]
    fn test_concurrent_insert_of_same_identity_is_new_once() {
        let registry = std::sync::Arc::new(InstanceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .insert(registration("aa11", "", "a.exe", "/a.exe", 13338))
                        .unwrap()
                        .1
                })
            })
            .collect();

        let fresh = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|new| *new)
            .count();
        assert_eq!(fresh, 1);
    }

    #[test]
    fn test_list_and_summaries_are_snapshots() {
        let registry = InstanceRegistry::new();
        registry
            .register(registration("bb22", "", "b.exe", "/b.exe", 13339))
            .unwrap();
        registry
            .register(registration("aa11", "", "a.exe", "/a.exe", 13338))
            .unwrap();

        let snapshot = registry.list();
        registry.unregister("aa11").unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].binary_id, "aa11");
        assert_eq!(
            registry.summaries(),
            vec![InstanceSummary {
                binary_id: "bb22".into(),
                module: "b.exe".into(),
                path: "/b.exe".into(),
                port: 13339,
            }]
        );
    }

    #[test]
    fn test_registration_defaults() {
        let reg: InstanceRegistration = serde_json::from_str(r#"{"md5": "m1"}"#).unwrap();
        assert_eq!(reg.host, "127.0.0.1");
        assert_eq!(reg.port, 13337);
        assert_eq!(reg.binary_id(), Some("m1"));
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = std::sync::Arc::new(InstanceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let sha = format!("{i:02}{j:03}");
                        registry
                            .register(registration(&sha, "", "w.exe", "/w.exe", 13338))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.count(), 400);
    }
}
