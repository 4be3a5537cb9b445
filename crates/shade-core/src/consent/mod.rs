use tracing::{info, warn};

use crate::storage::KeyValueStore;

/// Default-deny analytics consent, mirrored to a store key.
///
/// Only the exact stored string `"true"` grants consent. A missing key, any
/// other value, or an unreadable store all mean disabled.
#[derive(Debug, Clone)]
pub struct ConsentGate {
    key: String,
    enabled: bool,
}

impl ConsentGate {
    /// Read the persisted flag.
    pub fn load(key: impl Into<String>, store: &dyn KeyValueStore) -> Self {
        let key = key.into();
        let enabled = read_flag(&key, store);
        Self { key, enabled }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-read the persisted flag, e.g. after another writer touched the store.
    pub fn refresh(&mut self, store: &dyn KeyValueStore) -> bool {
        self.enabled = read_flag(&self.key, store);
        self.enabled
    }

    /// Persist a new flag. The cached value follows the request even when the
    /// write fails, so a failed revocation still stops collection.
    pub fn set(&mut self, store: &mut dyn KeyValueStore, enabled: bool) {
        let value = if enabled { "true" } else { "false" };
        if let Err(e) = store.set(&self.key, value) {
            warn!(key = %self.key, error = %e, "failed to persist analytics consent");
        }
        if self.enabled != enabled {
            info!(enabled, "analytics consent changed");
        }
        self.enabled = enabled;
    }
}

fn read_flag(key: &str, store: &dyn KeyValueStore) -> bool {
    match store.get(key) {
        Ok(value) => value.as_deref() == Some("true"),
        Err(e) => {
            warn!(key, error = %e, "failed to read analytics consent, treating as disabled");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_consent_defaults_to_disabled() {
        let store = MemoryStore::new();
        let gate = ConsentGate::load("analytics-consent", &store);
        assert!(!gate.is_enabled());
        assert_eq!(gate.key(), "analytics-consent");
    }

    #[test]
    fn test_consent_only_exact_true_enables() {
        let mut store = MemoryStore::new();
        for (value, expected) in [("true", true), ("TRUE", false), ("1", false), ("false", false)] {
            store.set("c", value).unwrap();
            assert_eq!(ConsentGate::load("c", &store).is_enabled(), expected, "{value}");
        }
    }

    #[test]
    fn test_consent_unreadable_store_is_disabled() {
        let store = MemoryStore::unavailable();
        assert!(!ConsentGate::load("c", &store).is_enabled());
    }

    #[test]
    fn test_consent_set_persists() {
        let mut store = MemoryStore::new();
        let mut gate = ConsentGate::load("c", &store);

        gate.set(&mut store, true);
        assert!(gate.is_enabled());
        assert_eq!(store.get("c").unwrap().as_deref(), Some("true"));

        gate.set(&mut store, false);
        assert!(!gate.is_enabled());
        assert_eq!(store.get("c").unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn test_consent_set_with_failing_store_still_updates_cache() {
        let mut store = MemoryStore::unavailable();
        let mut gate = ConsentGate::load("c", &store);
        gate.set(&mut store, true);
        assert!(gate.is_enabled());
    }

    #[test]
    fn test_consent_refresh() {
        let mut store = MemoryStore::new();
        let mut gate = ConsentGate::load("c", &store);
        store.set("c", "true").unwrap();
        assert!(gate.refresh(&store));
    }
}
