//! In-memory store implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::{SessionStore, Versioned};

/// In-memory store for tests and throwaway sessions.
///
/// Thread-safe but not persistent across process restarts.
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Versioned>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Versioned>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: String, expected: Option<u64>) -> StoreResult<u64> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let current = entries.get(key).map(|e| e.version).unwrap_or(0);

        if let Some(expected) = expected {
            if expected != current {
                return Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected,
                    actual: current,
                });
            }
        }

        let version = current + 1;
        entries.insert(key.to_string(), Versioned { value, version });
        Ok(version)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_and_set_rejects_stale_version() {
        let store = InMemoryStore::new();
        assert_eq!(store.put("k", "a".into(), Some(0)).unwrap(), 1);
        assert_eq!(store.put("k", "b".into(), Some(1)).unwrap(), 2);

        let err = store.put("k", "c".into(), Some(1)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { expected: 1, actual: 2, .. }
        ));
        assert_eq!(store.get("k").unwrap().unwrap().value, "b");
    }

    #[test]
    fn unconditional_put_and_prefix_listing() {
        let store = InMemoryStore::new();
        store.put("history/bob", "[]".into(), None).unwrap();
        store.put("history/alice", "[]".into(), None).unwrap();
        store.put("users", "[]".into(), None).unwrap();

        assert_eq!(
            store.keys("history/").unwrap(),
            vec!["history/alice".to_string(), "history/bob".to_string()]
        );

        store.remove("users").unwrap();
        assert!(store.get("users").unwrap().is_none());
    }
}
