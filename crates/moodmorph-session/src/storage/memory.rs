//! In-memory blob store.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use moodmorph_core::traits::{KeyValueStore, PersistenceError};

/// In-memory key-value store.
///
/// Useful for tests and embedded renderers without durable storage.
/// Data is lost on restart. An optional byte quota mimics the bounded
/// capacity of browser-local storage.
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            quota: None,
        }
    }

    /// Create a store that rejects writes pushing the total size of all
    /// keys and values past `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new()
        }
    }

    /// Number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().map_or(0, |b| b.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self
            .blobs
            .read()
            .map_err(|e| PersistenceError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| PersistenceError::Internal(e.to_string()))?;

        if let Some(quota) = self.quota {
            let others: usize = blobs
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(PersistenceError::QuotaExceeded { needed, quota });
            }
        }

        blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.blobs
            .write()
            .map_err(|e| PersistenceError::Internal(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(assert_ok!(store.get("k")), None);

        assert_ok!(store.set("k", "one"));
        assert_ok!(store.set("k", "two"));
        assert_eq!(assert_ok!(store.get("k")), Some("two".to_string()));
        assert_eq!(store.len(), 1);

        assert_ok!(store.remove("k"));
        assert_ok!(store.remove("k"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_quota_counts_other_keys_and_allows_overwrite() {
        let store = MemoryStore::with_quota(10);
        assert_ok!(store.set("a", "1234"));
        // Replacing "a" only counts the new value.
        assert_ok!(store.set("a", "123456789"));

        let err = assert_err!(store.set("b", "xx"));
        assert!(matches!(err, PersistenceError::QuotaExceeded { quota: 10, .. }));
        assert_eq!(assert_ok!(store.get("a")), Some("123456789".to_string()));
    }
}
