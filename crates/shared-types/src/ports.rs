//! # Host Ports
//!
//! The persistent key-value store the host provides. Holds the session key
//! and the last in-app navigation path.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

/// Well-known store keys.
pub mod keys {
    pub const APP_KEY: &str = "app_key";
    pub const SAVED_PATH: &str = "saved_path";
}

/// Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store is corrupt: {0}")]
    Corrupt(String),
}

/// Persistent string key-value store owned by the host.
pub trait HostStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Returns the previous value.
    fn remove(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Volatile store for tests and for hosts without persistence.
#[derive(Debug, Default)]
pub struct InMemoryHostStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryHostStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostStore for InMemoryHostStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.write().remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryHostStore::new();
        assert_eq!(store.get(keys::SAVED_PATH).unwrap(), None);

        store.set(keys::SAVED_PATH, "/learn/#/topics").unwrap();
        assert_eq!(
            store.get(keys::SAVED_PATH).unwrap().as_deref(),
            Some("/learn/#/topics")
        );

        assert_eq!(
            store.remove(keys::SAVED_PATH).unwrap().as_deref(),
            Some("/learn/#/topics")
        );
        assert_eq!(store.remove(keys::SAVED_PATH).unwrap(), None);
    }
}
