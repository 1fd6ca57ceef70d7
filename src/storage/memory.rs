use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{SessionStorage, StorageError};

/// In-memory profile storage. Clones share the same map, so several contexts
/// built from clones of one `MemoryStorage` behave like tabs of one profile.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_profile() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.clone();

        tab_a.set("accessToken", "abc").unwrap();
        assert_eq!(tab_b.get("accessToken").unwrap().as_deref(), Some("abc"));

        tab_b.remove("accessToken").unwrap();
        assert!(tab_a.is_empty());
    }

    #[test]
    fn empty_values_read_as_absent() {
        let storage = MemoryStorage::new();
        storage.set("refreshToken", "").unwrap();
        assert!(storage.get_or_absent("refreshToken").is_none());
        assert!(storage.contains_key("refreshToken"));
    }
}
