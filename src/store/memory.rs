use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::CarveError;
use crate::store::KvStore;

/// In-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, String), String>>, CarveError> {
        self.entries
            .lock()
            .map_err(|_| CarveError::Store("memory store lock poisoned".into()))
    }
}

impl KvStore for MemoryStore {
    fn put(&self, domain: &str, key: &str, value: &str) -> Result<(), CarveError> {
        self.lock()?
            .insert((domain.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn get(&self, domain: &str, key: &str) -> Result<Option<String>, CarveError> {
        Ok(self
            .lock()?
            .get(&(domain.to_string(), key.to_string()))
            .cloned())
    }

    fn scan(&self, domain: &str) -> Result<Vec<String>, CarveError> {
        Ok(self
            .lock()?
            .keys()
            .filter(|(d, _)| d == domain)
            .map(|(_, k)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_are_isolated() {
        let store = MemoryStore::new();
        store.put("carves", "k", "1").unwrap();
        store.put("other", "k", "2").unwrap();

        assert_eq!(store.get("carves", "k").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("other", "k").unwrap().as_deref(), Some("2"));
        assert_eq!(store.scan("carves").unwrap(), vec!["k".to_string()]);
        assert!(store.scan("empty").unwrap().is_empty());
    }
}
