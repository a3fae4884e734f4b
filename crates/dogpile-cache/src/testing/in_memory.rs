use std::collections::HashMap;

use dogpile_core::envelope::CachedValue;
use dogpile_lock::{NameRegistry, SharedMutex};
use parking_lot::Mutex;

use crate::backend::CacheBackend;
use crate::error::CacheError;

/// An in-process, `HashMap`-backed [`CacheBackend`], mirroring
/// `dogpile.cache.backends.memory.MemoryBackend`.
///
/// Values are cloned in and out on every access rather than shared by
/// reference, matching what an out-of-process backend's serialization
/// round trip would give a caller - code relying on reference identity
/// surviving a cache round trip is relying on an accident of this one
/// backend, not the contract.
pub struct InMemoryBackend<V> {
    store: Mutex<HashMap<String, CachedValue<V>>>,
    mutexes: NameRegistry,
}

impl<V> Default for InMemoryBackend<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InMemoryBackend<V> {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            mutexes: NameRegistry::in_process(),
        }
    }

    /// Number of keys currently stored. Handy for test assertions.
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}

impl<V: Clone + Send + Sync> CacheBackend<V> for InMemoryBackend<V> {
    fn get(&self, key: &str) -> Result<Option<CachedValue<V>>, CacheError> {
        Ok(self.store.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: CachedValue<V>) -> Result<(), CacheError> {
        self.store.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.lock().remove(key);
        Ok(())
    }

    fn get_mutex(&self, key: &str) -> SharedMutex {
        self.mutexes.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value() {
        let backend: InMemoryBackend<String> = InMemoryBackend::new();
        backend
            .set("k", CachedValue::new("hello".to_string(), 100.0))
            .unwrap();
        let fetched = backend.get("k").unwrap().unwrap();
        assert_eq!(fetched.into_payload(), "hello");
    }

    #[test]
    fn delete_of_absent_key_is_not_an_error() {
        let backend: InMemoryBackend<String> = InMemoryBackend::new();
        assert!(backend.delete("nope").is_ok());
    }

    #[test]
    fn same_key_returns_same_mutex_identity() {
        let backend: InMemoryBackend<i32> = InMemoryBackend::new();
        let a = backend.get_mutex("k");
        let b = backend.get_mutex("k");
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }
}
