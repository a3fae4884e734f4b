//! The backend capability contract.
//!
//! Grounded on `edge-cache::fragment::FragmentCacheBackend` generalized
//! away from raw HTML bytes to a generic envelope, and cross-checked
//! against `dogpile.cache.api.CacheBackend`'s abstract base for the
//! exact method set a backend must provide. Concrete production
//! backends (Redis, Memcached, file) are out of scope here; only the
//! contract and a minimal in-memory test double
//! ([`crate::testing::InMemoryBackend`]) live in this workspace.

use dogpile_core::envelope::CachedValue;
use dogpile_lock::SharedMutex;

use crate::CacheError;

/// What a cache backend must provide for a [`crate::region::CacheRegion`]
/// to use it.
///
/// `V` is the payload type stored in each [`CachedValue`]; backends
/// that only speak bytes should implement [`BytesBackend`] instead and
/// get this trait via the blanket impl below, with `(de)serialization`
/// handled by the region's configured codec.
pub trait CacheBackend<V>: Send + Sync {
    /// Fetch one key's value and metadata, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<CachedValue<V>>, CacheError>;

    /// Fetch several keys at once. The default implementation just
    /// calls [`CacheBackend::get`] per key; backends capable of a
    /// genuine batch round-trip should override this. A single key
    /// that fails to deserialize doesn't fail the whole batch - it's
    /// reported as absent, same as [`CacheBackend::get`] does for that
    /// key alone.
    fn get_multi(&self, keys: &[String]) -> Result<Vec<Option<CachedValue<V>>>, CacheError> {
        keys.iter()
            .map(|k| match self.get(k) {
                Err(CacheError::CantDeserialize(_)) => Ok(None),
                other => other,
            })
            .collect()
    }

    /// Store one key's value.
    fn set(&self, key: &str, value: CachedValue<V>) -> Result<(), CacheError>;

    /// Store several keys at once. No atomicity is promised across the
    /// batch - the default implementation simply calls
    /// [`CacheBackend::set`] per pair in order.
    fn set_multi(&self, pairs: Vec<(String, CachedValue<V>)>) -> Result<(), CacheError> {
        for (key, value) in pairs {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Remove one key. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove several keys at once.
    fn delete_multi(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }

    /// Obtain (constructing lazily if needed) the dogpile mutex for
    /// `key`. Most backends delegate straight to an owned
    /// [`dogpile_lock::NameRegistry`]; a distributed backend would
    /// instead return a distributed mutex handle here.
    fn get_mutex(&self, key: &str) -> SharedMutex;

    /// An optional key-mangling hook a backend can use to keep keys
    /// within a length/character-set limit (the general-purpose
    /// `length_conditional_mangler` lives one layer up, in
    /// [`crate::key`], and is applied by the region before the
    /// backend ever sees the key - this hook is for backend-specific
    /// needs layered on top of that, e.g. a namespacing prefix).
    fn key_mangler(&self, key: &str) -> String {
        key.to_string()
    }
}

/// A backend that only speaks raw bytes, with (de)serialization
/// delegated to the region's configured codec.
///
/// Grounded on `dogpile.cache.api.CacheBackend`'s default
/// `serializer`/`deserializer` hook points: most real backends (Redis,
/// Memcached, a filesystem) only ever see bytes, and layering the
/// envelope (de)serialization once, generically, avoids every backend
/// reimplementing it.
pub trait BytesBackend: Send + Sync {
    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn set_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError>;
    fn delete_bytes(&self, key: &str) -> Result<(), CacheError>;
    fn get_mutex(&self, key: &str) -> SharedMutex;
}

/// Adapts any [`BytesBackend`] into a [`CacheBackend<V>`] for
/// `V: Serialize + DeserializeOwned`, using `serde_json` as the wire
/// format.
pub struct JsonCodec<B> {
    inner: B,
}

impl<B> JsonCodec<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

impl<B, V> CacheBackend<V> for JsonCodec<B>
where
    B: BytesBackend,
    V: serde::Serialize + serde::de::DeserializeOwned,
{
    fn get(&self, key: &str) -> Result<Option<CachedValue<V>>, CacheError> {
        match self.inner.get_bytes(key)? {
            None => Ok(None),
            Some(bytes) => {
                let value: CachedValue<V> = serde_json::from_slice(&bytes)
                    .map_err(|e| CacheError::CantDeserialize(e.to_string()))?;
                Ok(Some(value))
            }
        }
    }

    fn set(&self, key: &str, value: CachedValue<V>) -> Result<(), CacheError> {
        let bytes =
            serde_json::to_vec(&value).map_err(|e| CacheError::CantSerialize(e.to_string()))?;
        self.inner.set_bytes(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete_bytes(key)
    }

    fn get_mutex(&self, key: &str) -> SharedMutex {
        self.inner.get_mutex(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dogpile_lock::NameRegistry;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct InMemoryBytes {
        store: Mutex<HashMap<String, Vec<u8>>>,
        mutexes: NameRegistry,
    }

    impl InMemoryBytes {
        fn new() -> Self {
            Self {
                store: Mutex::new(HashMap::new()),
                mutexes: NameRegistry::in_process(),
            }
        }
    }

    impl BytesBackend for InMemoryBytes {
        fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Ok(self.store.lock().get(key).cloned())
        }

        fn set_bytes(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
            self.store.lock().insert(key.to_string(), bytes);
            Ok(())
        }

        fn delete_bytes(&self, key: &str) -> Result<(), CacheError> {
            self.store.lock().remove(key);
            Ok(())
        }

        fn get_mutex(&self, key: &str) -> SharedMutex {
            self.mutexes.get(key)
        }
    }

    #[test]
    fn json_codec_round_trips_through_the_inner_bytes_backend() {
        let codec: JsonCodec<InMemoryBytes> = JsonCodec::new(InMemoryBytes::new());
        CacheBackend::set(&codec, "k", CachedValue::new("hello".to_string(), 100.0)).unwrap();

        let fetched = CacheBackend::get(&codec, "k").unwrap().unwrap();
        assert_eq!(fetched.into_payload(), "hello");
    }

    #[test]
    fn json_codec_get_reports_cant_deserialize_on_corrupt_bytes() {
        let codec: JsonCodec<InMemoryBytes> = JsonCodec::new(InMemoryBytes::new());
        codec
            .inner
            .set_bytes("k", b"not valid json".to_vec())
            .unwrap();

        let err = CacheBackend::<String>::get(&codec, "k").unwrap_err();
        assert!(matches!(err, CacheError::CantDeserialize(_)));
    }

    #[test]
    fn json_codec_delete_forwards_to_the_inner_backend() {
        let codec: JsonCodec<InMemoryBytes> = JsonCodec::new(InMemoryBytes::new());
        CacheBackend::set(&codec, "k", CachedValue::new(1, 100.0)).unwrap();
        CacheBackend::<i32>::delete(&codec, "k").unwrap();
        assert_eq!(CacheBackend::<i32>::get(&codec, "k").unwrap(), None);
    }

    struct Unserializable;

    impl serde::Serialize for Unserializable {
        fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            Err(serde::ser::Error::custom("deliberately unserializable"))
        }
    }

    impl<'de> serde::Deserialize<'de> for Unserializable {
        fn deserialize<D>(_deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            Ok(Unserializable)
        }
    }

    #[test]
    fn json_codec_set_reports_cant_serialize_when_encoding_fails() {
        let codec: JsonCodec<InMemoryBytes> = JsonCodec::new(InMemoryBytes::new());
        let err = CacheBackend::set(&codec, "k", CachedValue::new(Unserializable, 100.0))
            .unwrap_err();
        assert!(matches!(err, CacheError::CantSerialize(_)));
    }

    #[test]
    fn default_get_multi_recovers_a_single_corrupt_entry_as_absent() {
        let codec: JsonCodec<InMemoryBytes> = JsonCodec::new(InMemoryBytes::new());
        CacheBackend::set(&codec, "good", CachedValue::new("ok".to_string(), 100.0)).unwrap();
        codec
            .inner
            .set_bytes("bad", b"not valid json".to_vec())
            .unwrap();

        let results = CacheBackend::<String>::get_multi(
            &codec,
            &["good".to_string(), "bad".to_string()],
        )
        .unwrap();

        assert_eq!(results[0].clone().unwrap().into_payload(), "ok");
        assert!(results[1].is_none());
    }
}
