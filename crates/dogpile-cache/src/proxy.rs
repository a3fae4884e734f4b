//! Backend proxy chains, applied via a region's `wrap` configuration.
//!
//! Grounded on `dogpile/cache/proxy.py`'s `ProxyBackend`: a proxy
//! wraps an inner backend and forwards every call to it by default,
//! letting a subclass (here, a trait implementor) intercept only the
//! operations it cares about - logging, metrics, encryption, whatever
//! the deployment needs - without re-implementing the whole contract.

use dogpile_core::envelope::CachedValue;
use dogpile_lock::SharedMutex;

use crate::backend::CacheBackend;
use crate::error::CacheError;

/// A backend decorator that forwards to an inner [`CacheBackend`] by
/// default.
///
/// Implement only the methods you want to intercept; the rest fall
/// through to `self.inner()` via the blanket [`CacheBackend`] impl
/// below.
pub trait ProxyBackend<V>: Send + Sync {
    fn inner(&self) -> &dyn CacheBackend<V>;

    fn get(&self, key: &str) -> Result<Option<CachedValue<V>>, CacheError> {
        self.inner().get(key)
    }

    fn get_multi(&self, keys: &[String]) -> Result<Vec<Option<CachedValue<V>>>, CacheError> {
        self.inner().get_multi(keys)
    }

    fn set(&self, key: &str, value: CachedValue<V>) -> Result<(), CacheError> {
        self.inner().set(key, value)
    }

    fn set_multi(&self, pairs: Vec<(String, CachedValue<V>)>) -> Result<(), CacheError> {
        self.inner().set_multi(pairs)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner().delete(key)
    }

    fn delete_multi(&self, keys: &[String]) -> Result<(), CacheError> {
        self.inner().delete_multi(keys)
    }

    fn get_mutex(&self, key: &str) -> SharedMutex {
        self.inner().get_mutex(key)
    }
}

/// Any [`ProxyBackend`] is itself usable as a [`CacheBackend`], so
/// proxies can be nested arbitrarily deep. A region's `wrap` list
/// applies them left-to-right, so the first name ends up outermost.
impl<V, P: ProxyBackend<V>> CacheBackend<V> for P {
    fn get(&self, key: &str) -> Result<Option<CachedValue<V>>, CacheError> {
        ProxyBackend::get(self, key)
    }

    fn get_multi(&self, keys: &[String]) -> Result<Vec<Option<CachedValue<V>>>, CacheError> {
        ProxyBackend::get_multi(self, keys)
    }

    fn set(&self, key: &str, value: CachedValue<V>) -> Result<(), CacheError> {
        ProxyBackend::set(self, key, value)
    }

    fn set_multi(&self, pairs: Vec<(String, CachedValue<V>)>) -> Result<(), CacheError> {
        ProxyBackend::set_multi(self, pairs)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        ProxyBackend::delete(self, key)
    }

    fn delete_multi(&self, keys: &[String]) -> Result<(), CacheError> {
        ProxyBackend::delete_multi(self, keys)
    }

    fn get_mutex(&self, key: &str) -> SharedMutex {
        ProxyBackend::get_mutex(self, key)
    }
}
