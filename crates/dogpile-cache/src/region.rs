//! `CacheRegion<V>`: the public front-end every caller talks to.
//!
//! Grounded on `dogpile/cache/region.py`'s `CacheRegion`, and on
//! `edge-cache::fragment::FragmentCache` for the overall "own a backend
//! + mutex registry + compose them behind a small set of public
//! methods" shape. The dogpile state machine itself lives in
//! `dogpile-lock`; this module is the thing that wires a
//! `CacheBackend<V>`, a cache key, and a creator closure into that
//! machine, plus everything dogpile-lock deliberately knows nothing
//! about: namespaces, key mangling, invalidation, and the `*_multi`
//! batch operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use dogpile_core::config::RegionConfig;
use dogpile_core::envelope::{CachedValue, MaybeValue};
use dogpile_core::expiration::ExpirationTime;
use dogpile_lock::coordinator::DogpileSource;
use dogpile_lock::{AsyncRunner, DogpileMutex};

use crate::backend::CacheBackend;
use crate::decorator::{CachedFunction, CachedMultiFunction};
use crate::error::CacheError;
use crate::key::FunctionIdentity;

/// A factory that wraps an already-constructed backend in a proxy,
/// keyed by the proxy's configured name. Used by
/// [`CacheRegion::configure_from_config`] to resolve a `wrap` list into
/// actual proxy chains.
pub type ProxyFactory<V> = Arc<dyn Fn(Arc<dyn CacheBackend<V>>) -> Arc<dyn CacheBackend<V>> + Send + Sync>;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs_f64()
}

/// A corrupt stored envelope is recovered as if the key held no value
/// at all, rather than failing the caller's read - the bytes already
/// on the backend can't be un-corrupted by returning an error, and the
/// caller is better served by a cache miss that triggers regeneration.
fn recover_deserialize<T>(result: Result<T, CacheError>) -> Result<T, CacheError>
where
    T: Default,
{
    match result {
        Err(CacheError::CantDeserialize(_)) => Ok(T::default()),
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
struct Invalidation {
    timestamp: f64,
    hard: bool,
}

struct Configured<V> {
    backend: Arc<dyn CacheBackend<V>>,
    expiration_time: ExpirationTime,
}

/// A predicate deciding whether a freshly created value is worth
/// caching at all.
pub type ShouldCacheFn<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// The cache-coordination front-end. One `CacheRegion` owns one
/// backend, one mutex namespace (via that backend's `get_mutex`), and
/// a region-wide namespace string folded into every key.
pub struct CacheRegion<V> {
    namespace: String,
    key_mangler: Option<Box<dyn Fn(&str) -> String + Send + Sync>>,
    async_runner: Option<Arc<dyn AsyncRunner>>,
    configured: RwLock<Option<Configured<V>>>,
    invalidation: RwLock<Option<Invalidation>>,
}

impl<V> CacheRegion<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// An unconfigured region. Call [`CacheRegion::configure`] before
    /// using it - every other method returns
    /// [`dogpile_core::Error::UnconfiguredRegion`] until then.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key_mangler: None,
            async_runner: None,
            configured: RwLock::new(None),
            invalidation: RwLock::new(None),
        }
    }

    /// Install a key-mangling hook (`length_conditional_mangler` is the
    /// canonical one, see [`crate::key`]) applied to every key before
    /// it reaches the backend.
    pub fn with_key_mangler(mut self, mangler: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.key_mangler = Some(Box::new(mangler));
        self
    }

    /// Install a background runner used for the stale-return-with-
    /// async-handoff outcome. Without one, a stale hit this region
    /// acquires the lock for always regenerates synchronously.
    pub fn with_async_runner(mut self, runner: impl AsyncRunner + 'static) -> Self {
        self.async_runner = Some(Arc::new(runner));
        self
    }

    /// Attach a backend and a default expiration time. May only be
    /// called once.
    pub fn configure(
        &self,
        backend: Arc<dyn CacheBackend<V>>,
        expiration_time: ExpirationTime,
    ) -> Result<(), CacheError> {
        let mut configured = self.configured.write();
        if configured.is_some() {
            return Err(dogpile_core::Error::AlreadyConfigured.into());
        }
        *configured = Some(Configured {
            backend,
            expiration_time,
        });
        Ok(())
    }

    /// Configure from a flat `<prefix>.*` dictionary, resolving
    /// `<prefix>.backend` against a caller-supplied table of
    /// already-constructed backends (this workspace ships no by-name
    /// backend factory registry, since concrete backends are out of
    /// scope beyond the in-memory test double).
    ///
    /// `<prefix>.wrap`, if present, is resolved against `proxies` the
    /// same way: each name is looked up and applied left-to-right, so
    /// the first name in the list ends up the outermost proxy around
    /// the resolved backend.
    pub fn configure_from_config(
        &self,
        dict: &BTreeMap<String, String>,
        prefix: &str,
        backends: &BTreeMap<String, Arc<dyn CacheBackend<V>>>,
        proxies: &BTreeMap<String, ProxyFactory<V>>,
    ) -> Result<(), CacheError> {
        let parsed = RegionConfig::from_prefixed_map(dict, prefix)?;
        let backend_name = parsed
            .backend
            .ok_or_else(|| dogpile_core::Error::UnknownBackend("<missing>".to_string()))?;
        let mut backend = backends
            .get(&backend_name)
            .cloned()
            .ok_or_else(|| dogpile_core::Error::UnknownBackend(backend_name))?;
        for proxy_name in parsed.wrap.iter().rev() {
            let factory = proxies
                .get(proxy_name)
                .ok_or_else(|| dogpile_core::Error::UnknownProxy(proxy_name.clone()))?;
            backend = factory(backend);
        }
        let expiration_time = match parsed.expiration_time {
            Some(seconds) => ExpirationTime::from_seconds(seconds)?,
            None => ExpirationTime::After(60.0),
        };
        self.configure(backend, expiration_time)
    }

    fn require_configured(&self) -> Result<(), CacheError> {
        if self.configured.read().is_none() {
            return Err(dogpile_core::Error::UnconfiguredRegion.into());
        }
        Ok(())
    }

    fn mangle(&self, key: &str) -> String {
        let namespaced = format!("{}:{}", self.namespace, key);
        match &self.key_mangler {
            Some(mangler) => mangler(&namespaced),
            None => namespaced,
        }
    }

    /// Invalidate every value currently stored through this region,
    /// without touching the backend.
    ///
    /// Soft invalidation (`hard = false`) marks every existing entry
    /// stale as of now - the next `get_or_create` treats it exactly
    /// like a normal TTL expiry (stale-return, optional async
    /// hand-off). Hard invalidation additionally forbids returning the
    /// stale payload at all: the next `get_or_create` behaves as if no
    /// value were stored, blocking concurrent callers on a synchronous
    /// regeneration rather than handing any of them the old data.
    pub fn invalidate(&self, hard: bool) {
        *self.invalidation.write() = Some(Invalidation {
            timestamp: now_secs(),
            hard,
        });
    }

    /// Fetch one key without triggering regeneration, honoring the
    /// region's default expiration time.
    pub fn get(&self, key: &str) -> Result<MaybeValue<V>, CacheError> {
        self.get_with_expiration(key, None, false)
    }

    /// Fetch one key with an explicit per-call expiration override
    /// and/or `ignore_expiration`. A value whose age exceeds the
    /// resolved expiration, or that predates the region's last
    /// invalidation, is reported as [`MaybeValue::NoValue`] unless
    /// `ignore_expiration` is set.
    pub fn get_with_expiration(
        &self,
        key: &str,
        expiration_time: Option<ExpirationTime>,
        ignore_expiration: bool,
    ) -> Result<MaybeValue<V>, CacheError> {
        self.require_configured()?;
        let (backend, default_expiration) = {
            let configured = self.configured.read();
            let c = configured.as_ref().unwrap();
            (Arc::clone(&c.backend), c.expiration_time)
        };
        let expiration = expiration_time.unwrap_or(default_expiration);
        let mangled = self.mangle(key);
        let now = now_secs();
        let invalidation = *self.invalidation.read();
        match recover_deserialize(backend.get(&mangled))? {
            Some(envelope) if envelope.is_usable() => {
                let invalidated_away =
                    invalidation.is_some_and(|inv| envelope.created_at() < inv.timestamp);
                if invalidated_away && !ignore_expiration {
                    return Ok(MaybeValue::NoValue);
                }
                if ignore_expiration || expiration.is_fresh(now - envelope.created_at()) {
                    Ok(MaybeValue::Value(envelope.into_payload()))
                } else {
                    Ok(MaybeValue::NoValue)
                }
            }
            _ => Ok(MaybeValue::NoValue),
        }
    }

    /// Fetch several keys, preserving input order. Each position is
    /// independently `NoValue` or `Value`, honoring the region's
    /// default expiration time and invalidation state exactly as
    /// [`CacheRegion::get`] does.
    pub fn get_multi(&self, keys: &[String]) -> Result<Vec<MaybeValue<V>>, CacheError> {
        self.require_configured()?;
        let (backend, expiration) = {
            let configured = self.configured.read();
            let c = configured.as_ref().unwrap();
            (Arc::clone(&c.backend), c.expiration_time)
        };
        let now = now_secs();
        let invalidation = *self.invalidation.read();
        let mangled: Vec<String> = keys.iter().map(|k| self.mangle(k)).collect();
        let envelopes = backend.get_multi(&mangled)?;
        Ok(envelopes
            .into_iter()
            .map(|e| match e {
                Some(envelope) if envelope.is_usable() && expiration.is_fresh(now - envelope.created_at()) => {
                    let invalidated_away =
                        invalidation.is_some_and(|inv| envelope.created_at() < inv.timestamp);
                    if invalidated_away {
                        MaybeValue::NoValue
                    } else {
                        MaybeValue::Value(envelope.into_payload())
                    }
                }
                _ => MaybeValue::NoValue,
            })
            .collect())
    }

    /// Store a value directly, bypassing the dogpile protocol.
    pub fn set(&self, key: &str, value: V) -> Result<(), CacheError> {
        self.require_configured()?;
        let configured = self.configured.read();
        let backend = &configured.as_ref().unwrap().backend;
        let mangled = self.mangle(key);
        backend.set(&mangled, CachedValue::new(value, now_secs()))
    }

    pub fn set_multi(&self, pairs: Vec<(String, V)>) -> Result<(), CacheError> {
        self.require_configured()?;
        let configured = self.configured.read();
        let backend = &configured.as_ref().unwrap().backend;
        let now = now_secs();
        let mangled_pairs = pairs
            .into_iter()
            .map(|(k, v)| (self.mangle(&k), CachedValue::new(v, now)))
            .collect();
        backend.set_multi(mangled_pairs)
    }

    /// Remove one key. Deleting an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.require_configured()?;
        let configured = self.configured.read();
        let backend = &configured.as_ref().unwrap().backend;
        backend.delete(&self.mangle(key))
    }

    pub fn delete_multi(&self, keys: &[String]) -> Result<(), CacheError> {
        self.require_configured()?;
        let configured = self.configured.read();
        let backend = &configured.as_ref().unwrap().backend;
        let mangled: Vec<String> = keys.iter().map(|k| self.mangle(k)).collect();
        backend.delete_multi(&mangled)
    }

    /// The one-key dogpile protocol: return the cached value if fresh,
    /// otherwise have exactly one caller regenerate it
    /// (synchronously, or via the configured async runner if this
    /// value is merely stale rather than entirely missing) while
    /// everyone else gets the stale value or waits.
    #[instrument(skip(self, creator, should_cache))]
    pub fn get_or_create(
        &self,
        key: &str,
        creator: impl FnMut() -> Result<V, CacheError> + Send + 'static,
        expiration_override: Option<ExpirationTime>,
        should_cache: Option<ShouldCacheFn<V>>,
    ) -> Result<V, CacheError> {
        self.require_configured()?;
        let (backend, default_expiration) = {
            let configured = self.configured.read();
            let c = configured.as_ref().unwrap();
            (Arc::clone(&c.backend), c.expiration_time)
        };

        let mangled = self.mangle(key);
        let now = now_secs();
        let invalidation = *self.invalidation.read();

        let peeked = recover_deserialize(backend.get(&mangled))?;
        let invalidated_away = peeked.as_ref().is_some_and(|env| {
            env.is_usable()
                && invalidation.is_some_and(|inv| env.created_at() < inv.timestamp)
        });
        let hard_blocked = invalidated_away && invalidation.is_some_and(|inv| inv.hard);

        let effective_expiration = if invalidated_away {
            ExpirationTime::Immediate
        } else {
            expiration_override.unwrap_or(default_expiration)
        };

        let mutex = backend.get_mutex(&mangled);
        let source = RegionSource {
            backend,
            key: mangled,
            hard_blocked,
            creator: Box::new(creator),
            should_cache,
            now,
        };

        let async_runner: Option<&dyn AsyncRunner> = if hard_blocked {
            None
        } else {
            self.async_runner.as_deref()
        };

        debug!(invalidated_away, hard_blocked, "dispatching get_or_create");
        let outcome = dogpile_lock::get_or_create(&mutex, effective_expiration, now, source, async_runner)
            .inspect_err(|err| info!(%err, "creator failed during get_or_create"))?;
        Ok(outcome.into_value())
    }

    /// The `*_multi` dogpile protocol: batch-read `keys`, and
    /// regenerate only the ones that are missing or stale in a single
    /// call to `creator`.
    ///
    /// Per-key mutexes are acquired just-in-time, one key at a time,
    /// in *sorted mangled-key order* rather than all upfront - this
    /// avoids two concurrent multi-calls over overlapping key sets
    /// deadlocking on inconsistent acquisition order, at the cost of
    /// not strictly guaranteeing every stale key in the batch is
    /// regenerated in the same round (a key whose lock is held
    /// elsewhere is returned stale, same as the single-key path).
    /// No async hand-off is offered for this path: a multi-key
    /// regeneration batches a single backing call across several keys,
    /// and handing that batch to a background runner would mean some
    /// callers block on a job that is also regenerating keys they
    /// never asked for.
    #[instrument(skip(self, creator, should_cache))]
    pub fn get_or_create_multi(
        &self,
        keys: &[String],
        creator: impl FnOnce(&[String]) -> Result<Vec<V>, CacheError>,
        expiration_override: Option<ExpirationTime>,
        should_cache: Option<ShouldCacheFn<V>>,
    ) -> Result<Vec<V>, CacheError> {
        self.require_configured()?;
        let (backend, default_expiration) = {
            let configured = self.configured.read();
            let c = configured.as_ref().unwrap();
            (Arc::clone(&c.backend), c.expiration_time)
        };
        let expiration = expiration_override.unwrap_or(default_expiration);
        let now = now_secs();
        let invalidation = *self.invalidation.read();

        let mangled: Vec<String> = keys.iter().map(|k| self.mangle(k)).collect();
        // A per-key deserialization failure already comes back as
        // `None` from `get_multi` (see `CacheBackend::get_multi`'s
        // default implementation), so no recovery is needed here.
        let envelopes = backend.get_multi(&mangled)?;

        let mut results: Vec<Option<V>> = vec![None; keys.len()];
        let mut needs_regen: Vec<usize> = Vec::new();

        for (i, envelope) in envelopes.into_iter().enumerate() {
            let invalidated_away = envelope.as_ref().is_some_and(|env| {
                env.is_usable()
                    && invalidation.is_some_and(|inv| env.created_at() < inv.timestamp)
            });
            let hard_blocked = invalidated_away && invalidation.is_some_and(|inv| inv.hard);

            match envelope {
                Some(env) if env.is_usable() && !hard_blocked => {
                    let fresh = !invalidated_away && expiration.is_fresh(now - env.created_at());
                    if fresh {
                        results[i] = Some(env.into_payload());
                    } else {
                        // stale: remember the value in case no lock is
                        // available for it, but still a regen candidate.
                        results[i] = Some(env.into_payload());
                        needs_regen.push(i);
                    }
                }
                _ => needs_regen.push(i),
            }
        }

        // Just-in-time, sorted-key lock acquisition.
        let mut ordered = needs_regen.clone();
        ordered.sort_by(|&a, &b| mangled[a].cmp(&mangled[b]));

        let mut owned_indices = Vec::new();
        let mut owned_keys = Vec::new();
        let mut held_mutexes = Vec::new();

        for i in ordered {
            let mutex = backend.get_mutex(&mangled[i]);
            if mutex.try_acquire() {
                owned_indices.push(i);
                owned_keys.push(keys[i].clone());
                held_mutexes.push(mutex);
            } else if results[i].is_none() {
                // missing and contended: block for it rather than
                // silently dropping the key from the result set.
                mutex.acquire();
                if let Some(env) = recover_deserialize(backend.get(&mangled[i]))? {
                    if env.is_usable() && expiration.is_fresh(now - env.created_at()) {
                        results[i] = Some(env.into_payload());
                        mutex.release();
                        continue;
                    }
                }
                owned_indices.push(i);
                owned_keys.push(keys[i].clone());
                held_mutexes.push(mutex);
            }
            // else: stale value already in `results[i]`, lock held
            // elsewhere - return it as-is.
        }

        if !owned_indices.is_empty() {
            let created = match creator(&owned_keys) {
                Ok(created) => created,
                Err(err) => {
                    info!(%err, "creator failed during get_or_create_multi");
                    for mutex in &held_mutexes {
                        mutex.release();
                    }
                    return Err(err);
                }
            };
            if created.len() != owned_indices.len() {
                for mutex in &held_mutexes {
                    mutex.release();
                }
                return Err(CacheError::Creator(format!(
                    "creator returned {} values for {} requested keys",
                    created.len(),
                    owned_indices.len()
                )));
            }

            let mut pairs = Vec::with_capacity(owned_indices.len());
            for (&i, value) in owned_indices.iter().zip(created.into_iter()) {
                let should_store = should_cache.as_ref().map_or(true, |f| f(&value));
                if should_store {
                    pairs.push((mangled[i].clone(), CachedValue::new(value.clone(), now)));
                }
                results[i] = Some(value);
            }
            if !pairs.is_empty() {
                backend.set_multi(pairs)?;
            }
            for mutex in held_mutexes {
                mutex.release();
            }
        }

        Ok(results
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.unwrap_or_else(|| panic!("key at index {i} was never resolved")))
            .collect())
    }

    /// Build a [`CachedFunction`] that caches through this region under
    /// `identity`. Requires the region to already be held behind an
    /// `Arc`, the same way the original project's decorator closes
    /// over the region it is attached to.
    pub fn cache_on_arguments(self: &Arc<Self>, identity: FunctionIdentity) -> CachedFunction<V> {
        CachedFunction::new(Arc::clone(self), identity)
    }

    /// Build a [`CachedMultiFunction`] that batches caching through
    /// this region under `identity`.
    pub fn cache_multi_on_arguments(
        self: &Arc<Self>,
        identity: FunctionIdentity,
    ) -> CachedMultiFunction<V> {
        CachedMultiFunction::new(Arc::clone(self), identity)
    }
}

/// Adapts one `get_or_create` call's backend + creator + invalidation
/// state into the [`DogpileSource`] contract `dogpile-lock` operates
/// on.
struct RegionSource<V> {
    backend: Arc<dyn CacheBackend<V>>,
    key: String,
    /// Hard-invalidated: report no value at all, forcing the
    /// coordinator down its synchronous, no-stale-fallback path.
    hard_blocked: bool,
    creator: Box<dyn FnMut() -> Result<V, CacheError> + Send>,
    should_cache: Option<ShouldCacheFn<V>>,
    now: f64,
}

impl<V: Clone + Send + Sync + 'static> DogpileSource<V> for RegionSource<V> {
    type Error = CacheError;

    fn current(&mut self) -> Result<Option<(V, f64)>, CacheError> {
        if self.hard_blocked {
            return Ok(None);
        }
        match recover_deserialize(self.backend.get(&self.key))? {
            Some(envelope) if envelope.is_usable() => {
                Ok(Some((envelope.payload().clone(), envelope.created_at())))
            }
            _ => Ok(None),
        }
    }

    fn regenerate(&mut self) -> Result<V, CacheError> {
        (self.creator)()
    }

    fn store(&mut self, value: &V) -> Result<(), CacheError> {
        let should_store = self.should_cache.as_ref().map_or(true, |f| f(value));
        if !should_store {
            return Ok(());
        }
        self.backend
            .set(&self.key, CachedValue::new(value.clone(), self.now))
    }
}
