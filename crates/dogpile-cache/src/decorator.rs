//! `cache_on_arguments` / `cache_multi_on_arguments`, expressed as
//! explicit wrapper structs rather than a procedural-macro attribute.
//!
//! The original project implements these as Python decorators, which
//! has no direct Rust analog; a proc macro could paper over the
//! syntactic gap, but this workspace deliberately doesn't carry one.
//! `CachedFunction` is instead a small struct that owns the
//! function identity and wraps any `Fn(Args) -> V` closure, composing
//! with `CacheRegion::get_or_create` the same way the Python decorator
//! composes with the region it's attached to.

use std::sync::Arc;

use dogpile_core::envelope::MaybeValue;
use dogpile_core::expiration::ExpirationTime;

use crate::error::CacheError;
use crate::key::{function_key, function_multi_key, FunctionIdentity, RenderedArg};
use crate::region::{CacheRegion, ShouldCacheFn};

/// Wraps a single-argument-set function with caching through a
/// [`CacheRegion`].
///
/// `Args` is typically a tuple of the function's rendered argument
/// strings; callers are responsible for rendering their own arguments
/// (there is no reflection in Rust to do this automatically), same as
/// they are responsible for supplying a `FunctionIdentity`.
pub struct CachedFunction<V> {
    region: Arc<CacheRegion<V>>,
    identity: FunctionIdentity,
    namespace: String,
    expiration_override: Option<ExpirationTime>,
    should_cache: Option<ShouldCacheFn<V>>,
}

impl<V> CachedFunction<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(region: Arc<CacheRegion<V>>, identity: FunctionIdentity) -> Self {
        Self {
            region,
            identity,
            namespace: String::new(),
            expiration_override: None,
            should_cache: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_expiration(mut self, expiration: ExpirationTime) -> Self {
        self.expiration_override = Some(expiration);
        self
    }

    pub fn with_should_cache(mut self, should_cache: ShouldCacheFn<V>) -> Self {
        self.should_cache = Some(should_cache);
        self
    }

    /// Call `function` through the cache, keyed on `args`'s rendered
    /// form.
    pub fn call(
        &self,
        args: &[RenderedArg],
        function: impl FnMut() -> Result<V, CacheError> + Send + 'static,
    ) -> Result<V, CacheError> {
        let key = function_key(&self.identity, &self.namespace, args, &[])?;
        self.region.get_or_create(
            &key,
            function,
            self.expiration_override,
            self.should_cache.clone(),
        )
    }

    /// Invalidate the entry this function would have produced for
    /// `args`, without calling it.
    pub fn invalidate_args(&self, args: &[RenderedArg]) -> Result<(), CacheError> {
        let key = function_key(&self.identity, &self.namespace, args, &[])?;
        self.region.delete(&key)
    }

    /// Store `value` directly under the key `args` would have produced,
    /// bypassing the creator entirely.
    pub fn set(&self, args: &[RenderedArg], value: V) -> Result<(), CacheError> {
        let key = function_key(&self.identity, &self.namespace, args, &[])?;
        self.region.set(&key, value)
    }

    /// Fetch the entry this function would have produced for `args`
    /// without triggering regeneration.
    pub fn get(&self, args: &[RenderedArg]) -> Result<MaybeValue<V>, CacheError> {
        let key = function_key(&self.identity, &self.namespace, args, &[])?;
        self.region.get(&key)
    }

    /// Force `function` to run regardless of what is currently cached,
    /// and store its result as if it had come from a normal `call`.
    pub fn refresh(
        &self,
        args: &[RenderedArg],
        function: impl FnOnce() -> Result<V, CacheError>,
    ) -> Result<V, CacheError> {
        let key = function_key(&self.identity, &self.namespace, args, &[])?;
        let value = function()?;
        self.region.set(&key, value.clone())?;
        Ok(value)
    }
}

/// Wraps a multi-argument-set function with batched caching through a
/// [`CacheRegion`].
pub struct CachedMultiFunction<V> {
    region: Arc<CacheRegion<V>>,
    identity: FunctionIdentity,
    namespace: String,
    expiration_override: Option<ExpirationTime>,
    should_cache: Option<ShouldCacheFn<V>>,
}

impl<V> CachedMultiFunction<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(region: Arc<CacheRegion<V>>, identity: FunctionIdentity) -> Self {
        Self {
            region,
            identity,
            namespace: String::new(),
            expiration_override: None,
            should_cache: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_expiration(mut self, expiration: ExpirationTime) -> Self {
        self.expiration_override = Some(expiration);
        self
    }

    /// Call `function` through the cache for every argument set in
    /// `arg_sets`, batching regeneration of whichever ones are missing
    /// or stale into a single call to `function`.
    pub fn call(
        &self,
        arg_sets: &[Vec<RenderedArg>],
        function: impl FnOnce(&[String]) -> Result<Vec<V>, CacheError>,
    ) -> Result<Vec<V>, CacheError> {
        let keys = function_multi_key(&self.identity, &self.namespace, arg_sets, &[])?;
        self.region.get_or_create_multi(
            &keys,
            function,
            self.expiration_override,
            self.should_cache.clone(),
        )
    }
}
