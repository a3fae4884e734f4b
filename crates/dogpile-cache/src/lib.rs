//! Cache-stampede prevention on top of [`dogpile_lock`]: the
//! `CacheRegion` front-end, the backend/proxy contract, and cache key
//! generation.
//!
//! This crate has no opinion on what a cache key's payload looks like
//! beyond `Clone + Send + Sync + 'static` - it is generic over `V` the
//! way `dogpile-lock` is generic over `T`. A concrete application
//! picks `V` (a struct, a `String`, a `serde_json::Value`, ...) and a
//! [`backend::CacheBackend<V>`] implementation.

pub mod backend;
pub mod decorator;
pub mod error;
pub mod key;
pub mod proxy;
pub mod region;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{BytesBackend, CacheBackend, JsonCodec};
pub use decorator::{CachedFunction, CachedMultiFunction};
pub use error::{CacheError, Result};
pub use key::{function_key, function_multi_key, FunctionIdentity};
pub use proxy::ProxyBackend;
pub use region::{CacheRegion, ProxyFactory, ShouldCacheFn};
