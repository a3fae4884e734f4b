//! Facade over the dogpile workspace: one crate an application depends
//! on instead of wiring up `dogpile-core` + `dogpile-lock` +
//! `dogpile-cache` itself.
//!
//! Grounded on `edge_sdk::lib`'s facade-plus-prelude shape: re-export
//! the pieces a caller actually needs to hold onto (`CacheRegion`,
//! the error types, the async runners) and group the common combo in
//! [`prelude`].

pub use dogpile_cache::{
    BytesBackend, CacheBackend, CacheError, CachedFunction, CachedMultiFunction, FunctionIdentity,
    JsonCodec, ProxyBackend, ProxyFactory, CacheRegion, ShouldCacheFn,
};
pub use dogpile_core::config::{ConfigValue, RegionConfig};
pub use dogpile_core::expiration::ExpirationTime;
pub use dogpile_core::{CachedValue, Error as CoreError, MaybeValue, Metadata};
pub use dogpile_lock::{
    AsyncRunner, DogpileMutex, InProcessMutex, InlineRunner, NameRegistry, ReentrantKeyedMutex,
    SharedMutex, ThreadSpawnRunner,
};

/// The common set of imports an application wiring up a cache region
/// typically needs.
pub mod prelude {
    pub use crate::{
        CacheBackend, CacheError, CacheRegion, CachedFunction, CachedValue, ExpirationTime,
        FunctionIdentity, MaybeValue, ShouldCacheFn, ThreadSpawnRunner,
    };
}
