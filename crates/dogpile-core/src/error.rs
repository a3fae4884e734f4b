//! Configuration-boundary errors, shared across the workspace so
//! `dogpile-lock` and `dogpile-cache` don't each redefine
//! `UnconfiguredRegion`/`AlreadyConfigured`/`UnknownBackend`.

/// Errors raised while configuring or looking up a region's backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation that requires `configure()` to have run was called
    /// on an unconfigured region.
    #[error("cache region has not been configured")]
    UnconfiguredRegion,

    /// `configure()` was called a second time.
    #[error("cache region is already configured")]
    AlreadyConfigured,

    /// `configure()`/`configure_from_config()` named a backend that
    /// has not been registered.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// `configure_from_config()`'s `wrap` list named a proxy that has
    /// not been registered.
    #[error("unknown proxy: {0}")]
    UnknownProxy(String),

    /// An `expiration_time` configuration value could not be parsed,
    /// or was negative without being the `-1` ("never expires") sentinel.
    #[error("invalid expiration_time: {0}")]
    BadExpiration(String),
}

/// Convenience alias for `Result<T, dogpile_core::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
