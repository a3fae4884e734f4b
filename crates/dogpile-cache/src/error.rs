//! Cache-operation errors.
//!
//! Grounded on `edge-cache::fragment`'s `CacheError` thiserror enum,
//! generalized away from HTTP fragment concerns.

/// Errors a [`crate::region::CacheRegion`] or backend may surface.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The region this operation was called on has not been
    /// configured yet.
    #[error(transparent)]
    Config(#[from] dogpile_core::Error),

    /// A backend-level failure (connection, I/O, protocol) reported by
    /// the concrete backend implementation.
    #[error("backend error: {0}")]
    Backend(String),

    /// Encoding a value for storage failed. Always propagates: the
    /// caller's value could not be turned into bytes at all, so there
    /// is nothing sensible to cache.
    #[error("serialization error: {0}")]
    CantSerialize(String),

    /// Decoding a stored envelope failed. Treated as if the key held no
    /// value rather than as a hard error, since the bytes already
    /// written to the backend can't be un-corrupted by failing the
    /// caller's request; callers that hit this get a fresh value
    /// instead of an error.
    #[error("deserialization error: {0}")]
    CantDeserialize(String),

    /// The function-key generator was given a keyword argument, which
    /// is not supported in cache keys.
    #[error("keyword arguments are not supported in cache keys: {0}")]
    KeywordArgumentRejected(String),

    /// The creator function invoked during regeneration returned an
    /// error.
    #[error("creator function failed: {0}")]
    Creator(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
