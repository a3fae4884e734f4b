//! The cache value envelope and the `NoValue` sentinel.

use serde::{Deserialize, Serialize};

/// Current format version written into every [`Metadata`].
///
/// A stored envelope whose `version` does not match this constant is
/// treated as absent (Invariant 2 of the data model): callers should
/// never attempt to read `payload` out of a stale-format envelope.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Metadata carried alongside every cached payload.
///
/// `created_at` is seconds since the Unix epoch (not a [`std::time::
/// Instant`], since envelopes may be persisted and compared across
/// process restarts by a backend).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Creation time, seconds since the Unix epoch.
    pub created_at: f64,
    /// Format version this envelope was written with.
    pub version: u32,
}

impl Metadata {
    /// Build metadata stamped with the current time and format version.
    pub fn now(created_at: f64) -> Self {
        Self {
            created_at,
            version: CURRENT_FORMAT_VERSION,
        }
    }

    /// Whether this envelope's format version matches what we can read.
    pub fn is_current_version(&self) -> bool {
        self.version == CURRENT_FORMAT_VERSION
    }
}

/// A value stored in the cache: `(payload, metadata)`.
///
/// Mirrors `dogpile.cache.api.CachedValue`, a two-tuple of payload and
/// tracking metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue<T> {
    payload: T,
    metadata: Metadata,
}

impl<T> CachedValue<T> {
    /// Wrap a payload with metadata stamped at `created_at`.
    pub fn new(payload: T, created_at: f64) -> Self {
        Self {
            payload,
            metadata: Metadata::now(created_at),
        }
    }

    /// Wrap a payload with explicit metadata (used when a backend
    /// round-trips a previously stored envelope).
    pub fn with_metadata(payload: T, metadata: Metadata) -> Self {
        Self { payload, metadata }
    }

    /// Borrow the payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consume the envelope, returning the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// The envelope's metadata.
    pub fn metadata(&self) -> Metadata {
        self.metadata
    }

    /// Creation time, seconds since the Unix epoch.
    pub fn created_at(&self) -> f64 {
        self.metadata.created_at
    }

    /// Age in seconds relative to `now`.
    pub fn age(&self, now: f64) -> f64 {
        (now - self.metadata.created_at).max(0.0)
    }

    /// Whether this envelope is still current-format and thus usable.
    pub fn is_usable(&self) -> bool {
        self.metadata.is_current_version()
    }
}

/// Describes a missing cache value, distinct from a cached `null`.
///
/// Mirrors `dogpile.cache.api.NO_VALUE`: a value that is falsy but not
/// the same thing as a stored `None`/`null` payload. Rust has no duck
/// typing, so this is an explicit two-variant enum rather than a
/// singleton sentinel object.
#[derive(Debug, Clone, PartialEq)]
pub enum MaybeValue<T> {
    /// No value was present for the requested key.
    NoValue,
    /// A value was present (it may itself be a "null"-like `T`, e.g.
    /// `serde_json::Value::Null` - that is still distinct from `NoValue`).
    Value(T),
}

impl<T> MaybeValue<T> {
    /// True if this holds a value (the Python idiom's "truthy" case).
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// True if this is the `NoValue` sentinel.
    pub fn is_no_value(&self) -> bool {
        matches!(self, Self::NoValue)
    }

    /// Convert to `Option<T>`, collapsing `NoValue` to `None`.
    ///
    /// Note this is lossy if `T` itself can represent "no value" in a
    /// different way (e.g. `Option<U>`); use pattern matching directly
    /// when that distinction matters.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::NoValue => None,
            Self::Value(v) => Some(v),
        }
    }

    /// Borrow the value, if present.
    pub fn as_ref(&self) -> MaybeValue<&T> {
        match self {
            Self::NoValue => MaybeValue::NoValue,
            Self::Value(v) => MaybeValue::Value(v),
        }
    }

    /// Map the contained value, if present.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MaybeValue<U> {
        match self {
            Self::NoValue => MaybeValue::NoValue,
            Self::Value(v) => MaybeValue::Value(f(v)),
        }
    }
}

impl<T> From<Option<T>> for MaybeValue<T> {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => Self::Value(v),
            None => Self::NoValue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_value_is_distinct_from_cached_null() {
        let cached_null: MaybeValue<Option<String>> = MaybeValue::Value(None);
        let absent: MaybeValue<Option<String>> = MaybeValue::NoValue;

        assert!(cached_null.is_value());
        assert!(absent.is_no_value());
        assert_ne!(cached_null, absent);
    }

    #[test]
    fn version_fence_marks_stale_envelope_unusable() {
        let mut envelope = CachedValue::new("v1", 100.0);
        assert!(envelope.is_usable());

        envelope = CachedValue::with_metadata(
            "v1",
            Metadata {
                created_at: 100.0,
                version: CURRENT_FORMAT_VERSION + 1,
            },
        );
        assert!(!envelope.is_usable());
    }

    #[test]
    fn age_is_relative_to_supplied_now() {
        let envelope = CachedValue::new("x", 100.0);
        assert_eq!(envelope.age(130.0), 30.0);
        // clock skew shouldn't produce a negative age
        assert_eq!(envelope.age(90.0), 0.0);
    }
}
