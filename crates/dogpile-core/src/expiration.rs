//! The expiration-time sentinel:
//!
//! - a non-negative number of seconds is a normal TTL
//! - `-1` means "never expires"
//! - `0` means "always regenerate"
//! - absent/`None` means "defer to the region's default"

use crate::Error;

/// A resolved expiration policy for a single `Lock`/operation.
///
/// Unlike the raw `Option<f64>` the public API accepts, this type has
/// already had "defer to region default" resolved away - it is either
/// `Never`, `Immediate`, or a concrete number of seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExpirationTime {
    /// `-1`: the value never expires.
    Never,
    /// `0`: every access regenerates.
    Immediate,
    /// A positive number of seconds.
    After(f64),
}

impl ExpirationTime {
    /// Parse a raw expiration-time number against the sentinels above.
    ///
    /// `None` is rejected here deliberately - resolving "defer to region
    /// default" is the caller's job (it needs a region to defer to).
    pub fn from_seconds(seconds: f64) -> Result<Self, Error> {
        if seconds == -1.0 {
            Ok(Self::Never)
        } else if seconds == 0.0 {
            Ok(Self::Immediate)
        } else if seconds > 0.0 && seconds.is_finite() {
            Ok(Self::After(seconds))
        } else {
            Err(Error::BadExpiration(seconds.to_string()))
        }
    }

    /// Resolve an optional per-call override against a region default,
    /// both already-parsed.
    pub fn resolve(override_value: Option<ExpirationTime>, region_default: ExpirationTime) -> Self {
        override_value.unwrap_or(region_default)
    }

    /// Whether a value created `age` seconds ago is still fresh.
    pub fn is_fresh(&self, age: f64) -> bool {
        match self {
            Self::Never => true,
            Self::Immediate => false,
            Self::After(secs) => age <= *secs,
        }
    }
}
