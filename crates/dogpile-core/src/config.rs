//! Flat-string configuration coercion.
//!
//! A `CacheRegion` is typically configured from a flat, string-valued
//! dictionary such as:
//!
//! ```text
//! mycache.backend          = memory
//! mycache.expiration_time  = 300
//! mycache.arguments.url    = localhost:11211
//! mycache.arguments.pool   = 10
//! ```
//!
//! This module turns the raw strings into typed [`ConfigValue`]s and
//! groups a dotted prefix's `backend`/`expiration_time`/`arguments.*`
//! keys into a [`RegionConfig`].

use std::collections::BTreeMap;

use crate::Error;

/// A coerced configuration value.
///
/// Grounded in `dogpile/cache/util.py`'s `to_list` helper (lists are a
/// first-class config shape, coerced from comma-separated strings) and
/// the region-configuration docstrings describing int/float/bool/None
/// coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<String>),
    Str(String),
}

impl ConfigValue {
    /// Coerce a raw string into the most specific type it matches.
    ///
    /// Order matters: bool/none literals are checked before falling
    /// back to numeric parsing so that e.g. `"true"` isn't mistaken for
    /// a malformed number, and a comma anywhere in the string forces a
    /// list interpretation (each element recursively *not* re-coerced -
    /// list elements stay strings, matching `to_list`'s behavior of
    /// wrapping scalars/splitting strings without recursing further).
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();

        if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("null") {
            return Self::None;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if trimmed.contains(',') {
            return Self::List(
                trimmed
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Str(trimmed.to_string())
    }

    /// Interpret this value as a list, matching `to_list`'s behavior of
    /// wrapping a bare scalar in a single-element list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            Self::None => Vec::new(),
            Self::Str(s) => vec![s.clone()],
            Self::Int(i) => vec![i.to_string()],
            Self::Float(f) => vec![f.to_string()],
            Self::Bool(b) => vec![b.to_string()],
        }
    }
}

/// The subset of a region's configuration that comes from a flat dict
/// under a chosen prefix.
#[derive(Debug, Clone, Default)]
pub struct RegionConfig {
    /// `<prefix>.backend`
    pub backend: Option<String>,
    /// `<prefix>.expiration_time` (raw numeric seconds, pre-parsing
    /// into an `ExpirationTime`, since the region decides what the
    /// `-1`/`0`/absent sentinels resolve to).
    pub expiration_time: Option<f64>,
    /// `<prefix>.arguments.<name>`, passed through to the backend
    /// constructor verbatim.
    pub arguments: BTreeMap<String, ConfigValue>,
    /// `<prefix>.wrap`, a list of proxy names to apply left-to-right.
    pub wrap: Vec<String>,
}

impl RegionConfig {
    /// Extract `<prefix>.*` keys out of a flat configuration map.
    pub fn from_prefixed_map(
        dict: &BTreeMap<String, String>,
        prefix: &str,
    ) -> Result<Self, Error> {
        let dotted_prefix = format!("{prefix}.");
        let mut config = RegionConfig::default();

        for (key, raw_value) in dict {
            let Some(suffix) = key.strip_prefix(&dotted_prefix) else {
                continue;
            };

            if suffix == "backend" {
                config.backend = Some(raw_value.clone());
            } else if suffix == "expiration_time" {
                let parsed = raw_value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| Error::BadExpiration(raw_value.clone()))?;
                config.expiration_time = Some(parsed);
            } else if suffix == "wrap" {
                config.wrap = ConfigValue::coerce(raw_value).to_list();
            } else if let Some(arg_name) = suffix.strip_prefix("arguments.") {
                config
                    .arguments
                    .insert(arg_name.to_string(), ConfigValue::coerce(raw_value));
            }
        }

        Ok(config)
    }
}
