//! Shared foundations for the dogpile cache-coordination workspace.
//!
//! This crate provides:
//! - [`CachedValue`] / [`Metadata`] - the value envelope stored by backends
//! - [`MaybeValue`] - the `NoValue` sentinel, distinct from a cached `null`
//! - [`Error`] - configuration-boundary errors shared across the workspace
//! - `config` - coercion of flat string configuration into typed values
//! - `expiration` - the expiration-time sentinel (`-1`/`0`/`None`)

pub mod config;
pub mod envelope;
pub mod error;
pub mod expiration;

pub use envelope::*;
pub use error::*;
