//! The dogpile lock coordinator: mutexes, the name registry, the async
//! hand-off mechanism, and the three-outcome `get_or_create` protocol
//! they compose into.
//!
//! This crate has no notion of a cache backend or a cache key string -
//! it operates purely in terms of a [`coordinator::DogpileSource`]
//! closing over whatever storage the caller (`dogpile-cache`) provides.
//! That separation is what lets it be tested and reasoned about (and
//! reused) independent of any particular cache backend.

pub mod coordinator;
pub mod mutex;
pub mod registry;
pub mod runner;

pub use coordinator::{get_or_create, DogpileSource, Outcome};
pub use mutex::{DogpileMutex, InProcessMutex, MutexGuard, ReentrantKeyedMutex, SharedMutex};
pub use registry::NameRegistry;
pub use runner::{AsyncRunner, InlineRunner, ThreadSpawnRunner};
