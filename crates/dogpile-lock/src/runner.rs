//! The async hand-off mechanism: when a stale value is returned
//! immediately, regeneration can be handed to a background runner
//! instead of blocking the caller.
//!
//! No corpus module fit this (the WASM-oriented `edge-executor` crate
//! schedules DOM/HTML section ordering, not background tasks), so this
//! is authored fresh, in the idiom of a small trait plus one
//! `std::thread`-backed implementation - no `tokio` runtime is assumed
//! to exist, since this crate is synchronous throughout.

use std::panic::AssertUnwindSafe;

use tracing::{error, warn};

/// Submits a regeneration closure to run outside of the calling
/// thread.
///
/// Implementations must guarantee the submitted closure eventually
/// runs (or is dropped, logged, and the mutex it closes over released)
/// - a runner that silently swallows work would leave a key's mutex
/// held forever.
pub trait AsyncRunner: Send + Sync {
    /// Submit `job` to run asynchronously. `job` is responsible for
    /// releasing any mutex guard it has taken ownership of before it
    /// returns, on every exit path including panics.
    fn submit(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Spawns each submitted job on its own `std::thread`.
///
/// This is deliberately the simplest possible [`AsyncRunner`]: no
/// pooling, no queue depth limit. A production deployment wanting
/// bounded concurrency would supply its own [`AsyncRunner`] backed by
/// a thread pool; this crate doesn't mandate one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawnRunner;

impl AsyncRunner for ThreadSpawnRunner {
    fn submit(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        std::thread::spawn(move || {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(job)) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(%message, "async regeneration panicked");
            }
        });
    }
}

/// Runs every job inline, on the calling thread.
///
/// Grounded on the spec's explicit allowance that "async" hand-off is
/// an optional optimization: a deployment with no background runner
/// configured should degrade to synchronous regeneration rather than
/// losing the hand-off outcome entirely. Using this runner makes the
/// stale-return-with-async-handoff outcome behaviorally identical to
/// synchronous-regenerate, which is exactly the degrade-gracefully
/// behavior the coordinator should fall back to.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineRunner;

impl AsyncRunner for InlineRunner {
    fn submit(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        warn!("no background runner configured, running regeneration inline");
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn thread_spawn_runner_eventually_runs_the_job() {
        let ran = Arc::new(AtomicBool::new(false));
        let runner = ThreadSpawnRunner;
        let flag = Arc::clone(&ran);
        runner.submit(Box::new(move || flag.store(true, Ordering::SeqCst)));

        for _ in 0..100 {
            if ran.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("job never ran");
    }

    #[test]
    fn thread_spawn_runner_survives_a_panicking_job() {
        let runner = ThreadSpawnRunner;
        runner.submit(Box::new(|| panic!("boom")));
        // the runner itself shouldn't propagate the panic to this thread
    }

    #[test]
    fn inline_runner_runs_synchronously() {
        let runner = InlineRunner;
        let flag = Arc::new(AtomicBool::new(false));
        let flag2 = Arc::clone(&flag);
        runner.submit(Box::new(move || flag2.store(true, Ordering::SeqCst)));
        assert!(flag.load(Ordering::SeqCst));
    }
}
