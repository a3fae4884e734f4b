//! The Lock Coordinator: the three-outcome dogpile protocol that
//! `CacheRegion::get_or_create` is built on.
//!
//! Grounded directly on `edge-cache::fragment::FragmentCache::
//! get_or_compute` - its `CacheStatus::{Hit, Miss, Stale, Bypass,
//! Error}` outcome enum and its `backend.try_lock(&lock_key,
//! self.lock_ttl)` / fall-back-to-stale-on-lock-miss control flow is
//! the same shape this module generalizes away from HTTP fragments
//! into a generic `T`, cross-checked against the original project's
//! `test_threaded_dogpile` / `test_reentrant_dogpile` fixtures for the
//! exact lock-acquisition and double-check semantics.

use tracing::{debug, trace};

use dogpile_core::expiration::ExpirationTime;

use crate::mutex::{MutexGuard, SharedMutex};
use crate::runner::AsyncRunner;

/// What the coordinator decided to do, and the value it produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The stored value was already fresh; returned without touching
    /// the mutex at all.
    Fresh(T),
    /// This caller acquired the mutex and regenerated the value
    /// synchronously before returning it.
    Regenerated(T),
    /// A stale value (or no value) was returned immediately while
    /// regeneration proceeds elsewhere - either because this caller
    /// couldn't acquire the mutex (someone else is already
    /// regenerating), or because an [`AsyncRunner`] was handed the
    /// regeneration job to run in the background.
    Stale(T),
}

impl<T> Outcome<T> {
    /// Unwrap to the produced value regardless of which outcome it was.
    pub fn into_value(self) -> T {
        match self {
            Self::Fresh(v) | Self::Regenerated(v) | Self::Stale(v) => v,
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Fresh(v) | Self::Regenerated(v) | Self::Stale(v) => v,
        }
    }
}

/// The value-store side of the dogpile protocol: everything the
/// coordinator needs to read and (re)write a single key's cached
/// value, independent of how that storage is actually implemented.
///
/// `dogpile-cache`'s `CacheRegion` implements this per-call by closing
/// over its backend and key; keeping it as a trait here (rather than
/// hard-coding a backend type) is what lets `dogpile-lock` stay free
/// of any dependency on `dogpile-cache`.
pub trait DogpileSource<T> {
    type Error;

    /// The currently stored value and its creation time (seconds since
    /// the Unix epoch), or `None` if nothing is stored for this key.
    fn current(&mut self) -> Result<Option<(T, f64)>, Self::Error>;

    /// Compute a fresh value. Called at most once per synchronous or
    /// asynchronous regeneration.
    fn regenerate(&mut self) -> Result<T, Self::Error>;

    /// Persist a freshly regenerated value.
    fn store(&mut self, value: &T) -> Result<(), Self::Error>;
}

/// Run the dogpile protocol for one `get_or_create` call.
///
/// `now` is the caller's notion of the current time (seconds since the
/// Unix epoch), threaded in explicitly so the coordinator has no
/// hidden `SystemTime::now()` dependency and stays deterministically
/// testable.
///
/// `async_runner` is consulted only on the stale-and-acquired path; if
/// `None`, that path regenerates synchronously instead (identical to
/// the fully-synchronous path but reached from "was stale" rather than
/// "had no value").
pub fn get_or_create<T, S>(
    mutex: &SharedMutex,
    expiration: ExpirationTime,
    now: f64,
    mut source: S,
    async_runner: Option<&dyn AsyncRunner>,
) -> Result<Outcome<T>, S::Error>
where
    T: Clone + Send + 'static,
    S: DogpileSource<T> + Send + 'static,
{
    let current = source.current()?;

    match current {
        None => {
            // No value at all: everyone must wait for a creator, since
            // there is nothing to fall back to. Try non-blocking first
            // so the common case (no contention) avoids ever blocking.
            if mutex.try_acquire() {
                trace!("no value present, acquired mutex, regenerating");
                let guard = MutexGuard::new(mutex.as_ref());
                let value = source.regenerate()?;
                source.store(&value)?;
                guard.into_released();
                Ok(Outcome::Regenerated(value))
            } else {
                debug!("no value present and mutex held elsewhere, blocking");
                mutex.acquire();
                let guard = MutexGuard::new(mutex.as_ref());
                // Double-check: the holder we waited on may have
                // already populated the value.
                if let Some((value, created_at)) = source.current()? {
                    if expiration.is_fresh(now - created_at) {
                        guard.into_released();
                        return Ok(Outcome::Fresh(value));
                    }
                }
                let value = source.regenerate()?;
                source.store(&value)?;
                guard.into_released();
                Ok(Outcome::Regenerated(value))
            }
        }
        Some((value, created_at)) => {
            if expiration.is_fresh(now - created_at) {
                return Ok(Outcome::Fresh(value));
            }

            if mutex.try_acquire() {
                let guard = MutexGuard::new(mutex.as_ref());
                // Double-check under the lock: another regenerator may
                // have just finished.
                if let Some((fresher, fresher_created_at)) = source.current()? {
                    if expiration.is_fresh(now - fresher_created_at) {
                        guard.into_released();
                        return Ok(Outcome::Fresh(fresher));
                    }
                }

                match async_runner {
                    Some(runner) => {
                        debug!("stale value, acquired mutex, handing off regeneration");
                        // The background job owns releasing the lock;
                        // disarm this guard so it doesn't double-release.
                        guard.disarm();
                        let stale = value.clone();
                        let mutex_for_release = std::sync::Arc::clone(mutex);
                        runner.submit(Box::new(move || {
                            let outcome = (|| -> Result<(), S::Error> {
                                let regenerated = source.regenerate()?;
                                source.store(&regenerated)
                            })();
                            if let Err(_err) = outcome {
                                trace!("background regeneration failed");
                            }
                            mutex_for_release.release();
                        }));
                        Ok(Outcome::Stale(stale))
                    }
                    None => {
                        trace!("stale value, acquired mutex, regenerating synchronously");
                        let value = source.regenerate()?;
                        source.store(&value)?;
                        guard.into_released();
                        Ok(Outcome::Regenerated(value))
                    }
                }
            } else {
                trace!("stale value, mutex held elsewhere, returning stale");
                Ok(Outcome::Stale(value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::{DogpileMutex, InProcessMutex};
    use crate::runner::InlineRunner;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    fn in_process_mutex() -> SharedMutex {
        Arc::new(InProcessMutex::new())
    }

    struct TestSource {
        store: Arc<StdMutex<Option<(i32, f64)>>>,
        regenerate_calls: Arc<AtomicUsize>,
        next_value: i32,
        now: f64,
    }

    impl DogpileSource<i32> for TestSource {
        type Error = std::convert::Infallible;

        fn current(&mut self) -> Result<Option<(i32, f64)>, Self::Error> {
            Ok(*self.store.lock().unwrap())
        }

        fn regenerate(&mut self) -> Result<i32, Self::Error> {
            self.regenerate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_value)
        }

        fn store(&mut self, value: &i32) -> Result<(), Self::Error> {
            *self.store.lock().unwrap() = Some((*value, self.now));
            Ok(())
        }
    }

    #[test]
    fn fresh_value_short_circuits_without_touching_mutex() {
        let mutex = in_process_mutex();
        let store = Arc::new(StdMutex::new(Some((42, 100.0))));
        let source = TestSource {
            store,
            regenerate_calls: Arc::new(AtomicUsize::new(0)),
            next_value: 99,
            now: 100.0,
        };

        let outcome =
            get_or_create(&mutex, ExpirationTime::After(60.0), 110.0, source, None).unwrap();

        assert_eq!(outcome, Outcome::Fresh(42));
        assert!(mutex.try_acquire(), "mutex must not still be held");
    }

    #[test]
    fn missing_value_regenerates_synchronously() {
        let mutex = in_process_mutex();
        let store = Arc::new(StdMutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));
        let source = TestSource {
            store: Arc::clone(&store),
            regenerate_calls: Arc::clone(&calls),
            next_value: 7,
            now: 100.0,
        };

        let outcome =
            get_or_create(&mutex, ExpirationTime::After(60.0), 100.0, source, None).unwrap();

        assert_eq!(outcome, Outcome::Regenerated(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.lock().unwrap().unwrap().0, 7);
        assert!(mutex.try_acquire(), "mutex must be released afterward");
    }

    #[test]
    fn stale_value_with_lock_held_elsewhere_returns_stale_immediately() {
        let mutex = in_process_mutex();
        assert!(mutex.try_acquire(), "simulate another regenerator holding it");

        let store = Arc::new(StdMutex::new(Some((1, 0.0))));
        let calls = Arc::new(AtomicUsize::new(0));
        let source = TestSource {
            store,
            regenerate_calls: Arc::clone(&calls),
            next_value: 2,
            now: 1000.0,
        };

        let outcome =
            get_or_create(&mutex, ExpirationTime::After(60.0), 1000.0, source, None).unwrap();

        assert_eq!(outcome, Outcome::Stale(1));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "should not regenerate without the lock");
        mutex.release();
    }

    #[test]
    fn stale_value_with_async_runner_returns_stale_and_updates_in_background() {
        let mutex = in_process_mutex();
        let store = Arc::new(StdMutex::new(Some((1, 0.0))));
        let calls = Arc::new(AtomicUsize::new(0));
        let source = TestSource {
            store: Arc::clone(&store),
            regenerate_calls: Arc::clone(&calls),
            next_value: 2,
            now: 1000.0,
        };
        let runner = crate::runner::ThreadSpawnRunner;

        let outcome = get_or_create(
            &mutex,
            ExpirationTime::After(60.0),
            1000.0,
            source,
            Some(&runner),
        )
        .unwrap();

        assert_eq!(outcome, Outcome::Stale(1));

        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.lock().unwrap().unwrap().0, 2);
    }

    #[test]
    fn inline_runner_makes_async_handoff_behave_like_synchronous_regeneration() {
        let mutex = in_process_mutex();
        let store = Arc::new(StdMutex::new(Some((1, 0.0))));
        let calls = Arc::new(AtomicUsize::new(0));
        let source = TestSource {
            store: Arc::clone(&store),
            regenerate_calls: Arc::clone(&calls),
            next_value: 2,
            now: 1000.0,
        };
        let runner = InlineRunner;

        let outcome = get_or_create(
            &mutex,
            ExpirationTime::After(60.0),
            1000.0,
            source,
            Some(&runner),
        )
        .unwrap();

        assert_eq!(outcome, Outcome::Stale(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.lock().unwrap().unwrap().0, 2);
    }

    struct FailingSource {
        store: Arc<StdMutex<Option<(i32, f64)>>>,
        attempts: Arc<AtomicUsize>,
    }

    impl DogpileSource<i32> for FailingSource {
        type Error = &'static str;

        fn current(&mut self) -> Result<Option<(i32, f64)>, Self::Error> {
            Ok(*self.store.lock().unwrap())
        }

        fn regenerate(&mut self) -> Result<i32, Self::Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err("creator blew up")
        }

        fn store(&mut self, value: &i32) -> Result<(), Self::Error> {
            *self.store.lock().unwrap() = Some((*value, 1000.0));
            Ok(())
        }
    }

    #[test]
    fn async_handoff_releases_the_mutex_even_when_the_creator_errors() {
        let mutex = in_process_mutex();
        let store = Arc::new(StdMutex::new(Some((1, 0.0))));
        let attempts = Arc::new(AtomicUsize::new(0));
        let source = FailingSource {
            store: Arc::clone(&store),
            attempts: Arc::clone(&attempts),
        };
        let runner = crate::runner::ThreadSpawnRunner;

        let outcome = get_or_create(
            &mutex,
            ExpirationTime::After(60.0),
            1000.0,
            source,
            Some(&runner),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::Stale(1));

        for _ in 0..200 {
            if attempts.load(Ordering::SeqCst) == 1 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        // The background job released the mutex despite the creator's
        // error, so a fresh acquire must succeed.
        for _ in 0..200 {
            if mutex.try_acquire() {
                mutex.release();
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        panic!("mutex was never released after background regeneration failed");
    }
}
