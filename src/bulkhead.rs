//! Bulkhead for concurrency limiting.
//!
//! A plain atomic in-flight counter: admission is a compare-and-swap
//! increment against an immutable maximum, release an unconditional
//! decrement. No queueing; calls beyond the limit are rejected outright.

use crate::hooks::Hooks;
use crate::ResilienceError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Concurrency cap over a shared resource.
#[derive(Debug)]
pub struct Bulkhead {
    in_flight: AtomicUsize,
    max: usize,
    hooks: Hooks,
}

impl Bulkhead {
    pub fn new(max: usize) -> Self {
        Self { in_flight: AtomicUsize::new(0), max, hooks: Hooks::default() }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Attempt to claim a slot. Every successful call must be paired with
    /// exactly one [`Bulkhead::release`].
    pub fn try_acquire(&self) -> bool {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                tracing::debug!(in_flight = current, max = self.max, "bulkhead rejected call");
                self.hooks.bulkhead_full();
                return false;
            }
            match self.in_flight.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.hooks.bulkhead_acquired();
                    return true;
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Return a previously acquired slot.
    pub fn release(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.hooks.bulkhead_released();
    }

    /// Whether every slot is taken.
    pub fn is_full(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) >= self.max
    }

    /// Current number of in-flight calls.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Configured maximum concurrency.
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Run an operation inside the bulkhead. The slot is released on every
    /// exit path, including panics, via a drop guard.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        if !self.try_acquire() {
            return Err(ResilienceError::Bulkhead {
                in_flight: self.in_flight.load(Ordering::Acquire),
                max: self.max,
            });
        }
        let _slot = ReleaseGuard(self);
        operation().await
    }
}

struct ReleaseGuard<'a>(&'a Bulkhead);

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
