//! Timeout policy for bounding async operation duration.
//!
//! Semantics
//! - Wraps an async operation and returns `ResilienceError::Timeout` when the
//!   deadline elapses.
//! - Uses `tokio::time::timeout`; on expiry the inner future is dropped, which
//!   releases every layer it owns. Cancellation-unsafe work may leave partial
//!   state; prefer cancellation-safe primitives if that matters.
//! - When the caller drops the composed future (its own deadline or shutdown),
//!   this layer is dropped with it before any sentinel is produced, so a
//!   locally-generated `Timeout` never masks outer cancellation.
//! - `elapsed` is measured from just before invoking the operation and can
//!   slightly exceed the configured duration due to scheduling overhead.

use crate::hooks::Hooks;
use crate::ResilienceError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Policy that enforces a maximum duration on async operations.
///
/// A zero duration is permitted and times out on the first poll.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    duration: Duration,
    hooks: Hooks,
}

impl TimeoutPolicy {
    pub fn new(duration: Duration) -> Self {
        Self { duration, hooks: Hooks::default() }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the configured timeout duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Execute an operation under the timeout.
    ///
    /// Returns the operation's result verbatim when it finishes in time, and
    /// `ResilienceError::Timeout { elapsed, timeout }` otherwise.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let start = Instant::now();
        match tokio::time::timeout(self.duration, operation()).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = start.elapsed();
                tracing::debug!(?elapsed, timeout = ?self.duration, "operation timed out");
                self.hooks.timeout();
                Err(ResilienceError::Timeout { elapsed, timeout: self.duration })
            }
        }
    }
}
