//! Pluggable wait primitive.
//!
//! Two patterns pace themselves by sleeping: retry between attempts, and the
//! blocking rate limiter while it waits for a token. Both go through an
//! injected [`Sleeper`] so that tests can assert on the exact schedule a
//! policy produced, or collapse hour-long backoffs to nothing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A wait, expressed as an ordinary future.
///
/// Dropping the returned future abandons the wait; that is how cancellation
/// reaches a backoff sleep or an admission poll mid-flight.
#[async_trait]
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that never waits, so a retry loop runs its attempts back to back.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {
        // no-op
    }
}

/// Sleeper that records each requested wait and returns immediately.
///
/// Clones share the same log, so a test keeps one handle and injects a copy
/// into the policy under test.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded waits, in request order.
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Sum of every recorded wait.
    pub fn total(&self) -> Duration {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .copied()
            .sum()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }
}

#[async_trait]
impl Sleeper for TrackingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(duration);
    }
}
