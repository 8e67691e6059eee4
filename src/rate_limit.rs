//! Token-bucket rate limiter with lock-free refill and acquisition.
//!
//! Tokens are stored in fixed point with a scale of 10⁹, giving sub-token
//! precision per nanosecond of elapsed time. Refill is lazy: each admission
//! attempt first credits the bucket for the time elapsed since the previous
//! refill, then tries to take one whole token.

use crate::clock::{Clock, MonotonicClock};
use crate::hooks::Hooks;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::ResilienceError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fixed-point scale: one whole token.
pub const TOKEN_SCALE: u64 = 1_000_000_000;

/// Poll interval while waiting for a token in blocking mode.
const BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Token-bucket rate limiter.
///
/// Capacity equals one second of refill (`rate` whole tokens), so a full
/// bucket permits a burst of at most `rate` calls before admission becomes
/// paced. A rate small enough that `rate * 10⁹` truncates to zero yields a
/// zero-capacity bucket that rejects everything.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: AtomicU64,
    last_refill: AtomicU64,
    capacity: u64,
    rate: f64,
    blocking: bool,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    hooks: Hooks,
}

impl TokenBucket {
    /// Create a limiter admitting `rate` calls per second, rejecting when
    /// the bucket is empty.
    pub fn new(rate: f64) -> Self {
        let capacity = if rate.is_finite() && rate > 0.0 {
            (rate * TOKEN_SCALE as f64) as u64
        } else {
            0
        };
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::default());
        Self {
            tokens: AtomicU64::new(capacity),
            last_refill: AtomicU64::new(clock.now_nanos()),
            capacity,
            rate,
            blocking: false,
            clock,
            sleeper: Arc::new(TokioSleeper),
            hooks: Hooks::default(),
        }
    }

    /// Switch between blocking (wait for a token) and rejecting admission.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.last_refill = AtomicU64::new(clock.now_nanos());
        self.clock = Arc::new(clock);
        self
    }

    /// Override the sleeper used by blocking mode.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Configured refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Whole tokens currently available (gauge; racy by nature).
    pub fn tokens(&self) -> f64 {
        self.tokens.load(Ordering::Acquire) as f64 / TOKEN_SCALE as f64
    }

    /// Credit the bucket for time elapsed since the previous refill.
    ///
    /// The thread that wins the `last_refill` CAS owns the credit for that
    /// span; losers retry against the new timestamp, so no span is counted
    /// twice. A nanosecond-scale span may round to zero added tokens, which
    /// keeps bursts bounded.
    fn refill(&self) {
        loop {
            let last = self.last_refill.load(Ordering::Acquire);
            let now = self.clock.now_nanos();
            if now <= last {
                return;
            }
            if self
                .last_refill
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            let added = ((now - last) as f64 * self.rate) as u64;
            if added == 0 {
                return;
            }
            let mut current = self.tokens.load(Ordering::Acquire);
            loop {
                let next = current.saturating_add(added).min(self.capacity);
                match self.tokens.compare_exchange(
                    current,
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return,
                    Err(observed) => current = observed,
                }
            }
        }
    }

    fn take_one(&self) -> bool {
        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            if current < TOKEN_SCALE {
                return false;
            }
            match self.tokens.compare_exchange(
                current,
                current - TOKEN_SCALE,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Acquire one token.
    ///
    /// Returns `false` only in rejecting mode when the bucket is empty.
    /// Blocking mode polls until a token is available; dropping the returned
    /// future abandons the wait.
    pub async fn acquire(&self) -> bool {
        loop {
            self.refill();
            if self.take_one() {
                return true;
            }
            if !self.blocking {
                tracing::debug!(rate = self.rate, "rate limiter rejected call");
                self.hooks.rate_limited();
                return false;
            }
            self.sleeper.sleep(BLOCK_POLL_INTERVAL).await;
        }
    }

    /// Whether the bucket currently lacks a whole token.
    pub fn saturated(&self) -> bool {
        self.refill();
        self.tokens.load(Ordering::Acquire) < TOKEN_SCALE
    }

    /// Run an operation behind this limiter.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        if !self.acquire().await {
            return Err(ResilienceError::RateLimited { rate: self.rate });
        }
        operation().await
    }
}
