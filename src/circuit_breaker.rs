//! Circuit breaker implementation with lock-free atomics.
//!
//! Three states: closed (calls pass, consecutive failures counted), open
//! (calls rejected until the recovery timeout elapses), half-open (probe
//! calls pass; enough successes close the circuit, any failure reopens it).
//! All transitions go through compare-and-swap, so concurrent callers agree
//! on a single winner per transition and no mutex is needed.

use crate::clock::{Clock, MonotonicClock};
use crate::hooks::Hooks;
use crate::ResilienceError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Observable state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Stable textual label, as reported in health statuses.
    pub fn label(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker tuning knobs.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in closed state before the circuit opens.
    pub failure_threshold: usize,
    /// How long an open circuit rejects calls before allowing a probe.
    pub recovery_timeout: Duration,
    /// Successful probes required in half-open before closing.
    pub half_open_max_attempts: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_attempts: 1,
        }
    }
}

/// Snapshot returned when [`CircuitBreaker::allow`] rejects a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitRejection {
    pub failure_count: usize,
    pub open_for: Duration,
}

/// Three-state circuit breaker gating calls to an unreliable downstream.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    failure_count: AtomicUsize,
    last_failure_nanos: AtomicU64,
    half_open_successes: AtomicUsize,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    hooks: Hooks,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self::with_config(CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout,
            ..CircuitBreakerConfig::default()
        })
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicUsize::new(0),
            last_failure_nanos: AtomicU64::new(0),
            half_open_successes: AtomicUsize::new(0),
            config,
            clock: Arc::new(MonotonicClock::default()),
            hooks: Hooks::default(),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Check whether a call may proceed.
    ///
    /// In the open state, once the recovery timeout has elapsed the winning
    /// caller transitions the circuit to half-open; a caller that loses that
    /// race is still admitted, since someone has already moved the state
    /// forward.
    pub fn allow(&self) -> Result<(), CircuitRejection> {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED | STATE_HALF_OPEN => Ok(()),
            STATE_OPEN => {
                let last = self.last_failure_nanos.load(Ordering::Acquire);
                let elapsed = self.clock.since(last);
                if elapsed <= self.config.recovery_timeout {
                    return Err(CircuitRejection {
                        failure_count: self.failure_count.load(Ordering::Acquire),
                        open_for: elapsed,
                    });
                }
                if self
                    .state
                    .compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.half_open_successes.store(0, Ordering::Release);
                    tracing::info!("circuit breaker half-open, probing");
                    self.hooks.circuit_half_open();
                }
                Ok(())
            }
            _ => unreachable!("invalid circuit breaker state"),
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => {
                self.failure_count.store(0, Ordering::Release);
            }
            STATE_HALF_OPEN => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.half_open_max_attempts
                    && self
                        .state
                        .compare_exchange(
                            STATE_HALF_OPEN,
                            STATE_CLOSED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.failure_count.store(0, Ordering::Release);
                    tracing::info!("circuit breaker closed");
                    self.hooks.circuit_close();
                }
            }
            _ => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold
                    && self
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.last_failure_nanos.store(self.clock.now_nanos(), Ordering::Release);
                    tracing::error!(
                        failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker opened"
                    );
                    self.hooks.circuit_open();
                }
            }
            STATE_HALF_OPEN => {
                if self
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.half_open_successes.store(0, Ordering::Release);
                    self.last_failure_nanos.store(self.clock.now_nanos(), Ordering::Release);
                    tracing::warn!("circuit breaker probe failed, reopened");
                    self.hooks.circuit_open();
                }
            }
            _ => {}
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => CircuitState::Closed,
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => unreachable!("invalid circuit breaker state"),
        }
    }

    /// Consecutive failure count.
    pub fn failure_count(&self) -> usize {
        self.failure_count.load(Ordering::Acquire)
    }

    /// Force the breaker back to closed, clearing all counters.
    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.half_open_successes.store(0, Ordering::Release);
        self.last_failure_nanos.store(0, Ordering::Release);
    }

    /// Run an operation under this breaker: check admission, then record the
    /// outcome.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        if let Err(rejection) = self.allow() {
            return Err(ResilienceError::CircuitOpen {
                failure_count: rejection.failure_count,
                open_duration: rejection.open_for,
            });
        }

        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }
}
