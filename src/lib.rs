#![forbid(unsafe_code)]

//! # Mainstay
//!
//! Composable resilience middleware for async Rust: wrap an unreliable
//! operation in a policy stack of timeout, retry with backoff, circuit
//! breaker, token-bucket rate limiting, bulkhead, hedged requests, and
//! fallback, with a stale-on-error cache alongside.
//!
//! ## Features
//!
//! - **One entry point**: build a [`Policy`] from option descriptors and call
//!   [`Policy::execute`]; patterns always compose in the same order
//!   (fallback → timeout → breaker → rate limit → bulkhead → retry → hedge)
//!   no matter how the options were listed.
//! - **Classified errors**: mark failures [`ResilienceError::permanent`] to
//!   stop retries; everything else is treated as transient.
//! - **Lock-free state machines**: breaker, limiter, and bulkhead run on
//!   atomics, no mutex on the hot path.
//! - **Deterministic tests**: inject a [`Clock`] and [`Sleeper`] instead of
//!   waiting on the wall clock.
//! - **Observability**: per-event [`Hooks`], health status per policy, and a
//!   registry-level readiness document.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mainstay::{Backoff, Policy, ResilienceError, RetryPolicy};
//!
//! #[derive(Debug)]
//! struct UpstreamError;
//!
//! impl std::fmt::Display for UpstreamError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "upstream unavailable")
//!     }
//! }
//!
//! impl std::error::Error for UpstreamError {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ResilienceError<UpstreamError>> {
//!     let retry = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .backoff(Backoff::exponential_jitter(Duration::from_millis(50)))
//!         .build();
//!
//!     let policy: Policy<String, UpstreamError> = Policy::builder("greeter")
//!         .with_timeout(Duration::from_secs(2))
//!         .with_retry(retry)
//!         .with_bulkhead(32)
//!         .build();
//!
//!     let attempts = Arc::new(AtomicUsize::new(0));
//!     let greeting = policy
//!         .execute(move || {
//!             let attempts = attempts.clone();
//!             async move {
//!                 if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
//!                     Err(ResilienceError::Inner(UpstreamError))
//!                 } else {
//!                     Ok("hello".to_string())
//!                 }
//!             }
//!         })
//!         .await?;
//!
//!     assert_eq!(greeting, "hello");
//!     Ok(())
//! }
//! ```

mod backoff;
mod bulkhead;
mod circuit_breaker;
mod clock;
mod error;
mod fallback;
mod health;
mod hedge;
mod hooks;
mod middleware;
mod policy;
mod rate_limit;
mod registry;
mod retry;
mod sleeper;
mod stale_cache;
mod timeout;

// Re-exports
pub use backoff::Backoff;
pub use bulkhead::Bulkhead;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitRejection, CircuitState,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{ErrorClass, ResilienceError, MAX_RETRY_FAILURES};
pub use fallback::FallbackPolicy;
pub use health::{Criticality, HealthReporter, PolicyStatus};
pub use hedge::HedgePolicy;
pub use hooks::Hooks;
pub use middleware::{chain, priority, Middleware, Next, PatternEntry};
pub use policy::{Policy, PolicyBuilder, PolicyOption};
pub use rate_limit::{TokenBucket, TOKEN_SCALE};
pub use registry::{default_registry, Readiness, Registry};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use stale_cache::{Cache, StaleCache};
pub use timeout::TimeoutPolicy;

pub mod prelude;
