//! Convenient re-exports for common Mainstay types.
pub use crate::{
    Backoff, Bulkhead, Cache, CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock,
    Criticality, ErrorClass, FallbackPolicy, HealthReporter, HedgePolicy, Hooks, InstantSleeper,
    ManualClock, MonotonicClock, Policy, PolicyBuilder, PolicyOption, PolicyStatus, Readiness,
    Registry, ResilienceError, RetryPolicy, RetryPolicyBuilder, Sleeper, StaleCache, TimeoutPolicy,
    TokenBucket, TokioSleeper, TrackingSleeper,
};
