//! Policy: a named, immutable bundle of resilience patterns with a single
//! entry point.
//!
//! A policy is assembled from option descriptors in two passes. The first
//! pass resolves the environment (clock, sleeper, hooks, registry); the
//! second materialises each pattern descriptor into its stateful object,
//! wired to that environment, and produces a [`PatternEntry`] whose wrap
//! closure captures it. Entries are stably sorted by priority so that
//! composition always yields the same onion:
//!
//! fallback → timeout → circuit breaker → rate limiter → bulkhead → retry →
//! hedge → operation
//!
//! Fallback catches everything; the timeout bounds total wall time including
//! retries; the breaker fast-fails before admission control; rate limiter
//! and bulkhead protect shared resources from retry storms; retry wraps the
//! innermost hedge so each attempt can race a speculative twin.

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::clock::{Clock, MonotonicClock};
use crate::fallback::FallbackPolicy;
use crate::health::{Criticality, HealthReporter, PolicyStatus};
use crate::hedge::HedgePolicy;
use crate::hooks::Hooks;
use crate::middleware::{chain, priority, Middleware, Next, PatternEntry};
use crate::rate_limit::TokenBucket;
use crate::registry::{default_registry, Registry};
use crate::retry::RetryPolicy;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::timeout::TimeoutPolicy;
use crate::ResilienceError;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Option descriptor consumed by [`PolicyBuilder`].
///
/// Descriptors are inert values; nothing is instantiated until `build`, so
/// the order in which they are supplied never affects the composition order.
pub enum PolicyOption<T, E> {
    /// Bound total execution time, retries included.
    Timeout(Duration),
    /// Retry failed attempts. The retry's sleeper and hooks default to the
    /// policy's resolved environment unless explicitly set on the retry.
    Retry(RetryPolicy<E>),
    /// Gate calls through a circuit breaker.
    CircuitBreaker(CircuitBreakerConfig),
    /// Admit calls through a token bucket.
    RateLimit { rate: f64, blocking: bool },
    /// Cap concurrent in-flight calls.
    Bulkhead(usize),
    /// Race a speculative second attempt after the given delay.
    Hedge(Duration),
    /// Recover from any error reaching the outermost layer.
    #[allow(clippy::type_complexity)]
    Fallback(Arc<dyn Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync>),
    /// Override the clock used by time-dependent patterns.
    Clock(Arc<dyn Clock>),
    /// Override the sleeper used for backoff and admission waits.
    Sleeper(Arc<dyn Sleeper>),
    /// Observer callbacks shared by every pattern in this policy.
    Hooks(Hooks),
    /// Register with this registry instead of the process default.
    Registry(Registry),
    /// Declare another reporter as a dependency for health derivation.
    DependsOn(Arc<dyn HealthReporter>),
}

struct PolicyCore<T, E> {
    name: String,
    entries: Vec<PatternEntry<T, E>>,
    /// Entry wraps in composition order, ready to hand to [`chain`].
    middlewares: Vec<Middleware<T, E>>,
    breaker: Option<Arc<CircuitBreaker>>,
    limiter: Option<Arc<TokenBucket>>,
    bulkhead: Option<Arc<Bulkhead>>,
    dependencies: Vec<Arc<dyn HealthReporter>>,
}

/// Immutable, cheaply clonable policy handle.
///
/// `T` is the operation's success type, `E` the application error type.
pub struct Policy<T, E> {
    inner: Arc<PolicyCore<T, E>>,
}

impl<T, E> Clone for Policy<T, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T, E> std::fmt::Debug for Policy<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.inner.name)
            .field("patterns", &self.patterns())
            .finish()
    }
}

impl<T, E> Policy<T, E> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Pattern names in composition order, outermost first.
    pub fn patterns(&self) -> Vec<&'static str> {
        self.inner.entries.iter().map(|entry| entry.name).collect()
    }
}

impl<T, E> Policy<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start building a policy. An empty name leaves the policy unnamed and
    /// unregistered.
    pub fn builder(name: impl Into<String>) -> PolicyBuilder<T, E> {
        PolicyBuilder { name: name.into(), options: Vec::new() }
    }

    /// Execute an operation through the composed pattern chain.
    ///
    /// The operation may be invoked several times (retry) or twice
    /// concurrently (hedge); each invocation must yield an independent
    /// future. A policy with no patterns behaves exactly like calling the
    /// operation directly.
    pub async fn execute<Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError<E>>
    where
        Op: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send + 'static,
    {
        let base: Next<T, E> = Box::new(move || Box::pin(operation()));
        let mut composed = chain(&self.inner.middlewares, base);
        composed().await
    }

    /// Derive the current health of this policy from its stateful patterns
    /// and declared dependencies.
    pub fn health_status(&self) -> PolicyStatus {
        let core = &self.inner;
        let mut status = PolicyStatus::healthy(core.name.clone());

        if let Some(breaker) = &core.breaker {
            match breaker.state() {
                CircuitState::Open => {
                    status.healthy = false;
                    status.criticality = Criticality::Critical;
                    status.state = "circuit_open".to_string();
                }
                CircuitState::HalfOpen => {
                    status.state = "circuit_half_open".to_string();
                }
                CircuitState::Closed => {}
            }
        }

        if let Some(limiter) = &core.limiter {
            if limiter.saturated() {
                status.criticality = status.criticality.max(Criticality::Degraded);
                if status.state == "healthy" {
                    status.state = "rate_limited".to_string();
                }
            }
        }

        if let Some(bulkhead) = &core.bulkhead {
            if bulkhead.is_full() {
                status.criticality = status.criticality.max(Criticality::Degraded);
                if status.state == "healthy" {
                    status.state = "bulkhead_full".to_string();
                }
            }
        }

        for dependency in &core.dependencies {
            let dependency_status = dependency.health_status();
            // A failing critical dependency degrades us without marking us
            // unhealthy; our own patterns decide that.
            if dependency_status.blocks_readiness() {
                status.criticality = status.criticality.max(Criticality::Degraded);
            }
            status.dependencies.push(dependency_status);
        }

        status
    }
}

impl<T, E> HealthReporter for Policy<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn health_status(&self) -> PolicyStatus {
        Policy::health_status(self)
    }
}

/// Builder accumulating option descriptors for a [`Policy`].
pub struct PolicyBuilder<T, E> {
    name: String,
    options: Vec<PolicyOption<T, E>>,
}

impl<T, E> PolicyBuilder<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Append a pre-built descriptor.
    pub fn option(mut self, option: PolicyOption<T, E>) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_timeout(self, duration: Duration) -> Self {
        self.option(PolicyOption::Timeout(duration))
    }

    pub fn with_retry(self, retry: RetryPolicy<E>) -> Self {
        self.option(PolicyOption::Retry(retry))
    }

    pub fn with_circuit_breaker(self, config: CircuitBreakerConfig) -> Self {
        self.option(PolicyOption::CircuitBreaker(config))
    }

    /// Token-bucket admission in rejecting mode.
    pub fn with_rate_limit(self, rate: f64) -> Self {
        self.option(PolicyOption::RateLimit { rate, blocking: false })
    }

    /// Token-bucket admission that waits for a token instead of rejecting.
    pub fn with_rate_limit_blocking(self, rate: f64) -> Self {
        self.option(PolicyOption::RateLimit { rate, blocking: true })
    }

    pub fn with_bulkhead(self, max_concurrent: usize) -> Self {
        self.option(PolicyOption::Bulkhead(max_concurrent))
    }

    pub fn with_hedge(self, delay: Duration) -> Self {
        self.option(PolicyOption::Hedge(delay))
    }

    /// On any failure, return this value instead.
    pub fn with_fallback(self, value: T) -> Self
    where
        T: Clone + Sync,
    {
        self.option(PolicyOption::Fallback(Arc::new(move |_| Ok(value.clone()))))
    }

    /// On any failure, let `recover` compute the outcome.
    pub fn with_fallback_fn<F>(self, recover: F) -> Self
    where
        F: Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync + 'static,
    {
        self.option(PolicyOption::Fallback(Arc::new(recover)))
    }

    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        self.option(PolicyOption::Clock(Arc::new(clock)))
    }

    pub fn with_sleeper<S: Sleeper + 'static>(self, sleeper: S) -> Self {
        self.option(PolicyOption::Sleeper(Arc::new(sleeper)))
    }

    pub fn with_hooks(self, hooks: Hooks) -> Self {
        self.option(PolicyOption::Hooks(hooks))
    }

    pub fn with_registry(self, registry: Registry) -> Self {
        self.option(PolicyOption::Registry(registry))
    }

    pub fn depends_on<R: HealthReporter + 'static>(self, reporter: R) -> Self {
        self.option(PolicyOption::DependsOn(Arc::new(reporter)))
    }

    /// Resolve the environment, materialise the patterns, sort them into the
    /// fixed composition order, and register the policy if it is named.
    pub fn build(self) -> Policy<T, E> {
        let PolicyBuilder { name, options } = self;

        // Pass 1: resolve the shared environment.
        let mut clock: Arc<dyn Clock> = Arc::new(MonotonicClock::default());
        let mut sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        let mut hooks = Hooks::default();
        let mut registry: Option<Registry> = None;
        for option in &options {
            match option {
                PolicyOption::Clock(resolved) => clock = resolved.clone(),
                PolicyOption::Sleeper(resolved) => sleeper = resolved.clone(),
                PolicyOption::Hooks(resolved) => hooks = resolved.clone(),
                PolicyOption::Registry(resolved) => registry = Some(resolved.clone()),
                _ => {}
            }
        }
        if registry.is_none() && !name.is_empty() {
            registry = Some(default_registry().clone());
        }

        // Pass 2: materialise pattern descriptors.
        let mut entries: Vec<PatternEntry<T, E>> = Vec::new();
        let mut breaker_ref = None;
        let mut limiter_ref = None;
        let mut bulkhead_ref = None;
        let mut dependencies = Vec::new();

        for option in options {
            match option {
                PolicyOption::Timeout(duration) => {
                    let timeout = TimeoutPolicy::new(duration).with_hooks(hooks.clone());
                    entries.push(PatternEntry {
                        priority: priority::TIMEOUT,
                        name: "timeout",
                        wrap: timeout_wrap(timeout),
                    });
                }
                PolicyOption::Retry(retry) => {
                    let retry = retry.inherit(&sleeper, &hooks);
                    entries.push(PatternEntry {
                        priority: priority::RETRY,
                        name: "retry",
                        wrap: retry_wrap(retry),
                    });
                }
                PolicyOption::CircuitBreaker(config) => {
                    let breaker = Arc::new(
                        CircuitBreaker::with_config(config)
                            .with_clock(clock.clone())
                            .with_hooks(hooks.clone()),
                    );
                    breaker_ref = Some(breaker.clone());
                    entries.push(PatternEntry {
                        priority: priority::CIRCUIT_BREAKER,
                        name: "circuit_breaker",
                        wrap: breaker_wrap(breaker),
                    });
                }
                PolicyOption::RateLimit { rate, blocking } => {
                    let limiter = Arc::new(
                        TokenBucket::new(rate)
                            .blocking(blocking)
                            .with_clock(clock.clone())
                            .with_sleeper(sleeper.clone())
                            .with_hooks(hooks.clone()),
                    );
                    limiter_ref = Some(limiter.clone());
                    entries.push(PatternEntry {
                        priority: priority::RATE_LIMIT,
                        name: "rate_limit",
                        wrap: limiter_wrap(limiter),
                    });
                }
                PolicyOption::Bulkhead(max_concurrent) => {
                    let bulkhead =
                        Arc::new(Bulkhead::new(max_concurrent).with_hooks(hooks.clone()));
                    bulkhead_ref = Some(bulkhead.clone());
                    entries.push(PatternEntry {
                        priority: priority::BULKHEAD,
                        name: "bulkhead",
                        wrap: bulkhead_wrap(bulkhead),
                    });
                }
                PolicyOption::Hedge(delay) => {
                    let hedge = HedgePolicy::new(delay)
                        .with_sleeper(sleeper.clone())
                        .with_hooks(hooks.clone());
                    entries.push(PatternEntry {
                        priority: priority::HEDGE,
                        name: "hedge",
                        wrap: hedge_wrap(hedge),
                    });
                }
                PolicyOption::Fallback(recover) => {
                    let fallback =
                        FallbackPolicy::from_recover(recover).with_hooks(hooks.clone());
                    entries.push(PatternEntry {
                        priority: priority::FALLBACK,
                        name: "fallback",
                        wrap: fallback_wrap(fallback),
                    });
                }
                PolicyOption::DependsOn(reporter) => dependencies.push(reporter),
                // Environment descriptors were consumed by pass 1.
                PolicyOption::Clock(_)
                | PolicyOption::Sleeper(_)
                | PolicyOption::Hooks(_)
                | PolicyOption::Registry(_) => {}
            }
        }

        entries.sort_by_key(|entry| entry.priority);
        let middlewares = entries.iter().map(|entry| entry.wrap.clone()).collect();
        tracing::debug!(name = %name, patterns = entries.len(), "policy built");

        let policy = Policy {
            inner: Arc::new(PolicyCore {
                name,
                entries,
                middlewares,
                breaker: breaker_ref,
                limiter: limiter_ref,
                bulkhead: bulkhead_ref,
                dependencies,
            }),
        };

        if !policy.name().is_empty() {
            if let Some(registry) = registry {
                registry.register(policy.clone());
            }
        }

        policy
    }
}

type Shared<T, E> = Arc<Mutex<Next<T, E>>>;

fn share<T, E>(next: Next<T, E>) -> Shared<T, E> {
    Arc::new(Mutex::new(next))
}

/// Start one execution of the inner chain. The lock is held only while the
/// future is created, never across an await.
fn invoke<T, E>(next: &Shared<T, E>) -> BoxFuture<'static, Result<T, ResilienceError<E>>> {
    let mut operation = next.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    (*operation)()
}

fn timeout_wrap<T, E>(timeout: TimeoutPolicy) -> Middleware<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(move |next| {
        let timeout = timeout.clone();
        let next = share(next);
        Box::new(move || {
            let timeout = timeout.clone();
            let next = next.clone();
            Box::pin(async move { timeout.execute(|| invoke(&next)).await })
        })
    })
}

fn retry_wrap<T, E>(retry: RetryPolicy<E>) -> Middleware<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(move |next| {
        let retry = retry.clone();
        let next = share(next);
        Box::new(move || {
            let retry = retry.clone();
            let next = next.clone();
            Box::pin(async move { retry.execute(|| invoke(&next)).await })
        })
    })
}

fn breaker_wrap<T, E>(breaker: Arc<CircuitBreaker>) -> Middleware<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(move |next| {
        let breaker = breaker.clone();
        let next = share(next);
        Box::new(move || {
            let breaker = breaker.clone();
            let next = next.clone();
            Box::pin(async move { breaker.execute(|| invoke(&next)).await })
        })
    })
}

fn limiter_wrap<T, E>(limiter: Arc<TokenBucket>) -> Middleware<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(move |next| {
        let limiter = limiter.clone();
        let next = share(next);
        Box::new(move || {
            let limiter = limiter.clone();
            let next = next.clone();
            Box::pin(async move { limiter.execute(|| invoke(&next)).await })
        })
    })
}

fn bulkhead_wrap<T, E>(bulkhead: Arc<Bulkhead>) -> Middleware<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(move |next| {
        let bulkhead = bulkhead.clone();
        let next = share(next);
        Box::new(move || {
            let bulkhead = bulkhead.clone();
            let next = next.clone();
            Box::pin(async move { bulkhead.execute(|| invoke(&next)).await })
        })
    })
}

fn hedge_wrap<T, E>(hedge: HedgePolicy) -> Middleware<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(move |next| {
        let hedge = hedge.clone();
        let next = share(next);
        Box::new(move || {
            let hedge = hedge.clone();
            let next = next.clone();
            Box::pin(async move { hedge.execute(|| invoke(&next)).await })
        })
    })
}

fn fallback_wrap<T, E>(fallback: FallbackPolicy<T, E>) -> Middleware<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(move |next| {
        let fallback = fallback.clone();
        let next = share(next);
        Box::new(move || {
            let fallback = fallback.clone();
            let next = next.clone();
            Box::pin(async move { fallback.execute(|| invoke(&next)).await })
        })
    })
}
