//! Retry policy with classified errors, backoff, and per-attempt deadlines.

use crate::backoff::Backoff;
use crate::error::{ErrorClass, MAX_RETRY_FAILURES};
use crate::hooks::Hooks;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::ResilienceError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type RetryPredicate<E> = Arc<dyn Fn(&ResilienceError<E>) -> bool + Send + Sync>;

/// Retry policy: re-invoke a failing operation up to `max_attempts` times,
/// sleeping between attempts according to a [`Backoff`] strategy.
///
/// Errors classified permanent are returned unchanged without further
/// attempts; so is any error rejected by the `retry_if` predicate. All other
/// errors, including library sentinels such as a per-attempt timeout, count
/// as transient.
pub struct RetryPolicy<E> {
    max_attempts: usize,
    backoff: Backoff,
    max_delay: Option<Duration>,
    per_attempt_timeout: Option<Duration>,
    retry_if: Option<RetryPredicate<E>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    hooks: Option<Hooks>,
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("max_delay", &self.max_delay)
            .field("per_attempt_timeout", &self.per_attempt_timeout)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
            max_delay: self.max_delay,
            per_attempt_timeout: self.per_attempt_timeout,
            retry_if: self.retry_if.clone(),
            sleeper: self.sleeper.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Fill unset sleeper/hooks from an enclosing policy's resolved
    /// environment. Explicit per-retry settings win.
    pub(crate) fn inherit(mut self, sleeper: &Arc<dyn Sleeper>, hooks: &Hooks) -> Self {
        if self.sleeper.is_none() {
            self.sleeper = Some(sleeper.clone());
        }
        if self.hooks.is_none() {
            self.hooks = Some(hooks.clone());
        }
        self
    }

    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let attempts = self.max_attempts.max(1);
        let hooks = self.hooks.clone().unwrap_or_default();
        let mut failures: Vec<ResilienceError<E>> = Vec::new();

        for attempt in 0..attempts {
            let outcome = match self.per_attempt_timeout {
                Some(limit) => {
                    let start = tokio::time::Instant::now();
                    match tokio::time::timeout(limit, operation()).await {
                        Ok(result) => result,
                        Err(_) => Err(ResilienceError::Timeout {
                            elapsed: start.elapsed(),
                            timeout: limit,
                        }),
                    }
                }
                None => operation().await,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if error.class() == ErrorClass::Permanent {
                return Err(error);
            }
            if let Some(predicate) = &self.retry_if {
                if !predicate(&error) {
                    return Err(error);
                }
            }

            if attempt + 1 >= attempts {
                push_capped(&mut failures, error);
                return Err(ResilienceError::RetryExhausted { attempts, failures });
            }

            // The hook marks a scheduled retry, so it fires before the sleep
            // and never for the final failure. Attempt numbers are 1-indexed.
            hooks.retry(attempt + 1, &error);
            tracing::debug!(attempt = attempt + 1, error = %error, "retry scheduled");
            push_capped(&mut failures, error);

            let mut delay = self.backoff.delay(attempt);
            if let Some(cap) = self.max_delay {
                delay = delay.min(cap);
            }
            match &self.sleeper {
                Some(sleeper) => sleeper.sleep(delay).await,
                None => TokioSleeper.sleep(delay).await,
            }
        }

        unreachable!("retry loop returns from within")
    }
}

fn push_capped<E>(failures: &mut Vec<ResilienceError<E>>, error: ResilienceError<E>) {
    failures.push(error);
    if failures.len() > MAX_RETRY_FAILURES {
        let excess = failures.len() - MAX_RETRY_FAILURES;
        failures.drain(0..excess);
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder<E> {
    policy: RetryPolicy<E>,
}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy {
                max_attempts: 3,
                backoff: Backoff::exponential(Duration::from_secs(1)),
                max_delay: None,
                per_attempt_timeout: None,
                retry_if: None,
                sleeper: None,
                hooks: None,
            },
        }
    }

    /// Total number of attempts, including the first. Values below one are
    /// treated as a single execution.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.policy.backoff = backoff;
        self
    }

    /// Clamp every computed backoff delay.
    pub fn max_delay(mut self, cap: Duration) -> Self {
        self.policy.max_delay = Some(cap);
        self
    }

    /// Bound each individual attempt; expiry counts as a transient failure.
    pub fn per_attempt_timeout(mut self, limit: Duration) -> Self {
        self.policy.per_attempt_timeout = Some(limit);
        self
    }

    /// Only retry errors for which the predicate returns true.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ResilienceError<E>) -> bool + Send + Sync + 'static,
    {
        self.policy.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.policy.sleeper = Some(Arc::new(sleeper));
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.policy.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        self.policy
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
