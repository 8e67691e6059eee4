//! Hedged requests: a speculative second attempt to cut tail latency.
//!
//! The primary attempt races a delay timer. If the primary is still running
//! when the timer fires, a second attempt starts and the first result wins.
//! Because both attempts are futures owned by this layer, dropping the
//! composed future cancels whichever attempts are still in flight, and a
//! losing attempt is dropped the moment the winner's value is returned.
//!
//! The operation may therefore run twice concurrently; hedging is only safe
//! for idempotent work.

use crate::hooks::Hooks;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::ResilienceError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

enum First<R> {
    Primary(R),
    Hedge(R),
}

/// Speculative-execution policy with a fixed hedge delay.
#[derive(Debug, Clone)]
pub struct HedgePolicy {
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
    hooks: Hooks,
}

impl HedgePolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay, sleeper: Arc::new(TokioSleeper), hooks: Hooks::default() }
    }

    /// Override the sleeper driving the hedge timer.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Configured hedge delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Execute with hedging.
    ///
    /// When both attempts fail, the error received first (chronologically,
    /// not primary-preferring) is returned; callers should not rely on it
    /// being the primary's error.
    pub async fn execute<T, E, Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let primary = operation();
        tokio::pin!(primary);

        {
            let timer = self.sleeper.sleep(self.delay);
            tokio::pin!(timer);
            tokio::select! {
                result = &mut primary => return result,
                _ = &mut timer => {}
            }
        }

        tracing::debug!(delay = ?self.delay, "hedge attempt launched");
        self.hooks.hedge_triggered();
        let hedge = operation();
        tokio::pin!(hedge);

        let first = tokio::select! {
            result = &mut primary => First::Primary(result),
            result = &mut hedge => First::Hedge(result),
        };

        match first {
            First::Primary(Ok(value)) => Ok(value),
            First::Hedge(Ok(value)) => {
                self.hooks.hedge_won();
                Ok(value)
            }
            First::Primary(Err(first_error)) => match hedge.await {
                Ok(value) => {
                    self.hooks.hedge_won();
                    Ok(value)
                }
                Err(_) => Err(first_error),
            },
            First::Hedge(Err(first_error)) => match primary.await {
                Ok(value) => Ok(value),
                Err(_) => Err(first_error),
            },
        }
    }
}
