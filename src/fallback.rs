//! Fallback: a catch-all tail that turns failures into outcomes.

use crate::hooks::Hooks;
use crate::ResilienceError;
use std::future::Future;
use std::sync::Arc;

type Recover<T, E> =
    Arc<dyn Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync>;

/// Recovery policy applied when the wrapped operation fails.
///
/// Two flavours: [`FallbackPolicy::value`] always substitutes a fixed value,
/// while [`FallbackPolicy::func`] lets the caller compute an outcome from
/// the error (and may itself return an error). Successful results bypass the
/// fallback entirely.
pub struct FallbackPolicy<T, E> {
    recover: Recover<T, E>,
    hooks: Hooks,
}

impl<T, E> Clone for FallbackPolicy<T, E> {
    fn clone(&self) -> Self {
        Self { recover: self.recover.clone(), hooks: self.hooks.clone() }
    }
}

impl<T, E> std::fmt::Debug for FallbackPolicy<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy").field("hooks", &self.hooks).finish()
    }
}

impl<T, E> FallbackPolicy<T, E>
where
    T: Send,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Substitute a fixed value for any failure.
    pub fn value(value: T) -> Self
    where
        T: Clone + Sync + 'static,
    {
        Self { recover: Arc::new(move |_| Ok(value.clone())), hooks: Hooks::default() }
    }

    /// Compute the outcome from the error; the result is returned verbatim.
    pub fn func<F>(recover: F) -> Self
    where
        F: Fn(ResilienceError<E>) -> Result<T, ResilienceError<E>> + Send + Sync + 'static,
    {
        Self { recover: Arc::new(recover), hooks: Hooks::default() }
    }

    pub(crate) fn from_recover(recover: Recover<T, E>) -> Self {
        Self { recover, hooks: Hooks::default() }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub async fn execute<Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        match operation().await {
            Ok(value) => Ok(value),
            Err(error) => {
                tracing::debug!(error = %error, "fallback engaged");
                self.hooks.fallback_used(&error);
                (self.recover)(error)
            }
        }
    }
}
