//! Backoff strategies for retry policies.
//!
//! A strategy is a pure function from the attempt index to a delay. Attempts
//! are 0-indexed: `delay(0)` is the pause before the first retry.

use rand::Rng;
use std::time::Duration;

/// Backoff strategy for retries.
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Fixed delay between retries.
    Constant { delay: Duration },
    /// Linearly increasing delay: `step * (attempt + 1)`.
    Linear { step: Duration },
    /// Exponentially increasing delay: `base * 2^attempt`, with optional cap.
    Exponential { base: Duration, max: Option<Duration> },
    /// Exponential ceiling with uniform jitter in `[0, base * 2^attempt]`.
    ExponentialJitter { base: Duration, max: Option<Duration> },
}

impl Backoff {
    /// Create a constant backoff strategy.
    pub fn constant(delay: Duration) -> Self {
        Backoff::Constant { delay }
    }

    /// Create a linear backoff strategy.
    pub fn linear(step: Duration) -> Self {
        Backoff::Linear { step }
    }

    /// Create an exponential backoff strategy.
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, max: None }
    }

    /// Create an exponential backoff strategy with uniform jitter.
    pub fn exponential_jitter(base: Duration) -> Self {
        Backoff::ExponentialJitter { base, max: None }
    }

    /// Set a maximum delay for the exponential strategies.
    pub fn with_max(mut self, ceiling: Duration) -> Self {
        match self {
            Backoff::Exponential { ref mut max, .. }
            | Backoff::ExponentialJitter { ref mut max, .. } => *max = Some(ceiling),
            _ => {}
        }
        self
    }

    /// Calculate the delay before retry `attempt + 1` (0-indexed attempt).
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            Backoff::Constant { delay } => *delay,
            Backoff::Linear { step } => {
                let multiplier = attempt.saturating_add(1).min(u32::MAX as usize) as u32;
                step.checked_mul(multiplier).unwrap_or(Duration::MAX)
            }
            Backoff::Exponential { base, max } => {
                let delay = exponential_ceiling(*base, attempt).unwrap_or(Duration::MAX);
                match max {
                    Some(cap) => delay.min(*cap),
                    None => delay,
                }
            }
            Backoff::ExponentialJitter { base, max } => {
                // Overflowed or zero ceilings yield no delay at all rather
                // than an arbitrarily large one.
                let Some(mut ceiling) = exponential_ceiling(*base, attempt) else {
                    return Duration::ZERO;
                };
                if let Some(cap) = max {
                    ceiling = ceiling.min(*cap);
                }
                let Ok(nanos) = u64::try_from(ceiling.as_nanos()) else {
                    return Duration::ZERO;
                };
                if nanos == 0 {
                    return Duration::ZERO;
                }
                Duration::from_nanos(rand::rng().random_range(0..=nanos))
            }
        }
    }
}

fn exponential_ceiling(base: Duration, attempt: usize) -> Option<Duration> {
    let exponent = attempt.min(u32::MAX as usize) as u32;
    let multiplier = 2u32.checked_pow(exponent)?;
    base.checked_mul(multiplier)
}
