//! Error types shared by all resilience policies.

use std::fmt;
use std::time::Duration;

/// Cap the number of stored failures inside `RetryExhausted` to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// Retry eligibility of an error.
///
/// Unclassified application errors enter the pipeline as [`ResilienceError::Inner`]
/// and are treated as transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Safe to retry.
    Transient,
    /// Retrying cannot help; fail fast.
    Permanent,
}

/// Unified error type for all resilience policies.
///
/// The first five variants are generated by the library itself; `Inner` and
/// `Permanent` wrap the application's own error and can be recovered with
/// [`ResilienceError::into_inner`].
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The operation exceeded its time budget.
    Timeout {
        elapsed: Duration,
        timeout: Duration,
    },
    /// The rate limiter had no whole token available.
    RateLimited {
        /// Configured refill rate in tokens per second.
        rate: f64,
    },
    /// The bulkhead was at capacity.
    Bulkhead {
        in_flight: usize,
        max: usize,
    },
    /// The circuit breaker is open.
    CircuitOpen {
        failure_count: usize,
        open_duration: Duration,
    },
    /// All retry attempts were exhausted.
    RetryExhausted {
        attempts: usize,
        /// Most recent failures, oldest first, capped at [`MAX_RETRY_FAILURES`].
        failures: Vec<ResilienceError<E>>,
    },
    /// A transient application error; retry policies may try again.
    Inner(E),
    /// A permanent application error; retry policies return it unchanged.
    Permanent(E),
}

impl<E> ResilienceError<E> {
    /// Wrap an application error as transient (equivalent to `Inner`).
    pub fn transient(error: E) -> Self {
        Self::Inner(error)
    }

    /// Wrap an application error as permanent, exempting it from retries.
    pub fn permanent(error: E) -> Self {
        Self::Permanent(error)
    }

    /// Retry eligibility of this error. Everything except `Permanent` is
    /// transient, including the library-generated sentinels.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Permanent(_) => ErrorClass::Permanent,
            _ => ErrorClass::Transient,
        }
    }

    /// True for failures generated by the library itself rather than the
    /// wrapped operation.
    pub fn is_resilience(&self) -> bool {
        !matches!(self, Self::Inner(_) | Self::Permanent(_))
    }

    /// Check if this error is due to timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is due to rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is due to bulkhead rejection.
    pub fn is_bulkhead(&self) -> bool {
        matches!(self, Self::Bulkhead { .. })
    }

    /// Check if this error is due to the circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this error is due to retry exhaustion.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Check if this error was classified permanent.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Check if this error wraps an application error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_) | Self::Permanent(_))
    }

    /// Recover the application error from either classification wrapper.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) | Self::Permanent(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the application error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) | Self::Permanent(e) => Some(e),
            _ => None,
        }
    }

    /// Access all recorded failures for `RetryExhausted`, if present.
    pub fn failures(&self) -> Option<&[ResilienceError<E>]> {
        match self {
            Self::RetryExhausted { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }

    /// The most recent failure recorded by `RetryExhausted`, if present.
    pub fn last_failure(&self) -> Option<&ResilienceError<E>> {
        match self {
            Self::RetryExhausted { failures, .. } => failures.last(),
            _ => None,
        }
    }
}

impl<E: Clone> Clone for ResilienceError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Timeout { elapsed, timeout } => {
                Self::Timeout { elapsed: *elapsed, timeout: *timeout }
            }
            Self::RateLimited { rate } => Self::RateLimited { rate: *rate },
            Self::Bulkhead { in_flight, max } => {
                Self::Bulkhead { in_flight: *in_flight, max: *max }
            }
            Self::CircuitOpen { failure_count, open_duration } => {
                Self::CircuitOpen { failure_count: *failure_count, open_duration: *open_duration }
            }
            Self::RetryExhausted { attempts, failures } => {
                Self::RetryExhausted { attempts: *attempts, failures: failures.clone() }
            }
            Self::Inner(e) => Self::Inner(e.clone()),
            Self::Permanent(e) => Self::Permanent(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for ResilienceError<E> {
    fn eq(&self, other: &Self) -> bool {
        use ResilienceError::*;
        match (self, other) {
            (Timeout { elapsed: a1, timeout: b1 }, Timeout { elapsed: a2, timeout: b2 }) => {
                a1 == a2 && b1 == b2
            }
            (RateLimited { rate: r1 }, RateLimited { rate: r2 }) => r1 == r2,
            (Bulkhead { in_flight: a1, max: b1 }, Bulkhead { in_flight: a2, max: b2 }) => {
                a1 == a2 && b1 == b2
            }
            (
                CircuitOpen { failure_count: f1, open_duration: d1 },
                CircuitOpen { failure_count: f2, open_duration: d2 },
            ) => f1 == f2 && d1 == d2,
            (
                RetryExhausted { attempts: a1, failures: f1 },
                RetryExhausted { attempts: a2, failures: f2 },
            ) => a1 == a2 && f1 == f2,
            (Inner(e1), Inner(e2)) => e1 == e2,
            (Permanent(e1), Permanent(e2)) => e1 == e2,
            _ => false,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {:?} (limit: {:?})", elapsed, timeout)
            }
            Self::RateLimited { rate } => {
                write!(f, "rate limit exceeded ({} tokens/s)", rate)
            }
            Self::Bulkhead { in_flight, max } => {
                write!(f, "bulkhead rejected request ({} in-flight, max {})", in_flight, max)
            }
            Self::CircuitOpen { failure_count, open_duration } => {
                write!(
                    f,
                    "circuit breaker open ({} failures, open for {:?})",
                    failure_count, open_duration
                )
            }
            Self::RetryExhausted { attempts, failures } => {
                let last = failures.last().map(|e| e.to_string()).unwrap_or_default();
                write!(f, "retry exhausted after {} attempts, last error: {}", attempts, last)
            }
            Self::Inner(e) => write!(f, "{}", e),
            Self::Permanent(e) => write!(f, "permanent: {}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ResilienceError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) | Self::Permanent(e) => Some(e),
            Self::RetryExhausted { failures, .. } => {
                failures.last().map(|e| e as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);

    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for DummyError {}

    #[test]
    fn timeout_error_display() {
        let err: ResilienceError<io::Error> = ResilienceError::Timeout {
            elapsed: Duration::from_millis(5100),
            timeout: Duration::from_secs(5),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
        assert!(msg.contains("5.1"));
    }

    #[test]
    fn rate_limited_display_includes_rate() {
        let err: ResilienceError<io::Error> = ResilienceError::RateLimited { rate: 5.0 };
        let msg = format!("{}", err);
        assert!(msg.contains("rate limit"));
        assert!(msg.contains('5'));
    }

    #[test]
    fn retry_exhausted_display_includes_last_error() {
        let err: ResilienceError<DummyError> = ResilienceError::RetryExhausted {
            attempts: 3,
            failures: vec![
                ResilienceError::Inner(DummyError("first")),
                ResilienceError::Inner(DummyError("last")),
            ],
        };
        let msg = format!("{}", err);
        assert!(msg.contains('3'));
        assert!(msg.contains("last error"));
        assert!(msg.contains("last"));
    }

    #[test]
    fn predicates_cover_all_variants() {
        let timeout: ResilienceError<DummyError> = ResilienceError::Timeout {
            elapsed: Duration::from_secs(1),
            timeout: Duration::from_secs(2),
        };
        assert!(timeout.is_timeout());
        assert!(timeout.is_resilience());
        assert!(!timeout.is_circuit_open());

        let limited: ResilienceError<DummyError> = ResilienceError::RateLimited { rate: 1.0 };
        assert!(limited.is_rate_limited());
        assert!(limited.is_resilience());

        let bulkhead: ResilienceError<DummyError> =
            ResilienceError::Bulkhead { in_flight: 1, max: 1 };
        assert!(bulkhead.is_bulkhead());

        let circuit: ResilienceError<DummyError> = ResilienceError::CircuitOpen {
            failure_count: 1,
            open_duration: Duration::from_secs(1),
        };
        assert!(circuit.is_circuit_open());

        let retry: ResilienceError<DummyError> =
            ResilienceError::RetryExhausted { attempts: 2, failures: vec![] };
        assert!(retry.is_retry_exhausted());

        let inner: ResilienceError<DummyError> = ResilienceError::Inner(DummyError("x"));
        assert!(inner.is_inner());
        assert!(!inner.is_resilience());
    }

    #[test]
    fn unclassified_defaults_to_transient() {
        let err: ResilienceError<DummyError> = ResilienceError::Inner(DummyError("x"));
        assert_eq!(err.class(), ErrorClass::Transient);

        let sentinel: ResilienceError<DummyError> = ResilienceError::RateLimited { rate: 1.0 };
        assert_eq!(sentinel.class(), ErrorClass::Transient);
    }

    #[test]
    fn permanent_classification_round_trips() {
        let err = ResilienceError::permanent(DummyError("fatal"));
        assert!(err.is_permanent());
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert_eq!(err.as_inner().unwrap().0, "fatal");
        assert_eq!(err.into_inner().unwrap(), DummyError("fatal"));
    }

    #[test]
    fn transient_classification_round_trips() {
        let err = ResilienceError::transient(DummyError("flaky"));
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(err.into_inner().unwrap(), DummyError("flaky"));
    }

    #[test]
    fn source_returns_last_failure_for_retry_exhausted() {
        let err: ResilienceError<DummyError> = ResilienceError::RetryExhausted {
            attempts: 3,
            failures: vec![
                ResilienceError::Inner(DummyError("a")),
                ResilienceError::Inner(DummyError("b")),
            ],
        };
        let src = err.source().unwrap();
        assert_eq!(src.to_string(), "b");
    }

    #[test]
    fn source_unwraps_classification() {
        let err = ResilienceError::permanent(DummyError("cause"));
        assert_eq!(err.source().unwrap().to_string(), "cause");
    }

    #[test]
    fn source_is_none_for_timeout() {
        let err: ResilienceError<DummyError> = ResilienceError::Timeout {
            elapsed: Duration::from_secs(1),
            timeout: Duration::from_secs(2),
        };
        assert!(err.source().is_none());
    }

    #[test]
    fn last_failure_exposes_tail_error() {
        let err: ResilienceError<DummyError> = ResilienceError::RetryExhausted {
            attempts: 2,
            failures: vec![
                ResilienceError::Inner(DummyError("first")),
                ResilienceError::Timeout {
                    elapsed: Duration::from_millis(10),
                    timeout: Duration::from_millis(5),
                },
            ],
        };
        assert!(err.last_failure().unwrap().is_timeout());
        assert_eq!(err.failures().unwrap().len(), 2);
    }
}
