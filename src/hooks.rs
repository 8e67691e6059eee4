//! Lifecycle hooks emitted by policies during execution.
//!
//! A [`Hooks`] value is a record of optional callbacks. Unset callbacks cost
//! a single branch to skip, so an all-default `Hooks` is effectively free.
//! The record is assembled before a policy is built and never mutated
//! afterwards; emission reads the fields without synchronisation.
//!
//! Callbacks that carry an error receive it as `&dyn std::error::Error`; the
//! concrete type is always `ResilienceError<E>` and can be recovered with
//! `downcast_ref` when needed.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

type Callback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&(dyn Error + 'static)) + Send + Sync>;
type AttemptCallback = Arc<dyn Fn(usize, &(dyn Error + 'static)) + Send + Sync>;

/// Optional observer callbacks for pattern lifecycle events.
#[derive(Clone, Default)]
pub struct Hooks {
    on_retry: Option<AttemptCallback>,
    on_circuit_open: Option<Callback>,
    on_circuit_close: Option<Callback>,
    on_circuit_half_open: Option<Callback>,
    on_rate_limited: Option<Callback>,
    on_bulkhead_full: Option<Callback>,
    on_bulkhead_acquired: Option<Callback>,
    on_bulkhead_released: Option<Callback>,
    on_timeout: Option<Callback>,
    on_hedge_triggered: Option<Callback>,
    on_hedge_won: Option<Callback>,
    on_fallback_used: Option<ErrorCallback>,
}

macro_rules! setter {
    ($name:ident) => {
        pub fn $name<F>(mut self, callback: F) -> Self
        where
            F: Fn() + Send + Sync + 'static,
        {
            self.$name = Some(Arc::new(callback));
            self
        }
    };
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a retry has been scheduled, before the backoff sleep.
    /// The attempt number is 1-indexed.
    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, &(dyn Error + 'static)) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Called when an inner error was replaced by a fallback outcome.
    pub fn on_fallback_used<F>(mut self, callback: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) + Send + Sync + 'static,
    {
        self.on_fallback_used = Some(Arc::new(callback));
        self
    }

    setter!(on_circuit_open);
    setter!(on_circuit_close);
    setter!(on_circuit_half_open);
    setter!(on_rate_limited);
    setter!(on_bulkhead_full);
    setter!(on_bulkhead_acquired);
    setter!(on_bulkhead_released);
    setter!(on_timeout);
    setter!(on_hedge_triggered);
    setter!(on_hedge_won);

    pub(crate) fn retry(&self, attempt: usize, error: &(dyn Error + 'static)) {
        if let Some(callback) = &self.on_retry {
            callback(attempt, error);
        }
    }

    pub(crate) fn circuit_open(&self) {
        if let Some(callback) = &self.on_circuit_open {
            callback();
        }
    }

    pub(crate) fn circuit_close(&self) {
        if let Some(callback) = &self.on_circuit_close {
            callback();
        }
    }

    pub(crate) fn circuit_half_open(&self) {
        if let Some(callback) = &self.on_circuit_half_open {
            callback();
        }
    }

    pub(crate) fn rate_limited(&self) {
        if let Some(callback) = &self.on_rate_limited {
            callback();
        }
    }

    pub(crate) fn bulkhead_full(&self) {
        if let Some(callback) = &self.on_bulkhead_full {
            callback();
        }
    }

    pub(crate) fn bulkhead_acquired(&self) {
        if let Some(callback) = &self.on_bulkhead_acquired {
            callback();
        }
    }

    pub(crate) fn bulkhead_released(&self) {
        if let Some(callback) = &self.on_bulkhead_released {
            callback();
        }
    }

    pub(crate) fn timeout(&self) {
        if let Some(callback) = &self.on_timeout {
            callback();
        }
    }

    pub(crate) fn hedge_triggered(&self) {
        if let Some(callback) = &self.on_hedge_triggered {
            callback();
        }
    }

    pub(crate) fn hedge_won(&self) {
        if let Some(callback) = &self.on_hedge_won {
            callback();
        }
    }

    pub(crate) fn fallback_used(&self, error: &(dyn Error + 'static)) {
        if let Some(callback) = &self.on_fallback_used {
            callback(error);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn set(option: &Option<impl Sized>) -> &'static str {
            if option.is_some() {
                "set"
            } else {
                "unset"
            }
        }
        f.debug_struct("Hooks")
            .field("on_retry", &set(&self.on_retry))
            .field("on_circuit_open", &set(&self.on_circuit_open))
            .field("on_circuit_close", &set(&self.on_circuit_close))
            .field("on_circuit_half_open", &set(&self.on_circuit_half_open))
            .field("on_rate_limited", &set(&self.on_rate_limited))
            .field("on_bulkhead_full", &set(&self.on_bulkhead_full))
            .field("on_bulkhead_acquired", &set(&self.on_bulkhead_acquired))
            .field("on_bulkhead_released", &set(&self.on_bulkhead_released))
            .field("on_timeout", &set(&self.on_timeout))
            .field("on_hedge_triggered", &set(&self.on_hedge_triggered))
            .field("on_hedge_won", &set(&self.on_hedge_won))
            .field("on_fallback_used", &set(&self.on_fallback_used))
            .finish()
    }
}
