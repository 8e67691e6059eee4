//! Decorator composition over boxed async operations.
//!
//! A [`Next`] is a boxed producer of futures: calling it starts one
//! execution of everything it wraps. A [`Middleware`] maps a `Next` to a
//! `Next` with the same signature, leaving values and errors untouched
//! unless it explicitly intervenes. [`chain`] folds a middleware slice onto
//! a base operation right-to-left, so the first middleware ends up
//! outermost; an empty chain is the identity.

use crate::ResilienceError;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Boxed unit of work. Each invocation yields one independent execution,
/// which is what lets retry call it repeatedly and hedge race two calls.
pub type Next<T, E> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, ResilienceError<E>>> + Send>;

/// Decorator over a [`Next`].
pub type Middleware<T, E> = Arc<dyn Fn(Next<T, E>) -> Next<T, E> + Send + Sync>;

/// Compose middlewares onto a base operation. `middlewares[0]` becomes the
/// outermost wrapper.
pub fn chain<T, E>(middlewares: &[Middleware<T, E>], base: Next<T, E>) -> Next<T, E> {
    middlewares.iter().rev().fold(base, |inner, middleware| middleware(inner))
}

/// Fixed pattern priorities. Composition sorts ascending, so a lower
/// priority wraps a higher one.
pub mod priority {
    pub const FALLBACK: u8 = 0;
    pub const TIMEOUT: u8 = 1;
    pub const CIRCUIT_BREAKER: u8 = 2;
    pub const RATE_LIMIT: u8 = 3;
    pub const BULKHEAD: u8 = 4;
    pub const RETRY: u8 = 5;
    pub const HEDGE: u8 = 6;
}

/// A pattern slotted into the composition order.
pub struct PatternEntry<T, E> {
    pub priority: u8,
    pub name: &'static str,
    pub wrap: Middleware<T, E>,
}

impl<T, E> Clone for PatternEntry<T, E> {
    fn clone(&self) -> Self {
        Self { priority: self.priority, name: self.name, wrap: self.wrap.clone() }
    }
}

impl<T, E> std::fmt::Debug for PatternEntry<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternEntry")
            .field("priority", &self.priority)
            .field("name", &self.name)
            .finish()
    }
}
