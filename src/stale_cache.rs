//! Keyed stale-on-error cache: serve the last known good value when a fresh
//! computation fails.
//!
//! The cache backend is external; this wrapper only expresses intent through
//! [`Cache`]. The backend owns TTL enforcement: once an entry's age exceeds
//! its TTL, `get` must report a miss and the fresh failure surfaces to the
//! caller.
//!
//! The wrapper is deliberately independent of the policy chain. To combine
//! the two, invoke `Policy::execute` inside the operation passed to
//! [`StaleCache::execute`].

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

type KeyCallback<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Keyed cache backend with per-entry TTL.
#[async_trait]
pub trait Cache<K, V>: Send + Sync {
    /// Look up a live entry. Expired entries must report a miss.
    async fn get(&self, key: &K) -> Option<V>;

    /// Store an entry valid for `ttl`.
    async fn set(&self, key: K, value: V, ttl: Duration);

    /// Drop an entry.
    async fn delete(&self, key: &K);
}

/// Stale-on-error wrapper over a [`Cache`] backend.
pub struct StaleCache<K, V> {
    cache: Arc<dyn Cache<K, V>>,
    ttl: Duration,
    on_cache_refreshed: Option<KeyCallback<K>>,
    on_stale_served: Option<KeyCallback<K>>,
}

impl<K, V> Clone for StaleCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            ttl: self.ttl,
            on_cache_refreshed: self.on_cache_refreshed.clone(),
            on_stale_served: self.on_stale_served.clone(),
        }
    }
}

impl<K, V> std::fmt::Debug for StaleCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaleCache").field("ttl", &self.ttl).finish()
    }
}

impl<K, V> StaleCache<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<C>(cache: C, ttl: Duration) -> Self
    where
        C: Cache<K, V> + 'static,
    {
        Self { cache: Arc::new(cache), ttl, on_cache_refreshed: None, on_stale_served: None }
    }

    /// Called after a fresh value has been written to the cache.
    pub fn on_cache_refreshed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.on_cache_refreshed = Some(Arc::new(callback));
        self
    }

    /// Called when a cached value is served in place of a failed refresh.
    pub fn on_stale_served<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.on_stale_served = Some(Arc::new(callback));
        self
    }

    /// Configured per-entry TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Run the fresh computation for `key`.
    ///
    /// Success refreshes the cache and returns the fresh value. Failure is
    /// absorbed when a live cached value exists; otherwise the original
    /// error is returned unchanged.
    pub async fn execute<Err, Fut, Op>(&self, key: K, operation: Op) -> Result<V, Err>
    where
        Err: Send,
        Fut: Future<Output = Result<V, Err>> + Send,
        Op: FnOnce(K) -> Fut + Send,
    {
        match operation(key.clone()).await {
            Ok(value) => {
                self.cache.set(key.clone(), value.clone(), self.ttl).await;
                if let Some(callback) = &self.on_cache_refreshed {
                    callback(&key);
                }
                Ok(value)
            }
            Err(error) => match self.cache.get(&key).await {
                Some(stale) => {
                    tracing::debug!("serving stale cache entry after fresh failure");
                    if let Some(callback) = &self.on_stale_served {
                        callback(&key);
                    }
                    Ok(stale)
                }
                None => Err(error),
            },
        }
    }
}
