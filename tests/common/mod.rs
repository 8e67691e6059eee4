//! Shared helpers for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use mainstay::{Cache, Clock, ManualClock};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

/// Route policy tracing output through the test harness so breaker and
/// admission transition logs show up under `--nocapture`. Safe to call from
/// every test; only the first registration wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub &'static str);

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestError: {}", self.0)
    }
}

impl std::error::Error for TestError {}

/// Map-backed cache honouring the TTL contract against an injected clock:
/// entries are live while `age <= ttl` and report a miss afterwards.
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    clock: ManualClock,
    entries: Mutex<HashMap<K, (V, u64)>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new(clock: ManualClock) -> Self {
        Self { clock, entries: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires)) if self.clock.now_nanos() <= *expires => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: K, value: V, ttl: Duration) {
        let expires = self.clock.now_nanos() + ttl.as_nanos() as u64;
        self.entries.lock().unwrap().insert(key, (value, expires));
    }

    async fn delete(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }
}
