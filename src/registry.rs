//! Registry of health reporters and the readiness document derived from it.
//!
//! The reporter list is copy-on-write: registration takes a short-lived
//! mutex, builds a fresh snapshot, and publishes it through an [`ArcSwap`];
//! readers load the current snapshot without locking and never observe a
//! half-updated list.

use crate::health::{HealthReporter, PolicyStatus};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::{Arc, Mutex, OnceLock};

type ReporterList = Vec<Arc<dyn HealthReporter>>;

/// Shared, clonable registry handle.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    reporters: ArcSwap<ReporterList>,
    write_lock: Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reporter. Registrations are append-only; a registry lives for
    /// the process, so there is no deregistration.
    pub fn register<R: HealthReporter + 'static>(&self, reporter: R) {
        self.register_arc(Arc::new(reporter));
    }

    pub fn register_arc(&self, reporter: Arc<dyn HealthReporter>) {
        let _guard = self.inner.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = self.inner.reporters.load();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(reporter);
        self.inner.reporters.store(Arc::new(next));
    }

    /// Number of registered reporters.
    pub fn len(&self) -> usize {
        self.inner.reporters.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current status of every registered reporter.
    pub fn statuses(&self) -> Vec<PolicyStatus> {
        let snapshot = self.inner.reporters.load();
        snapshot.iter().map(|reporter| reporter.health_status()).collect()
    }

    /// Status of the first reporter with the given name, if any.
    pub fn get(&self, name: &str) -> Option<PolicyStatus> {
        self.statuses().into_iter().find(|status| status.name == name)
    }

    /// Evaluate readiness: ready unless some policy is both critical and
    /// unhealthy.
    pub fn readiness(&self) -> Readiness {
        let policies = self.statuses();
        let ready = !policies.iter().any(PolicyStatus::blocks_readiness);
        Readiness { ready, policies }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("reporters", &self.len()).finish()
    }
}

/// Process-wide default registry, lazily initialised on first access.
/// Policies built with a non-empty name and no explicit registry register
/// themselves here.
pub fn default_registry() -> &'static Registry {
    static DEFAULT: OnceLock<Registry> = OnceLock::new();
    DEFAULT.get_or_init(Registry::new)
}

/// Readiness document: serialises to the JSON shape served by health
/// endpoints. An adapter should answer 200 when `ready` and 503 otherwise,
/// with `Content-Type: application/json`.
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub policies: Vec<PolicyStatus>,
}

impl Readiness {
    /// HTTP status code matching this readiness state.
    pub fn status_code(&self) -> u16 {
        if self.ready {
            200
        } else {
            503
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Criticality;

    struct FixedReporter {
        status: PolicyStatus,
    }

    impl HealthReporter for FixedReporter {
        fn health_status(&self) -> PolicyStatus {
            self.status.clone()
        }
    }

    fn reporter(name: &str, healthy: bool, criticality: Criticality) -> FixedReporter {
        let mut status = PolicyStatus::healthy(name);
        status.healthy = healthy;
        status.criticality = criticality;
        FixedReporter { status }
    }

    #[test]
    fn empty_registry_is_ready() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        let readiness = registry.readiness();
        assert!(readiness.ready);
        assert!(readiness.policies.is_empty());
        assert_eq!(readiness.status_code(), 200);
    }

    #[test]
    fn registration_appends_and_preserves_order() {
        let registry = Registry::new();
        registry.register(reporter("a", true, Criticality::None));
        registry.register(reporter("b", true, Criticality::None));

        assert_eq!(registry.len(), 2);
        let names: Vec<_> =
            registry.statuses().into_iter().map(|status| status.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn get_finds_reporter_by_name() {
        let registry = Registry::new();
        registry.register(reporter("db", true, Criticality::None));

        assert!(registry.get("db").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn critical_unhealthy_reporter_blocks_readiness() {
        let registry = Registry::new();
        registry.register(reporter("ok", true, Criticality::None));
        registry.register(reporter("down", false, Criticality::Critical));

        let readiness = registry.readiness();
        assert!(!readiness.ready);
        assert_eq!(readiness.status_code(), 503);
    }

    #[test]
    fn degraded_reporter_does_not_block_readiness() {
        let registry = Registry::new();
        registry.register(reporter("slow", false, Criticality::Degraded));
        registry.register(reporter("throttled", true, Criticality::Critical));

        assert!(registry.readiness().ready);
    }

    #[test]
    fn clones_share_the_reporter_list() {
        let registry = Registry::new();
        let copy = registry.clone();
        registry.register(reporter("a", true, Criticality::None));
        assert_eq!(copy.len(), 1);
    }

    #[test]
    fn readiness_serialises_to_expected_shape() {
        let registry = Registry::new();
        registry.register(reporter("down", false, Criticality::Critical));

        let json: serde_json::Value =
            serde_json::from_str(&registry.readiness().to_json().unwrap()).unwrap();
        assert_eq!(json["ready"], false);
        assert_eq!(json["policies"][0]["name"], "down");
        assert_eq!(json["policies"][0]["healthy"], false);
        assert_eq!(json["policies"][0]["criticality"], "critical");
    }

    #[test]
    fn default_registry_is_a_singleton() {
        let a = default_registry();
        let b = default_registry();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }

    #[test]
    fn concurrent_registration_loses_no_reporters() {
        let registry = Registry::new();
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..10 {
                    registry.register(reporter(
                        &format!("r{}-{}", i, j),
                        true,
                        Criticality::None,
                    ));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 80);
    }
}
