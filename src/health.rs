//! Health reporting types consumed by the registry and readiness surface.

use serde::Serialize;

/// How strongly an unhealthy pattern should weigh on overall readiness.
///
/// Ordered: `None < Degraded < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    None,
    Degraded,
    Critical,
}

/// Point-in-time health of a policy, including its declared dependencies.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyStatus {
    pub name: String,
    pub healthy: bool,
    pub criticality: Criticality,
    /// Dominant condition label: `healthy`, `circuit_open`,
    /// `circuit_half_open`, `rate_limited`, or `bulkhead_full`.
    pub state: String,
    pub dependencies: Vec<PolicyStatus>,
}

impl PolicyStatus {
    /// A nominal status, the starting point for derivation.
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            criticality: Criticality::None,
            state: "healthy".to_string(),
            dependencies: Vec::new(),
        }
    }

    /// Whether this policy alone would block readiness.
    pub fn blocks_readiness(&self) -> bool {
        self.criticality == Criticality::Critical && !self.healthy
    }
}

/// Anything that can report a [`PolicyStatus`].
///
/// Policies implement this; so can application components that want to show
/// up in the same readiness document.
pub trait HealthReporter: Send + Sync {
    fn health_status(&self) -> PolicyStatus;
}
