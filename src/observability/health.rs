//! # Health Checking
//!
//! Tracks whether the process considers itself live and ready, for the
//! `/healthz` admin endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared liveness/readiness flags. Cloned cheaply; every clone observes the
/// same underlying state.
#[derive(Clone)]
pub struct HealthChecker {
    ready: Arc<AtomicBool>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self { ready: Arc::new(AtomicBool::new(false)) }
    }

    /// Mark the process ready to serve traffic (orchestrator stores and the
    /// xDS server are wired up).
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready() {
        let checker = HealthChecker::new();
        assert!(!checker.is_ready());
    }

    #[test]
    fn mark_ready_is_observed_by_clones() {
        let checker = HealthChecker::new();
        let clone = checker.clone();
        checker.mark_ready();
        assert!(clone.is_ready());
    }

    #[test]
    fn mark_not_ready_reverts_state() {
        let checker = HealthChecker::new();
        checker.mark_ready();
        checker.mark_not_ready();
        assert!(!checker.is_ready());
    }
}
