//! Per-endpoint health scoring.
//!
//! Tracks consecutive permanent delivery failures per webhook config. When a
//! config crosses the threshold it is auto-disabled and further trigger
//! attempts short-circuit with `HealthDegraded` until a manual reset; one
//! misconfigured endpoint cannot generate unbounded retry traffic. Passed
//! into the dispatcher as an explicit dependency, never an ambient singleton.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct EndpointHealth {
    consecutive_failures: AtomicU32,
    disabled: AtomicBool,
}

/// Concurrent-safe failure counters keyed by webhook config id.
#[derive(Debug)]
pub struct HealthTracker {
    threshold: u32,
    endpoints: DashMap<Uuid, Arc<EndpointHealth>>,
}

impl HealthTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            endpoints: DashMap::new(),
        }
    }

    fn endpoint(&self, config_id: Uuid) -> Arc<EndpointHealth> {
        self.endpoints.entry(config_id).or_default().clone()
    }

    /// Seed counters from persisted failure history at startup.
    pub fn seed(&self, config_id: Uuid, consecutive_failures: u32, disabled: bool) {
        let endpoint = self.endpoint(config_id);
        endpoint
            .consecutive_failures
            .store(consecutive_failures, Ordering::Release);
        endpoint.disabled.store(disabled, Ordering::Release);
    }

    /// A successful delivery clears the failure streak.
    pub fn record_success(&self, config_id: Uuid) {
        let endpoint = self.endpoint(config_id);
        endpoint.consecutive_failures.store(0, Ordering::Release);
    }

    /// Record a permanent failure. Returns true when this failure crossed the
    /// threshold and newly disabled the endpoint.
    pub fn record_permanent_failure(&self, config_id: Uuid) -> bool {
        let endpoint = self.endpoint(config_id);
        let failures = endpoint
            .consecutive_failures
            .fetch_add(1, Ordering::AcqRel)
            + 1;
        if failures >= self.threshold && !endpoint.disabled.swap(true, Ordering::AcqRel) {
            warn!(
                config_id = %config_id,
                consecutive_failures = failures,
                threshold = self.threshold,
                "webhook endpoint auto-disabled after repeated permanent failures"
            );
            return true;
        }
        false
    }

    pub fn is_disabled(&self, config_id: Uuid) -> bool {
        self.endpoints
            .get(&config_id)
            .map(|e| e.disabled.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn consecutive_failures(&self, config_id: Uuid) -> u32 {
        self.endpoints
            .get(&config_id)
            .map(|e| e.consecutive_failures.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Manual re-enable: clears the streak and the disabled flag.
    pub fn reset(&self, config_id: Uuid) {
        let endpoint = self.endpoint(config_id);
        endpoint.consecutive_failures.store(0, Ordering::Release);
        if endpoint.disabled.swap(false, Ordering::AcqRel) {
            info!(config_id = %config_id, "webhook endpoint manually re-enabled");
        }
    }
}
