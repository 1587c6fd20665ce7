//! In-process health ledger backed by a sharded concurrent map.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::{
    HealthLedger, HealthStatus, ProviderError, ProviderHealthState, DEFAULT_UNHEALTHY_THRESHOLD,
};
use crate::ProviderId;

/// Process-local [`HealthLedger`].
///
/// Each provider's state sits behind its own map entry, so concurrent
/// requests recording outcomes for different providers never contend and
/// a single provider's counter update is atomic.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug)]
pub struct InMemoryHealthLedger {
    states: DashMap<ProviderId, ProviderHealthState>,
    unhealthy_threshold: u32,
}

impl Default for InMemoryHealthLedger {
    fn default() -> Self {
        Self::new(DEFAULT_UNHEALTHY_THRESHOLD)
    }
}

impl InMemoryHealthLedger {
    /// Create an empty ledger; every provider starts healthy.
    ///
    /// # Arguments
    ///
    /// * `unhealthy_threshold` — consecutive failures at which a provider is
    ///   classified unhealthy. `0` is treated as `1`.
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            states: DashMap::new(),
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    /// The configured unhealthy threshold.
    pub fn unhealthy_threshold(&self) -> u32 {
        self.unhealthy_threshold
    }
}

impl HealthLedger for InMemoryHealthLedger {
    fn record_success(&self, provider: ProviderId, at: DateTime<Utc>) {
        let mut entry = self.states.entry(provider).or_default();
        let previous = entry.status(self.unhealthy_threshold);
        entry.consecutive_failures = 0;
        entry.last_success_at = Some(at);
        drop(entry);

        if previous != HealthStatus::Healthy {
            info!(
                target: "router::health",
                provider = %provider,
                previous = previous.as_str(),
                "provider recovered"
            );
        } else {
            debug!(target: "router::health", provider = %provider, "success recorded");
        }
    }

    fn record_failure_at(&self, provider: ProviderId, message: &str, at: DateTime<Utc>) {
        let mut entry = self.states.entry(provider).or_default();
        let previous = entry.status(self.unhealthy_threshold);
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(ProviderError {
            message: message.to_string(),
            at,
        });
        let failures = entry.consecutive_failures;
        let current = entry.status(self.unhealthy_threshold);
        drop(entry);

        if current == HealthStatus::Unhealthy && previous != HealthStatus::Unhealthy {
            warn!(
                target: "router::health",
                provider = %provider,
                consecutive_failures = failures,
                "provider marked unhealthy"
            );
        } else {
            debug!(
                target: "router::health",
                provider = %provider,
                consecutive_failures = failures,
                "failure recorded"
            );
        }
    }

    fn state(&self, provider: ProviderId) -> ProviderHealthState {
        self.states
            .get(&provider)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    fn status(&self, provider: ProviderId) -> HealthStatus {
        self.states
            .get(&provider)
            .map_or(HealthStatus::Healthy, |s| {
                s.status(self.unhealthy_threshold)
            })
    }

    fn reset(&self) {
        self.states.clear();
        info!(target: "router::health", "health ledger reset");
    }
}
