//! # Stage: Provider Health Ledger
//!
//! ## Responsibility
//! Give every component a process-wide view of "is provider X worth trying
//! now", built only from call outcomes the execution loop reports.
//!
//! ## Guarantees
//! - Deterministic: [`HealthLedger::best_fallback_chain`] is a pure function
//!   of the current state and the preferred order.
//! - Reset, not decay: one success returns a provider to healthy no matter
//!   how many failures preceded it.
//! - Per-provider atomicity: a record call mutates exactly one provider's
//!   entry; no lock ever spans two providers.
//! - Ephemeral: state lives for the process lifetime and starts healthy.
//!
//! ## NOT Responsible For
//! - Making calls or probing providers (no I/O at all)
//! - Deciding which profile or model to use (that belongs to `routing`)

pub mod ledger;

pub use ledger::InMemoryHealthLedger;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ProviderId;

/// Default consecutive-failure count at which a provider becomes unhealthy.
pub const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 3;

/// Derived health classification.
///
/// Ordering follows preference: `Healthy < Degraded < Unhealthy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No failures since the last success.
    Healthy,
    /// Some failures, below the unhealthy threshold.
    Degraded,
    /// At or above the unhealthy threshold.
    Unhealthy,
}

impl HealthStatus {
    /// Lowercase label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// The most recent failure reported for a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderError {
    /// Failure message as reported by the execution loop.
    pub message: String,
    /// When the failure was recorded.
    pub at: DateTime<Utc>,
}

/// Reliability facts about one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderHealthState {
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Most recent failure, kept across successes for diagnostics.
    pub last_error: Option<ProviderError>,
    /// Most recent success.
    pub last_success_at: Option<DateTime<Utc>>,
}

impl ProviderHealthState {
    /// Classify this state against `unhealthy_threshold`.
    ///
    /// A threshold of `0` is treated as `1`.
    pub fn status(&self, unhealthy_threshold: u32) -> HealthStatus {
        let threshold = unhealthy_threshold.max(1);
        match self.consecutive_failures {
            0 => HealthStatus::Healthy,
            n if n < threshold => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}

/// Narrow interface over the process-wide health state.
///
/// The execution loop is the only writer; routing and execution read.
/// Implementations must be cheap to call and must never fail.
pub trait HealthLedger: Send + Sync {
    /// Reset `provider`'s failure count and stamp its last success.
    fn record_success(&self, provider: ProviderId, at: DateTime<Utc>);

    /// Increment `provider`'s failure count and remember `message` at `at`.
    fn record_failure_at(&self, provider: ProviderId, message: &str, at: DateTime<Utc>);

    /// Current state of `provider` (default state if never seen).
    fn state(&self, provider: ProviderId) -> ProviderHealthState;

    /// Derived status of `provider`.
    fn status(&self, provider: ProviderId) -> HealthStatus;

    /// Forget everything; every provider is healthy again.
    fn reset(&self);

    /// [`HealthLedger::record_failure_at`] stamped with the current time.
    fn record_failure(&self, provider: ProviderId, message: &str) {
        self.record_failure_at(provider, message, Utc::now());
    }

    /// Point-in-time copy of every provider's state, in [`ProviderId::ALL`]
    /// order. Providers never recorded appear with default state.
    fn snapshot(&self) -> Vec<(ProviderId, ProviderHealthState, HealthStatus)> {
        ProviderId::ALL
            .iter()
            .map(|&p| (p, self.state(p), self.status(p)))
            .collect()
    }

    /// Reorder `preferred` healthy → degraded → unhealthy.
    ///
    /// The sort is stable, so providers with equal status keep their
    /// original relative order. When every entry is unhealthy the chain is
    /// ordered least-recently-failed first instead, so the provider that has
    /// had the longest time to recover is tried first.
    fn best_fallback_chain(&self, preferred: &[ProviderId]) -> Vec<ProviderId> {
        let mut ranked: Vec<(ProviderId, HealthStatus, Option<DateTime<Utc>>)> = preferred
            .iter()
            .map(|&p| {
                let failed_at = self.state(p).last_error.map(|e| e.at);
                (p, self.status(p), failed_at)
            })
            .collect();

        let all_unhealthy =
            !ranked.is_empty() && ranked.iter().all(|(_, s, _)| *s == HealthStatus::Unhealthy);

        if all_unhealthy {
            // `None` sorts before `Some`, i.e. "never failed" counts as oldest.
            ranked.sort_by_key(|(_, _, failed_at)| *failed_at);
        } else {
            ranked.sort_by_key(|(_, status, _)| *status);
        }

        ranked.into_iter().map(|(p, _, _)| p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_zero_failures_is_healthy() {
        let state = ProviderHealthState::default();
        assert_eq!(state.status(3), HealthStatus::Healthy);
    }

    #[test]
    fn test_status_below_threshold_is_degraded() {
        let state = ProviderHealthState {
            consecutive_failures: 2,
            ..ProviderHealthState::default()
        };
        assert_eq!(state.status(3), HealthStatus::Degraded);
    }

    #[test]
    fn test_status_at_threshold_is_unhealthy() {
        let state = ProviderHealthState {
            consecutive_failures: 3,
            ..ProviderHealthState::default()
        };
        assert_eq!(state.status(3), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_status_zero_threshold_treated_as_one() {
        let state = ProviderHealthState {
            consecutive_failures: 1,
            ..ProviderHealthState::default()
        };
        assert_eq!(state.status(0), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_status_orders_by_preference() {
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Degraded < HealthStatus::Unhealthy);
    }
}
