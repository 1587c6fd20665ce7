//! Prometheus metrics for the router.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup **before** serving any
//! request. The helper functions (`inc_decision`, `inc_attempt`, …) are
//! no-ops if `init_metrics` was never called, so routing is always safe to
//! run and observability simply degrades gracefully.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `router_decisions_total` | Counter | `profile`, `reasoning` |
//! | `router_attempts_total` | Counter | `provider`, `outcome` |
//! | `router_fallbacks_total` | Counter | `provider` |
//! | `router_exhausted_total` | IntCounter | — |
//! | `router_call_duration_seconds` | Histogram | `provider` |
//! | `router_reasoning_iterations` | Histogram | `converged` |

use crate::RouterError;
use prometheus::{
    core::Collector, CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All Prometheus metrics for the router, bundled together so they can be
/// stored in a single [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Routing decisions by profile and reasoning flag.
    pub decisions_total: CounterVec,
    /// Provider attempts by outcome (`success`, `failure`, `skipped`).
    pub attempts_total: CounterVec,
    /// Requests served by a provider other than the first candidate.
    pub fallbacks_total: CounterVec,
    /// Requests where every candidate failed.
    pub exhausted_total: IntCounter,
    /// Wall time of one provider attempt.
    pub call_duration: HistogramVec,
    /// Draft iterations per reasoning pass.
    pub reasoning_iterations: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn register<C: Collector + Clone + 'static>(
    registry: &Registry,
    collector: Result<C, prometheus::Error>,
) -> Result<C, RouterError> {
    let collector =
        collector.map_err(|e| RouterError::Other(format!("metrics init failed: {e}")))?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| RouterError::Other(format!("metrics registration failed: {e}")))?;
    Ok(collector)
}

impl Metrics {
    /// Build a bundle whose metric names start with `prefix` and register it
    /// with a fresh registry.
    fn build(prefix: &str) -> Result<Self, RouterError> {
        let registry = Registry::new();
        let name = |suffix: &str| format!("{prefix}_{suffix}");

        let decisions_total = register(
            &registry,
            CounterVec::new(
                Opts::new(name("decisions_total"), "Routing decisions"),
                &["profile", "reasoning"],
            ),
        )?;
        let attempts_total = register(
            &registry,
            CounterVec::new(
                Opts::new(name("attempts_total"), "Provider attempts by outcome"),
                &["provider", "outcome"],
            ),
        )?;
        let fallbacks_total = register(
            &registry,
            CounterVec::new(
                Opts::new(
                    name("fallbacks_total"),
                    "Requests served by a fallback provider",
                ),
                &["provider"],
            ),
        )?;
        let exhausted_total = register(
            &registry,
            IntCounter::new(
                name("exhausted_total"),
                "Requests where every candidate failed",
            ),
        )?;
        let call_duration = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(
                    name("call_duration_seconds"),
                    "Duration of one provider attempt",
                )
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
                &["provider"],
            ),
        )?;
        let reasoning_iterations = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(
                    name("reasoning_iterations"),
                    "Drafts produced per reasoning pass",
                )
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 6.0, 9.0]),
                &["converged"],
            ),
        )?;

        Ok(Self {
            registry,
            decisions_total,
            attempts_total,
            fallbacks_total,
            exhausted_total,
            call_duration,
            reasoning_iterations,
        })
    }
}

// ── Initialisation ─────────────────────────────────────────────────────────

/// Initialise all Prometheus metrics and register them with a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`RouterError::Other`] if metric construction or registry
/// registration fails.
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), RouterError> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let bundle = Metrics::build("router")?;

    // A concurrent initialiser may win; both bundles are identical.
    let _ = METRICS.set(bundle);

    Ok(())
}

/// Return a reference to the initialised [`Metrics`], or `None` if
/// [`init_metrics`] has not been called yet.
fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Count one routing decision.
///
/// # Panics
///
/// This function never panics.
pub fn inc_decision(profile: &str, reasoning: bool) {
    if let Some(m) = metrics() {
        let flag = if reasoning { "true" } else { "false" };
        if let Ok(c) = m.decisions_total.get_metric_with_label_values(&[profile, flag]) {
            c.inc();
        }
    }
}

/// Count one provider attempt with its outcome.
///
/// # Panics
///
/// This function never panics.
pub fn inc_attempt(provider: &str, outcome: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .attempts_total
            .get_metric_with_label_values(&[provider, outcome])
        {
            c.inc();
        }
    }
}

/// Count one request served by fallback `provider`.
///
/// # Panics
///
/// This function never panics.
pub fn inc_fallback(provider: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.fallbacks_total.get_metric_with_label_values(&[provider]) {
            c.inc();
        }
    }
}

/// Count one exhausted request.
///
/// # Panics
///
/// This function never panics.
pub fn inc_exhausted() {
    if let Some(m) = metrics() {
        m.exhausted_total.inc();
    }
}

/// Record the wall time of one attempt against `provider`.
///
/// # Panics
///
/// This function never panics.
pub fn record_call_duration(provider: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.call_duration.get_metric_with_label_values(&[provider]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Record how many drafts one reasoning pass produced.
///
/// # Panics
///
/// This function never panics.
pub fn record_reasoning_iterations(drafts: usize, converged: bool) {
    if let Some(m) = metrics() {
        let flag = if converged { "true" } else { "false" };
        if let Ok(h) = m.reasoning_iterations.get_metric_with_label_values(&[flag]) {
            h.observe(drafts as f64);
        }
    }
}

/// Gather all metric families from the private registry.
///
/// Returns an empty `Vec` if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// A structured snapshot of the router's counters.
#[derive(Debug, Default)]
pub struct MetricsSummary {
    /// Decision counts keyed by `"profile:reasoning"`.
    pub decisions_total: HashMap<String, u64>,
    /// Attempt counts keyed by `"provider:outcome"`.
    pub attempts_total: HashMap<String, u64>,
    /// Fallback counts keyed by provider label.
    pub fallbacks_total: HashMap<String, u64>,
    /// Exhausted request count.
    pub exhausted_total: u64,
}

fn label<'a>(metric: &'a prometheus::proto::Metric, name: &str) -> &'a str {
    metric
        .get_label()
        .iter()
        .find(|l| l.get_name() == name)
        .map_or("unknown", |l| l.get_value())
}

fn summarise(m: &Metrics) -> MetricsSummary {
    let mut summary = MetricsSummary {
        exhausted_total: m.exhausted_total.get(),
        ..MetricsSummary::default()
    };

    for family in m.decisions_total.collect() {
        for metric in family.get_metric() {
            let key = format!("{}:{}", label(metric, "profile"), label(metric, "reasoning"));
            let value = metric.get_counter().get_value() as u64;
            summary.decisions_total.insert(key, value);
        }
    }

    for family in m.attempts_total.collect() {
        for metric in family.get_metric() {
            let key = format!("{}:{}", label(metric, "provider"), label(metric, "outcome"));
            let value = metric.get_counter().get_value() as u64;
            summary.attempts_total.insert(key, value);
        }
    }

    for family in m.fallbacks_total.collect() {
        for metric in family.get_metric() {
            let value = metric.get_counter().get_value() as u64;
            summary
                .fallbacks_total
                .insert(label(metric, "provider").to_string(), value);
        }
    }

    summary
}

/// Return a structured summary of current metric counter values.
///
/// Returns a zeroed [`MetricsSummary`] if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn get_metrics_summary() -> MetricsSummary {
    metrics().map(summarise).unwrap_or_default()
}
