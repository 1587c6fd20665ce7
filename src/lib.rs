//! # tokio-llm-router
//!
//! Request routing and resilience for a content-generation platform that
//! fronts several interchangeable LLM backends.
//!
//! ## Architecture
//!
//! ```text
//! RoutingRequest → RoutingEngine(route) ──reads──▶ HealthLedger
//!                        │                              ▲
//!                        ▼                              │ record_success / record_failure
//!                 RoutingDecision → FallbackExecutor ───┘
//!                                        │
//!                         ReasoningPass ─┴─ direct GenerationBackend call
//! ```
//!
//! The only shared mutable state is the [`health::HealthLedger`]. Every
//! generation call runs on its own Tokio task with a bounded timeout.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod backend;
pub mod config;
pub mod execution;
pub mod health;
pub mod metrics;
pub mod provider;
pub mod reasoning;
pub mod request;
pub mod routing;
pub mod service;

// Re-exports for convenience
pub use backend::{
    AnthropicBackend, BackendRegistry, EchoBackend, GeminiBackend, GenerationBackend,
    GenerationParams, OpenAiBackend,
};
pub use execution::{AttemptOutcome, AttemptRecord, ExecutionOutcome, FallbackExecutor};
pub use health::{HealthLedger, HealthStatus, InMemoryHealthLedger, ProviderHealthState};
pub use provider::ProviderId;
pub use reasoning::{ReasoningOutput, ReasoningPass, ReasoningTrace};
pub use request::{ConversationTurn, Role, RoutingOverride, RoutingRequest, StageHint};
pub use routing::{Candidate, Profile, RoutingDecision, RoutingEngine};
pub use service::ContentRouter;

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for log aggregators
/// - anything else (including unset) — human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`RouterError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Example
///
/// ```no_run
/// # use tokio_llm_router::{init_tracing, RouterError};
/// # fn example() -> Result<(), RouterError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), RouterError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| RouterError::Other(format!("tracing init failed: {e}")))
}

/// Top-level router errors.
///
/// Only [`RouterError::AllProvidersExhausted`] and
/// [`RouterError::InvalidRequest`] ever reach a caller of
/// [`ContentRouter::handle`]; per-attempt failures stay inside the
/// execution loop and its logs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    /// One backend attempt was rejected, failed, or timed out.
    #[error("provider {provider} call failed: {message}")]
    ProviderCall {
        /// Provider that was attempted.
        provider: ProviderId,
        /// Diagnostic message from the backend or the timeout guard.
        message: String,
    },

    /// A reasoning-pass iteration failed part way through the pass.
    #[error("reasoning pass on {provider} aborted at iteration {iteration}: {message}")]
    ReasoningAborted {
        /// Provider the pass was running against.
        provider: ProviderId,
        /// Zero-based iteration that failed (0 is the initial draft).
        iteration: usize,
        /// Underlying failure message.
        message: String,
    },

    /// Every candidate in the fallback chain failed.
    #[error("all {attempts} provider attempts failed; last error: {last_error}")]
    AllProvidersExhausted {
        /// Number of attempts made (one per candidate).
        attempts: usize,
        /// Most recent failure message, for diagnostics.
        last_error: String,
    },

    /// The request was rejected before routing (e.g. empty query).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A configuration value is missing or invalid (e.g., missing API key).
    ///
    /// Returned at construction time so misconfiguration surfaces before the
    /// first generation call.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

impl RouterError {
    /// Short, stable label for span fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderCall { .. } => "provider_call",
            Self::ReasoningAborted { .. } => "reasoning_aborted",
            Self::AllProvidersExhausted { .. } => "all_providers_exhausted",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ConfigError(_) => "config",
            Self::Other(_) => "other",
        }
    }

    /// Fold an attempt-level error into a [`RouterError::ProviderCall`]
    /// against `provider`, so aborted reasoning passes share the same
    /// bookkeeping as plain generation failures.
    pub fn into_provider_call(self, provider: ProviderId) -> Self {
        match self {
            Self::ProviderCall { .. } => self,
            other => Self::ProviderCall {
                provider,
                message: other.to_string(),
            },
        }
    }
}
