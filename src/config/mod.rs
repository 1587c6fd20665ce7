//! # Stage: Declarative Router Configuration
//!
//! ## Responsibility
//! Parse and validate the TOML file that configures the router: follow-up
//! thresholds, the profile table, health threshold, call timeout, the
//! reasoning pass and per-provider settings.
//! ```text
//! ROUTER_CONFIG=router.toml cargo run
//! ```
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `RouterConfig`
//! - Total defaults: an empty file is a valid configuration
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building backends from config (that belongs to `backend`)
//! - Reading API keys (backends read the env var named here)

pub mod loader;
pub mod validation;

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::health::DEFAULT_UNHEALTHY_THRESHOLD;
use crate::ProviderId;

pub use crate::routing::{ExtraPhrases, ProfileSettings, ProfilesConfig, RoutingConfig};
pub use validation::ConfigError;

// ── Default value functions ──────────────────────────────────────────────

/// Default consecutive-failure threshold: 3.
fn default_unhealthy_threshold() -> u32 {
    DEFAULT_UNHEALTHY_THRESHOLD
}

/// Default per-call timeout: 60 000ms.
fn default_call_timeout_ms() -> u64 {
    60_000
}

/// Default number of refinement iterations after the draft: 2.
fn default_max_iterations() -> usize {
    2
}

/// Default draft-to-draft similarity at which refinement stops: 0.92.
fn default_convergence_threshold() -> f64 {
    0.92
}

/// Default refinement temperature: 0.3.
fn default_refinement_temperature() -> f32 {
    0.3
}

/// Default enabled state: true.
fn default_true() -> bool {
    true
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a router instance.
///
/// Every section has defaults, so an empty TOML file is valid.
///
/// # Example
///
/// ```toml
/// [health]
/// unhealthy_threshold = 3
///
/// [execution]
/// call_timeout_ms = 30000
///
/// [providers.perplexity]
/// enabled = false
///
/// [profiles.precision]
/// chain = ["open_ai", "gemini"]
/// temperature = 0.1
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RouterConfig {
    /// Classifier and follow-up settings.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Health ledger settings.
    #[serde(default)]
    pub health: HealthConfig,
    /// Fallback execution settings.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Reasoning pass settings.
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    /// Per-provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Profile → provider table.
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

impl RouterConfig {
    /// Providers with `enabled = true`, in [`ProviderId::ALL`] order.
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|p| self.providers.get(*p).enabled)
            .collect()
    }

    /// Provider-level default models that are explicitly configured.
    pub fn provider_models(&self) -> BTreeMap<ProviderId, String> {
        ProviderId::ALL
            .into_iter()
            .filter_map(|p| {
                self.providers
                    .get(p)
                    .default_model
                    .clone()
                    .map(|model| (p, model))
            })
            .collect()
    }
}

// ── Health ───────────────────────────────────────────────────────────────

/// Health ledger settings.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct HealthConfig {
    /// Consecutive failures at which a provider becomes unhealthy.
    ///
    /// Default: `3`.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

// ── Execution ────────────────────────────────────────────────────────────

/// Fallback execution settings.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExecutionConfig {
    /// Upper bound for a single generation call. A timeout is a failure.
    ///
    /// Default: `60000`.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// When `true`, a request that overrides its provider only tries that
    /// provider and never falls back.
    ///
    /// Default: `false`.
    #[serde(default)]
    pub strict_override: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            strict_override: false,
        }
    }
}

// ── Reasoning ────────────────────────────────────────────────────────────

/// Reasoning pass settings.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ReasoningConfig {
    /// Refinement iterations after the initial draft.
    ///
    /// Default: `2`.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Word-set similarity between successive drafts at which refinement
    /// stops early. Range `[0.0, 1.0]`.
    ///
    /// Default: `0.92`.
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,

    /// Sampling temperature for refinement turns.
    ///
    /// Default: `0.3`.
    #[serde(default = "default_refinement_temperature")]
    pub refinement_temperature: f32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
            refinement_temperature: default_refinement_temperature(),
        }
    }
}

// ── Providers ────────────────────────────────────────────────────────────

/// Settings for one provider.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProviderConfig {
    /// Disabled providers are removed from every fallback chain.
    ///
    /// Default: `true`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model used when a profile names none for this provider.
    #[serde(default)]
    pub default_model: Option<String>,

    /// API base URL override (e.g. a proxy or a mock server).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key. Defaults to the
    /// provider's conventional variable (`OPENAI_API_KEY`, …).
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_model: None,
            base_url: None,
            api_key_env: None,
        }
    }
}

impl ProviderConfig {
    /// Effective API key variable for `provider`.
    pub fn api_key_env_for(&self, provider: ProviderId) -> String {
        self.api_key_env
            .clone()
            .unwrap_or_else(|| provider.default_api_key_env().to_string())
    }

    /// Effective base URL for `provider`.
    pub fn base_url_for(&self, provider: ProviderId) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| provider.default_base_url().to_string())
    }
}

/// Per-provider settings, one table per [`ProviderId`].
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProvidersConfig {
    /// `[providers.open_ai]`
    #[serde(default)]
    pub open_ai: ProviderConfig,
    /// `[providers.anthropic]`
    #[serde(default)]
    pub anthropic: ProviderConfig,
    /// `[providers.gemini]`
    #[serde(default)]
    pub gemini: ProviderConfig,
    /// `[providers.perplexity]`
    #[serde(default)]
    pub perplexity: ProviderConfig,
}

impl ProvidersConfig {
    /// Settings for `provider`.
    pub fn get(&self, provider: ProviderId) -> &ProviderConfig {
        match provider {
            ProviderId::OpenAi => &self.open_ai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Gemini => &self.gemini,
            ProviderId::Perplexity => &self.perplexity,
        }
    }
}

// ── Schema export ────────────────────────────────────────────────────────

/// Export the JSON Schema for [`RouterConfig`].
///
/// # Errors
///
/// Returns a `serde_json::Error` if the schema cannot be serialised.
///
/// # Panics
///
/// This function never panics.
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(RouterConfig);
    serde_json::to_string_pretty(&schema)
}
