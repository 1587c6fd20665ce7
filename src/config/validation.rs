//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`RouterConfig`] that cannot
//! be expressed through the type system alone (range checks, at least one
//! enabled provider, well-formed profile chains).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::RouterConfig;
use crate::routing;
use crate::ProviderId;

/// Upper bound on refinement iterations per reasoning pass.
pub const MAX_REASONING_ITERATIONS: usize = 8;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "execution.call_timeout_ms").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Validate all semantic constraints on a [`RouterConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Arguments
///
/// * `config` — The parsed config to validate.
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &RouterConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Health ───────────────────────────────────────────────────────
    if config.health.unhealthy_threshold == 0 {
        errors.push(ConfigError::InvalidField {
            field: "health.unhealthy_threshold".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    // ── Execution ────────────────────────────────────────────────────
    if config.execution.call_timeout_ms == 0 {
        errors.push(ConfigError::InvalidField {
            field: "execution.call_timeout_ms".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    // ── Reasoning ────────────────────────────────────────────────────
    if config.reasoning.max_iterations > MAX_REASONING_ITERATIONS {
        errors.push(ConfigError::InvalidField {
            field: "reasoning.max_iterations".into(),
            value: config.reasoning.max_iterations.to_string(),
            reason: format!("must be \u{2264} {MAX_REASONING_ITERATIONS}"),
        });
    }

    let threshold = config.reasoning.convergence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        errors.push(ConfigError::InvalidField {
            field: "reasoning.convergence_threshold".into(),
            value: threshold.to_string(),
            reason: "must be between 0.0 and 1.0".into(),
        });
    }

    let temp = config.reasoning.refinement_temperature;
    if !(0.0..=2.0).contains(&temp) {
        errors.push(ConfigError::InvalidField {
            field: "reasoning.refinement_temperature".into(),
            value: temp.to_string(),
            reason: "must be between 0.0 and 2.0".into(),
        });
    }

    // ── Providers ────────────────────────────────────────────────────
    if config.enabled_providers().is_empty() {
        errors.push(ConfigError::Validation(
            "at least one provider must be enabled".into(),
        ));
    }

    for provider in ProviderId::ALL {
        let settings = config.providers.get(provider);

        if let Some(model) = &settings.default_model {
            if model.trim().is_empty() {
                errors.push(ConfigError::InvalidField {
                    field: format!("providers.{provider}.default_model"),
                    value: format!("'{model}'"),
                    reason: "must not be empty".into(),
                });
            }
        }

        if let Some(url) = &settings.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ConfigError::InvalidField {
                    field: format!("providers.{provider}.base_url"),
                    value: format!("'{url}'"),
                    reason: "must start with http:// or https://".into(),
                });
            }
        }

        if let Some(var) = &settings.api_key_env {
            if var.trim().is_empty() {
                errors.push(ConfigError::InvalidField {
                    field: format!("providers.{provider}.api_key_env"),
                    value: "''".into(),
                    reason: "must name an environment variable".into(),
                });
            }
        }
    }

    // ── Routing + profiles ───────────────────────────────────────────
    errors.extend(
        routing::config::validate(&config.routing, &config.profiles)
            .into_iter()
            .map(ConfigError::Validation),
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn valid_config() -> RouterConfig {
        RouterConfig::default()
    }

    fn assert_field_error(config: &RouterConfig, field: &str) {
        let errors = validate(config)
            .err()
            .unwrap_or_else(|| std::panic::panic_any(format!("test: expected error for {field}")));
        assert!(
            errors.iter().any(
                |e| matches!(e, ConfigError::InvalidField { field: f, .. } if f == field)
            ),
            "expected InvalidField for {field}, got {errors:?}"
        );
    }

    #[test]
    fn test_validate_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_unhealthy_threshold_zero_fails() {
        let mut cfg = valid_config();
        cfg.health.unhealthy_threshold = 0;
        assert_field_error(&cfg, "health.unhealthy_threshold");
    }

    #[test]
    fn test_validate_call_timeout_zero_fails() {
        let mut cfg = valid_config();
        cfg.execution.call_timeout_ms = 0;
        assert_field_error(&cfg, "execution.call_timeout_ms");
    }

    #[test]
    fn test_validate_max_iterations_above_bound_fails() {
        let mut cfg = valid_config();
        cfg.reasoning.max_iterations = MAX_REASONING_ITERATIONS + 1;
        assert_field_error(&cfg, "reasoning.max_iterations");
    }

    #[test]
    fn test_validate_max_iterations_zero_passes() {
        let mut cfg = valid_config();
        cfg.reasoning.max_iterations = 0;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_validate_convergence_above_1_fails() {
        let mut cfg = valid_config();
        cfg.reasoning.convergence_threshold = 1.5;
        assert_field_error(&cfg, "reasoning.convergence_threshold");
    }

    #[test]
    fn test_validate_convergence_negative_fails() {
        let mut cfg = valid_config();
        cfg.reasoning.convergence_threshold = -0.1;
        assert_field_error(&cfg, "reasoning.convergence_threshold");
    }

    #[test]
    fn test_validate_convergence_one_passes() {
        let mut cfg = valid_config();
        cfg.reasoning.convergence_threshold = 1.0;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_validate_refinement_temperature_above_2_fails() {
        let mut cfg = valid_config();
        cfg.reasoning.refinement_temperature = 2.5;
        assert_field_error(&cfg, "reasoning.refinement_temperature");
    }

    #[test]
    fn test_validate_all_providers_disabled_fails() {
        let mut cfg = valid_config();
        let off = ProviderConfig {
            enabled: false,
            ..ProviderConfig::default()
        };
        cfg.providers.open_ai = off.clone();
        cfg.providers.anthropic = off.clone();
        cfg.providers.gemini = off.clone();
        cfg.providers.perplexity = off;
        let errors = validate(&cfg).err().unwrap_or_default();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("at least one provider")));
    }

    #[test]
    fn test_validate_empty_default_model_fails() {
        let mut cfg = valid_config();
        cfg.providers.gemini.default_model = Some("  ".into());
        assert_field_error(&cfg, "providers.gemini.default_model");
    }

    #[test]
    fn test_validate_base_url_without_scheme_fails() {
        let mut cfg = valid_config();
        cfg.providers.open_ai.base_url = Some("api.openai.com".into());
        assert_field_error(&cfg, "providers.open_ai.base_url");
    }

    #[test]
    fn test_validate_base_url_http_passes() {
        let mut cfg = valid_config();
        cfg.providers.open_ai.base_url = Some("http://127.0.0.1:8080".into());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn test_validate_empty_api_key_env_fails() {
        let mut cfg = valid_config();
        cfg.providers.anthropic.api_key_env = Some(String::new());
        assert_field_error(&cfg, "providers.anthropic.api_key_env");
    }

    #[test]
    fn test_validate_profile_errors_are_included() {
        let mut cfg = valid_config();
        cfg.profiles.baseline.chain.clear();
        let errors = validate(&cfg).err().unwrap_or_default();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("profiles.baseline.chain")));
    }

    #[test]
    fn test_validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.health.unhealthy_threshold = 0;
        cfg.execution.call_timeout_ms = 0;
        cfg.reasoning.convergence_threshold = 7.0;
        cfg.routing.follow_up_lookback = 0;
        let errors = validate(&cfg).err().unwrap_or_default();
        assert!(errors.len() >= 4, "expected >=4 errors, got {}", errors.len());
    }

    #[test]
    fn test_config_error_invalid_field_display() {
        let err = ConfigError::InvalidField {
            field: "execution.call_timeout_ms".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("execution.call_timeout_ms"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn test_config_error_validation_display() {
        let err = ConfigError::Validation("something broke".into());
        assert!(err.to_string().contains("something broke"));
    }

    #[test]
    fn test_config_error_io_display() {
        let err = ConfigError::Io {
            file: "router.toml".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("router.toml"));
    }
}
