//! Router configuration loading.
//!
//! ## Responsibility
//! Turn operator TOML into a [`RouterConfig`] the routing engine can use
//! as-is: parse, validate, then canonicalise workflow stage labels so
//! `Launch`, ` launch` and `launch` are one stage.
//!
//! ## Guarantees
//! - A loaded config is validated and its stage labels are canonical
//! - Conflicting stage labels (`Launch = "precision"` next to
//!   `launch = "deep_analysis"`) are rejected, never silently merged
//! - The source name (file path or `ROUTER_CONFIG`) is in every error
//! - Profiles whose chain names no enabled provider are logged at `warn`
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)
//! - Reading API keys (backends read the variables named in
//!   `[providers.<id>]`)

use std::path::Path;

use tracing::{info, warn};

use super::validation::{self, ConfigError};
use super::RouterConfig;
use crate::routing::Profile;

/// Environment variable naming the router config file.
pub const CONFIG_PATH_ENV: &str = "ROUTER_CONFIG";

/// Load the config named by [`CONFIG_PATH_ENV`], or defaults when it is
/// unset or empty.
///
/// # Errors
///
/// Same as [`load_from_file`] when the variable names a file.
pub fn load_from_env() -> Result<RouterConfig, ConfigError> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => load_from_file(Path::new(path.trim())),
        _ => {
            info!(target: "router::config", "{CONFIG_PATH_ENV} not set; using defaults");
            Ok(RouterConfig::default())
        }
    }
}

/// Load a [`RouterConfig`] from a TOML file.
///
/// # Errors
///
/// - [`ConfigError::Io`] if the file cannot be read.
/// - [`ConfigError::Parse`] if the TOML is malformed or names an unknown
///   provider or profile.
/// - [`ConfigError::Validation`] with every violated constraint.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_llm_router::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("router.example.toml"))?;
/// println!("call timeout: {}ms", config.execution.call_timeout_ms);
/// ```
pub fn load_from_file(path: &Path) -> Result<RouterConfig, ConfigError> {
    let source = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: source.clone(),
        source: e,
    })?;

    load_from_str(&content, &source)
}

/// Load a [`RouterConfig`] from TOML text; `source_name` labels errors
/// and logs.
///
/// # Errors
///
/// As [`load_from_file`], minus I/O.
pub fn load_from_str(content: &str, source_name: &str) -> Result<RouterConfig, ConfigError> {
    let mut config: RouterConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    // Validation sees the labels as written so conflicts can name both.
    validation::validate(&config).map_err(|errors| {
        let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
        ConfigError::Validation(format!("{source_name}: {}", lines.join("\n")))
    })?;

    config.routing.normalise_stage_profiles();
    warn_unreachable_profiles(&config, source_name);

    info!(
        target: "router::config",
        source = source_name,
        providers = ?config.enabled_providers(),
        stages = config.routing.stage_profiles.len(),
        "router config loaded"
    );
    Ok(config)
}

/// A profile whose chain names no enabled provider silently falls back to
/// the whole enabled set at routing time.
fn warn_unreachable_profiles(config: &RouterConfig, source_name: &str) {
    let enabled = config.enabled_providers();
    for profile in Profile::ALL {
        let chain = &config.profiles.get(profile).chain;
        if !chain.iter().any(|p| enabled.contains(p)) {
            warn!(
                target: "router::config",
                source = source_name,
                profile = profile.as_str(),
                "profile chain names no enabled provider; all enabled providers will be used"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Profile;
    use crate::ProviderId;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[routing]
follow_up_max_query_chars = 30

[routing.stage_profiles]
launch = "fast_creative"

[health]
unhealthy_threshold = 2

[execution]
call_timeout_ms = 15000
strict_override = true

[reasoning]
max_iterations = 1

[providers.perplexity]
enabled = false

[profiles.precision]
chain = ["gemini", "open_ai"]
temperature = 0.1

[profiles.precision.models]
gemini = "gemini-1.5-pro-002"
"#;

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "test")
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: valid config: {e}")));
        assert_eq!(config.routing.follow_up_max_query_chars, 30);
        assert_eq!(config.health.unhealthy_threshold, 2);
        assert_eq!(config.execution.call_timeout_ms, 15_000);
        assert!(config.execution.strict_override);
        assert_eq!(config.reasoning.max_iterations, 1);
        assert!(!config.providers.perplexity.enabled);
        assert_eq!(
            config.profiles.precision.chain,
            vec![ProviderId::Gemini, ProviderId::OpenAi]
        );
        assert_eq!(
            config.profiles.precision.model_for(ProviderId::Gemini),
            Some("gemini-1.5-pro-002")
        );
        assert_eq!(
            config.routing.stage_profiles.get("launch"),
            Some(&Profile::FastCreative)
        );
    }

    #[test]
    fn test_load_from_str_empty_is_default() {
        let config = load_from_str("", "empty.toml")
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: empty config: {e}")));
        assert_eq!(config, RouterConfig::default());
    }

    #[test]
    fn test_load_from_str_invalid_toml_returns_parse_error() {
        let result = load_from_str("not valid toml [[[", "bad.toml");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_str_validation_failure_returns_validation_error() {
        let result = load_from_str("[execution]\ncall_timeout_ms = 0\n", "zero.toml");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_from_str_unknown_provider_in_chain_fails_parse() {
        let toml_str = r#"
[profiles.baseline]
chain = ["mistral"]
"#;
        let result = load_from_str(toml_str, "unknown-provider.toml");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_str_profile_without_chain_fails_parse() {
        let toml_str = r#"
[profiles.baseline]
temperature = 0.4
"#;
        let result = load_from_str(toml_str, "no-chain.toml");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_str_source_name_appears_in_error() {
        let msg = load_from_str("invalid [[[", "my-source.toml")
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(msg.contains("my-source.toml"));
    }

    #[test]
    fn test_load_from_str_canonicalises_stage_labels() {
        let config = load_from_str(
            "[routing.stage_profiles]\n\"  Launch \" = \"fast_creative\"\n",
            "mixed-case.toml",
        )
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: load: {e}")));
        assert_eq!(
            config.routing.stage_profiles.get("launch"),
            Some(&Profile::FastCreative)
        );
        assert!(!config.routing.stage_profiles.contains_key("  Launch "));
    }

    #[test]
    fn test_load_from_str_conflicting_stage_labels_fail_validation() {
        let toml_str = r#"
[routing.stage_profiles]
Launch = "fast_creative"
launch = "precision"
"#;
        match load_from_str(toml_str, "conflict.toml") {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains("conflict.toml"));
                assert!(msg.contains("'Launch'"));
                assert!(msg.contains("'launch'"));
            }
            other => std::panic::panic_any(format!("expected validation error, got {other:?}")),
        }
    }

    #[test]
    fn test_load_from_str_chain_of_disabled_providers_still_loads() {
        let toml_str = r#"
[providers.gemini]
enabled = false

[profiles.precision]
chain = ["gemini"]
"#;
        let config = load_from_str(toml_str, "unreachable.toml")
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: load: {e}")));
        assert_eq!(config.profiles.precision.chain, vec![ProviderId::Gemini]);
    }

    #[test]
    fn test_load_from_env_reads_named_file_and_defaults_when_unset() {
        // Both cases in one test: the variable is process-wide.
        let mut file = tempfile::NamedTempFile::new()
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: tempfile: {e}")));
        file.write_all(VALID_TOML.as_bytes())
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: write: {e}")));

        std::env::set_var(CONFIG_PATH_ENV, file.path());
        let from_file = load_from_env();
        std::env::remove_var(CONFIG_PATH_ENV);
        let defaults = load_from_env();

        let from_file =
            from_file.unwrap_or_else(|e| std::panic::panic_any(format!("test: env load: {e}")));
        assert_eq!(from_file.health.unhealthy_threshold, 2);
        let defaults =
            defaults.unwrap_or_else(|e| std::panic::panic_any(format!("test: defaults: {e}")));
        assert_eq!(defaults, RouterConfig::default());
    }

    #[test]
    fn test_load_from_file_valid_toml_succeeds() {
        let dir = tempfile::tempdir()
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: tempdir: {e}")));
        let path = dir.path().join("router.toml");
        let mut f = std::fs::File::create(&path)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: create: {e}")));
        f.write_all(VALID_TOML.as_bytes())
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: write: {e}")));
        drop(f);

        let config = load_from_file(&path)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: load: {e}")));
        assert_eq!(config.health.unhealthy_threshold, 2);
    }

    #[test]
    fn test_load_from_file_missing_file_returns_io_error() {
        let result = load_from_file(Path::new("/nonexistent/path/router.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_from_file_invalid_values_returns_validation_error() {
        let dir = tempfile::tempdir()
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: tempdir: {e}")));
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "[reasoning]\nconvergence_threshold = 3.0\n")
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: write: {e}")));

        let result = load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
