//! Routing configuration types.
//!
//! Provides [`RoutingConfig`] for follow-up detection and workflow-stage
//! hints, and the static profile table ([`ProfilesConfig`]) mapping each
//! [`Profile`] to a preferred provider ordering, per-provider models and
//! generation parameters. All fields have defaults and are (de)serialisable
//! via serde for TOML/JSON config files.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ProviderId;

// ── Profile ────────────────────────────────────────────────────────────

/// Request profile chosen by the classifier.
///
/// # Panics
///
/// This type never panics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Comparative, competitive, or completeness-oriented analysis.
    DeepAnalysis,
    /// Copywriting and other creative output.
    FastCreative,
    /// Technical or quantitative work.
    Precision,
    /// Nothing matched.
    Baseline,
}

impl Profile {
    /// Every profile, in classifier tie-break order.
    pub const ALL: [Profile; 4] = [
        Profile::DeepAnalysis,
        Profile::FastCreative,
        Profile::Precision,
        Profile::Baseline,
    ];

    /// Stable lowercase label used in logs, metrics and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepAnalysis => "deep_analysis",
            Self::FastCreative => "fast_creative",
            Self::Precision => "precision",
            Self::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Default value functions ────────────────────────────────────────────

/// Queries shorter than this many characters may be follow-ups.
fn default_follow_up_max_query_chars() -> usize {
    40
}

/// A prior assistant turn longer than this many characters marks a
/// follow-up candidate.
fn default_follow_up_min_assistant_chars() -> usize {
    500
}

/// How many trailing history turns are inspected for a long answer.
fn default_follow_up_lookback() -> usize {
    4
}

/// Default workflow stage → profile hints.
fn default_stage_profiles() -> BTreeMap<String, Profile> {
    [
        ("research", Profile::DeepAnalysis),
        ("competitive_analysis", Profile::DeepAnalysis),
        ("strategy", Profile::DeepAnalysis),
        ("content_creation", Profile::FastCreative),
        ("copywriting", Profile::FastCreative),
        ("analytics", Profile::Precision),
        ("reporting", Profile::Precision),
    ]
    .into_iter()
    .map(|(stage, profile)| (stage.to_string(), profile))
    .collect()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

// ── RoutingConfig ──────────────────────────────────────────────────────

/// Configuration for the routing decision engine.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RoutingConfig {
    /// Queries below this character count can be short follow-ups.
    ///
    /// Default: `40`.
    #[serde(default = "default_follow_up_max_query_chars")]
    pub follow_up_max_query_chars: usize,

    /// Minimum length of a prior assistant turn that makes a short query a
    /// follow-up.
    ///
    /// Default: `500`.
    #[serde(default = "default_follow_up_min_assistant_chars")]
    pub follow_up_min_assistant_chars: usize,

    /// Number of trailing history turns inspected. Default: `4`.
    #[serde(default = "default_follow_up_lookback")]
    pub follow_up_lookback: usize,

    /// Workflow stage label → profile that receives one extra point.
    #[serde(default = "default_stage_profiles")]
    pub stage_profiles: BTreeMap<String, Profile>,

    /// Operator-supplied phrases appended to the built-in phrase table.
    #[serde(default)]
    pub extra_phrases: ExtraPhrases,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            follow_up_max_query_chars: default_follow_up_max_query_chars(),
            follow_up_min_assistant_chars: default_follow_up_min_assistant_chars(),
            follow_up_lookback: default_follow_up_lookback(),
            stage_profiles: default_stage_profiles(),
            extra_phrases: ExtraPhrases::default(),
        }
    }
}

impl RoutingConfig {
    /// Rewrite `stage_profiles` keys to their [`stage_key`] form.
    ///
    /// When two keys collapse to the same label the first in key order
    /// wins; [`validate`] reports such collisions when they disagree.
    pub fn normalise_stage_profiles(&mut self) {
        let raw = std::mem::take(&mut self.stage_profiles);
        for (stage, profile) in raw {
            self.stage_profiles.entry(stage_key(&stage)).or_insert(profile);
        }
    }
}

/// Canonical form of a workflow stage label: trimmed and lowercase.
pub fn stage_key(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Additional classifier phrases per profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExtraPhrases {
    /// Extra "deep analysis" phrases.
    #[serde(default)]
    pub deep_analysis: Vec<String>,
    /// Extra "fast creative" phrases.
    #[serde(default)]
    pub fast_creative: Vec<String>,
    /// Extra "precision" phrases.
    #[serde(default)]
    pub precision: Vec<String>,
}

// ── Profile table ──────────────────────────────────────────────────────

/// Routing settings for one profile.
///
/// `chain` is required whenever a profile table is written out explicitly;
/// the remaining fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProfileSettings {
    /// Preferred provider ordering before health reordering.
    pub chain: Vec<ProviderId>,
    /// Model per provider label (`open_ai`, `anthropic`, …). Providers
    /// without an entry use their provider-level default model.
    #[serde(default)]
    pub models: BTreeMap<String, String>,
    /// Sampling temperature for direct calls and initial drafts.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens per generation call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// System prompt used for this profile.
    #[serde(default)]
    pub system_prompt: String,
}

impl ProfileSettings {
    fn build(
        chain: &[ProviderId],
        models: &[(ProviderId, &str)],
        temperature: f32,
        max_tokens: u32,
        system_prompt: &str,
    ) -> Self {
        Self {
            chain: chain.to_vec(),
            models: models
                .iter()
                .map(|(p, m)| (p.as_str().to_string(), (*m).to_string()))
                .collect(),
            temperature,
            max_tokens,
            system_prompt: system_prompt.to_string(),
        }
    }

    /// Default settings for [`Profile::DeepAnalysis`].
    pub fn deep_analysis() -> Self {
        Self::build(
            &[
                ProviderId::Anthropic,
                ProviderId::OpenAi,
                ProviderId::Gemini,
                ProviderId::Perplexity,
            ],
            &[
                (ProviderId::Anthropic, "claude-3-5-sonnet-latest"),
                (ProviderId::OpenAi, "gpt-4o"),
                (ProviderId::Gemini, "gemini-1.5-pro"),
                (ProviderId::Perplexity, "sonar-pro"),
            ],
            0.5,
            4096,
            "You are a senior marketing strategist. Produce structured, evidence-backed analysis.",
        )
    }

    /// Default settings for [`Profile::FastCreative`].
    pub fn fast_creative() -> Self {
        Self::build(
            &[ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::Gemini],
            &[
                (ProviderId::OpenAi, "gpt-4o-mini"),
                (ProviderId::Anthropic, "claude-3-5-haiku-latest"),
                (ProviderId::Gemini, "gemini-1.5-flash"),
            ],
            0.9,
            1024,
            "You are a creative marketing copywriter.",
        )
    }

    /// Default settings for [`Profile::Precision`].
    pub fn precision() -> Self {
        Self::build(
            &[ProviderId::OpenAi, ProviderId::Gemini, ProviderId::Anthropic],
            &[
                (ProviderId::OpenAi, "gpt-4o"),
                (ProviderId::Gemini, "gemini-1.5-pro"),
                (ProviderId::Anthropic, "claude-3-5-sonnet-latest"),
            ],
            0.2,
            2048,
            "You are a precise marketing analyst. Show figures and assumptions explicitly.",
        )
    }

    /// Default settings for [`Profile::Baseline`].
    pub fn baseline() -> Self {
        Self::build(
            &[ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::Gemini],
            &[
                (ProviderId::OpenAi, "gpt-4o-mini"),
                (ProviderId::Anthropic, "claude-3-5-haiku-latest"),
                (ProviderId::Gemini, "gemini-1.5-flash"),
            ],
            0.7,
            2048,
            "You are a helpful marketing assistant.",
        )
    }

    /// Model configured for `provider` in this profile, if any.
    pub fn model_for(&self, provider: ProviderId) -> Option<&str> {
        self.models.get(provider.as_str()).map(String::as_str)
    }
}

/// Static profile → routing table.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProfilesConfig {
    /// Settings for [`Profile::DeepAnalysis`].
    #[serde(default = "ProfileSettings::deep_analysis")]
    pub deep_analysis: ProfileSettings,
    /// Settings for [`Profile::FastCreative`].
    #[serde(default = "ProfileSettings::fast_creative")]
    pub fast_creative: ProfileSettings,
    /// Settings for [`Profile::Precision`].
    #[serde(default = "ProfileSettings::precision")]
    pub precision: ProfileSettings,
    /// Settings for [`Profile::Baseline`].
    #[serde(default = "ProfileSettings::baseline")]
    pub baseline: ProfileSettings,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            deep_analysis: ProfileSettings::deep_analysis(),
            fast_creative: ProfileSettings::fast_creative(),
            precision: ProfileSettings::precision(),
            baseline: ProfileSettings::baseline(),
        }
    }
}

impl ProfilesConfig {
    /// Settings for `profile`.
    pub fn get(&self, profile: Profile) -> &ProfileSettings {
        match profile {
            Profile::DeepAnalysis => &self.deep_analysis,
            Profile::FastCreative => &self.fast_creative,
            Profile::Precision => &self.precision,
            Profile::Baseline => &self.baseline,
        }
    }
}

/// Validate routing settings and the profile table, returning a list of
/// human-readable errors.
///
/// # Arguments
///
/// * `config` — Routing settings.
/// * `profiles` — The profile table.
///
/// # Returns
///
/// An empty `Vec` on success, or one error string per violated constraint.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &RoutingConfig, profiles: &ProfilesConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.follow_up_lookback == 0 {
        errors.push("routing.follow_up_lookback must be at least 1, got 0".to_string());
    }

    let mut stages: BTreeMap<String, (&str, Profile)> = BTreeMap::new();
    for (stage, profile) in &config.stage_profiles {
        let key = stage_key(stage);
        if key.is_empty() {
            errors.push("routing.stage_profiles has an empty stage label".to_string());
            continue;
        }
        match stages.get(&key) {
            Some((other, existing)) if *existing != *profile => errors.push(format!(
                "routing.stage_profiles labels '{other}' and '{stage}' name the same stage \
                 with different profiles"
            )),
            Some(_) => {}
            None => {
                stages.insert(key, (stage.as_str(), *profile));
            }
        }
    }

    for profile in Profile::ALL {
        let settings = profiles.get(profile);
        let path = format!("profiles.{profile}");

        if settings.chain.is_empty() {
            errors.push(format!("{path}.chain must name at least one provider"));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &settings.chain {
            if !seen.insert(provider) {
                errors.push(format!("{path}.chain lists {provider} more than once"));
            }
        }

        for key in settings.models.keys() {
            if !ProviderId::ALL.iter().any(|p| p.as_str() == key) {
                errors.push(format!("{path}.models has unknown provider '{key}'"));
            }
        }

        if !(0.0..=2.0).contains(&settings.temperature) {
            errors.push(format!(
                "{path}.temperature must be in [0.0, 2.0], got {}",
                settings.temperature
            ));
        }

        if settings.max_tokens == 0 {
            errors.push(format!("{path}.max_tokens must be at least 1, got 0"));
        }
    }

    errors
}

// ── Tests ──────────────────────────────────────────────────────────────
