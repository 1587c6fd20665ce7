//! Provider identities.
//!
//! The set of upstream generation backends is closed: adding a backend means
//! adding a variant here, implementing [`crate::GenerationBackend`] for it,
//! and listing it in the profile tables of [`crate::config::RouterConfig`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One upstream text-generation backend.
///
/// # Panics
///
/// This type never panics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// OpenAI chat completions (GPT-4o family).
    OpenAi,
    /// Anthropic messages API (Claude family).
    Anthropic,
    /// Google Gemini `generateContent` API.
    Gemini,
    /// Perplexity's OpenAI-compatible API (search-grounded Sonar models).
    Perplexity,
}

impl ProviderId {
    /// Every provider, in declaration order.
    pub const ALL: [ProviderId; 4] = [
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::Gemini,
        ProviderId::Perplexity,
    ];

    /// Stable lowercase label used in logs, metrics and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "open_ai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Perplexity => "perplexity",
        }
    }

    /// Model used when neither the profile table nor an override names one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::Gemini => "gemini-1.5-flash",
            Self::Perplexity => "sonar",
        }
    }

    /// Environment variable holding the provider's API key by default.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Perplexity => "PERPLEXITY_API_KEY",
        }
    }

    /// Public API base URL.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::Perplexity => "https://api.perplexity.ai",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
