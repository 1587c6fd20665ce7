//! Inbound request types.
//!
//! A transport handler (out of scope) translates its wire format into a
//! [`RoutingRequest`]; everything downstream works on this type only.

use serde::{Deserialize, Serialize};

use crate::{ProviderId, RouterError};

/// History turns included in a rendered prompt.
pub const PROMPT_HISTORY_TURNS: usize = 6;

/// Speaker of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user.
    User,
    /// A previous model answer.
    Assistant,
}

/// One prior turn of the conversation, oldest first in
/// [`RoutingRequest::history`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ConversationTurn {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Operator-supplied routing override.
///
/// Every field is optional; an empty override behaves like no override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingOverride {
    /// Start the fallback chain at this provider.
    pub provider: Option<ProviderId>,
    /// Use this model for the override provider.
    pub model: Option<String>,
    /// `Some(true)` forces the reasoning pass, `Some(false)` forbids it.
    pub reasoning: Option<bool>,
}

/// Opaque hint from the campaign workflow collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageHint {
    /// Stage label, e.g. `"research"` or `"content_creation"`.
    pub stage: String,
    /// Free-text context describing the stage.
    #[serde(default)]
    pub context: String,
}

/// One request to route and execute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    /// The user's query.
    pub query: String,
    /// Auxiliary context: retrieved research or prior conversation text.
    #[serde(default)]
    pub context: String,
    /// Recent conversation turns, oldest first.
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Optional manual override.
    #[serde(default)]
    pub manual_override: Option<RoutingOverride>,
    /// Optional workflow stage hint.
    #[serde(default)]
    pub stage_hint: Option<StageHint>,
}

impl RoutingRequest {
    /// Create a request with only a query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Attach auxiliary context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Attach conversation history (oldest first).
    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    /// Attach a manual override.
    pub fn with_override(mut self, manual_override: RoutingOverride) -> Self {
        self.manual_override = Some(manual_override);
        self
    }

    /// Attach a workflow stage hint.
    pub fn with_stage(mut self, stage: impl Into<String>, context: impl Into<String>) -> Self {
        self.stage_hint = Some(StageHint {
            stage: stage.into(),
            context: context.into(),
        });
        self
    }

    /// Override provider, if one was given.
    pub fn override_provider(&self) -> Option<ProviderId> {
        self.manual_override.as_ref().and_then(|o| o.provider)
    }

    /// Render the user prompt sent to a backend: context, stage hint, the
    /// last [`PROMPT_HISTORY_TURNS`] turns, then the query.
    pub fn render_prompt(&self) -> String {
        let mut out = String::new();

        if !self.context.trim().is_empty() {
            out.push_str("Context:\n");
            out.push_str(self.context.trim());
            out.push_str("\n\n");
        }

        if let Some(hint) = &self.stage_hint {
            if !hint.context.trim().is_empty() {
                out.push_str(&format!(
                    "Campaign stage ({}): {}\n\n",
                    hint.stage,
                    hint.context.trim()
                ));
            }
        }

        let skip = self.history.len().saturating_sub(PROMPT_HISTORY_TURNS);
        if skip < self.history.len() {
            out.push_str("Conversation so far:\n");
            for turn in &self.history[skip..] {
                let speaker = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                out.push_str(&format!("{speaker}: {}\n", turn.content.trim()));
            }
            out.push('\n');
        }

        out.push_str(self.query.trim());
        out
    }

    /// Reject requests that must never reach routing or the health ledger.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidRequest`] when the query is empty or
    /// whitespace only.
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.query.trim().is_empty() {
            return Err(RouterError::InvalidRequest("query must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_query() {
        let err = RoutingRequest::new("").validate();
        assert!(matches!(err, Err(RouterError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_rejects_whitespace_query() {
        let err = RoutingRequest::new(" \n\t ").validate();
        assert!(matches!(err, Err(RouterError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_accepts_short_query() {
        assert!(RoutingRequest::new("hi").validate().is_ok());
    }

    #[test]
    fn test_override_provider_reads_nested_field() {
        let req = RoutingRequest::new("x").with_override(RoutingOverride {
            provider: Some(ProviderId::Gemini),
            ..RoutingOverride::default()
        });
        assert_eq!(req.override_provider(), Some(ProviderId::Gemini));
        assert_eq!(RoutingRequest::new("x").override_provider(), None);
    }

    #[test]
    fn test_render_prompt_query_only() {
        assert_eq!(RoutingRequest::new("  write a tagline ").render_prompt(), "write a tagline");
    }

    #[test]
    fn test_render_prompt_includes_context_stage_and_history() {
        let req = RoutingRequest::new("and for TikTok?")
            .with_context("Brand X sells shoes")
            .with_stage("content_creation", "spring launch")
            .with_history(vec![
                ConversationTurn::user("ideas for Instagram"),
                ConversationTurn::assistant("1. Reels"),
            ]);
        let prompt = req.render_prompt();
        assert!(prompt.starts_with("Context:\nBrand X sells shoes"));
        assert!(prompt.contains("Campaign stage (content_creation): spring launch"));
        assert!(prompt.contains("User: ideas for Instagram\nAssistant: 1. Reels"));
        assert!(prompt.ends_with("and for TikTok?"));
    }

    #[test]
    fn test_render_prompt_keeps_only_recent_history() {
        let history = (0..10)
            .map(|i| ConversationTurn::user(format!("turn-{i}")))
            .collect();
        let prompt = RoutingRequest::new("q").with_history(history).render_prompt();
        assert!(!prompt.contains("turn-3"));
        assert!(prompt.contains("turn-4"));
        assert!(prompt.contains("turn-9"));
    }

    #[test]
    fn test_request_deserializes_with_only_query() {
        let req: RoutingRequest = serde_json::from_str(r#"{"query":"write a tagline"}"#)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: deserialize: {e}")));
        assert_eq!(req.query, "write a tagline");
        assert!(req.history.is_empty());
        assert!(req.manual_override.is_none());
    }
}
