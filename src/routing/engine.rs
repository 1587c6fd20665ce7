//! Routing decision engine.
//!
//! The [`RoutingEngine`] combines the [`PhraseTable`](super::PhraseTable)
//! classifier, the static profile table, follow-up detection and the
//! [`HealthLedger`] to turn one [`RoutingRequest`] into one
//! [`RoutingDecision`] without any network call.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::classifier::{Classification, PhraseTable};
use super::config::{stage_key, Profile, ProfileSettings, ProfilesConfig, RoutingConfig};
use crate::health::{HealthLedger, HealthStatus};
use crate::request::{Role, RoutingRequest};
use crate::{metrics, ProviderId};

/// One entry of a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Provider to call.
    pub provider: ProviderId,
    /// Model to request from that provider.
    pub model: String,
}

/// The routing decision for a single request.
///
/// `chain` is frozen when the decision is made: the execution loop walks it
/// as-is, so health changes caused by other in-flight requests never alter
/// a chain that is already being executed. `chain[0]` always equals
/// (`provider`, `model`).
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingDecision {
    /// Starting provider.
    pub provider: ProviderId,
    /// Model for the starting provider.
    pub model: String,
    /// Whether the multi-step reasoning pass should run.
    pub use_reasoning: bool,
    /// Which rules fired. For logs only; never parsed.
    pub rationale: String,
    /// Profile the request was classified into.
    pub profile: Profile,
    /// Ordered candidates, starting with `provider`.
    pub chain: Vec<Candidate>,
    /// Sampling temperature from the profile.
    pub temperature: f32,
    /// Token limit per call from the profile.
    pub max_tokens: u32,
    /// System prompt from the profile.
    pub system_prompt: String,
}

impl RoutingDecision {
    /// Providers of the frozen chain, in order.
    pub fn chain_providers(&self) -> Vec<ProviderId> {
        self.chain.iter().map(|c| c.provider).collect()
    }
}

/// Health-aware routing engine.
///
/// Thread-safe and cheap to share: the only mutable state it touches is
/// the ledger, which it only reads.
///
/// # Panics
///
/// This type and its methods never panic.
pub struct RoutingEngine {
    config: RoutingConfig,
    profiles: ProfilesConfig,
    phrases: PhraseTable,
    ledger: Arc<dyn HealthLedger>,
    enabled: Vec<ProviderId>,
    provider_models: BTreeMap<ProviderId, String>,
    strict_override: bool,
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("config", &self.config)
            .field("enabled", &self.enabled)
            .field("strict_override", &self.strict_override)
            .finish()
    }
}

impl RoutingEngine {
    /// Create an engine with every provider enabled and advisory overrides.
    ///
    /// # Arguments
    ///
    /// * `config` — Follow-up thresholds, stage hints and extra phrases.
    /// * `profiles` — Static profile → provider table.
    /// * `ledger` — Shared health ledger (read only here).
    pub fn new(
        config: RoutingConfig,
        profiles: ProfilesConfig,
        ledger: Arc<dyn HealthLedger>,
    ) -> Self {
        let mut config = config;
        config.normalise_stage_profiles();
        let phrases = PhraseTable::default().with_extra(&config.extra_phrases);
        Self {
            config,
            profiles,
            phrases,
            ledger,
            enabled: ProviderId::ALL.to_vec(),
            provider_models: BTreeMap::new(),
            strict_override: false,
        }
    }

    /// Restrict routing to `enabled` providers. An empty list is ignored.
    pub fn with_enabled_providers(mut self, enabled: Vec<ProviderId>) -> Self {
        if !enabled.is_empty() {
            self.enabled = dedup_providers(enabled);
        }
        self
    }

    /// Provider-level default models used when a profile names none.
    pub fn with_provider_models(mut self, models: BTreeMap<ProviderId, String>) -> Self {
        self.provider_models = models;
        self
    }

    /// When `true`, an override provider is the only candidate tried.
    pub fn with_strict_override(mut self, strict: bool) -> Self {
        self.strict_override = strict;
        self
    }

    /// Replace the phrase table (e.g. for tests or custom deployments).
    pub fn with_phrase_table(mut self, phrases: PhraseTable) -> Self {
        self.phrases = phrases;
        self
    }

    /// Route a request.
    ///
    /// # Returns
    ///
    /// A [`RoutingDecision`]. A decision is always produced; requests with
    /// no matching phrases use [`Profile::Baseline`].
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn route(&self, request: &RoutingRequest) -> RoutingDecision {
        let classification = self.classify(request);
        let profile = classification.profile;
        let settings = self.profiles.get(profile);
        let mut rationale = vec![describe_classification(&classification)];

        // ── Reasoning flag ───────────────────────────────────────────
        let follow_up = self.is_follow_up(request);
        let heuristic = profile == Profile::DeepAnalysis && !follow_up;
        let forced = request.manual_override.as_ref().and_then(|o| o.reasoning);
        let use_reasoning = forced.unwrap_or(heuristic);
        match forced {
            Some(flag) => rationale.push(format!(
                "reasoning forced {} by override",
                if flag { "on" } else { "off" }
            )),
            None if profile == Profile::DeepAnalysis && follow_up => rationale
                .push("reasoning suppressed: short follow-up to a long answer".to_string()),
            None => rationale.push(format!(
                "reasoning {}",
                if use_reasoning { "on" } else { "off" }
            )),
        }

        // ── Candidate chain ──────────────────────────────────────────
        let preferred = self.preferred_chain(settings);
        let providers = self.order_chain(request, &preferred, &mut rationale);

        let override_model = request
            .manual_override
            .as_ref()
            .and_then(|o| o.provider.zip(o.model.clone()));
        let chain: Vec<Candidate> = providers
            .into_iter()
            .map(|provider| {
                let model = match &override_model {
                    Some((p, m)) if *p == provider => m.clone(),
                    _ => self.model_for(settings, provider),
                };
                Candidate { provider, model }
            })
            .collect();

        // `enabled` is never empty, so neither is the chain.
        let (provider, model) = chain
            .first()
            .map(|c| (c.provider, c.model.clone()))
            .unwrap_or_else(|| {
                let p = self.enabled.first().copied().unwrap_or(ProviderId::OpenAi);
                (p, self.model_for(settings, p))
            });

        let rationale = rationale.join("; ");
        metrics::inc_decision(profile.as_str(), use_reasoning);
        debug!(
            target: "router::routing",
            profile = profile.as_str(),
            provider = %provider,
            model = %model,
            use_reasoning,
            chain_len = chain.len(),
            rationale = %rationale,
            "routing decision"
        );

        RoutingDecision {
            provider,
            model,
            use_reasoning,
            rationale,
            profile,
            chain,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            system_prompt: settings.system_prompt.clone(),
        }
    }

    /// Classify a request without routing it.
    pub fn classify(&self, request: &RoutingRequest) -> Classification {
        let stage_profile = request.stage_hint.as_ref().and_then(|hint| {
            self.config
                .stage_profiles
                .get(&stage_key(&hint.stage))
                .copied()
        });
        let stage_context = request
            .stage_hint
            .as_ref()
            .map_or("", |hint| hint.context.as_str());

        self.phrases.classify(
            &[&request.query, &request.context, stage_context],
            stage_profile,
        )
    }

    /// `true` when the query is short and one of the recent history turns
    /// is a long assistant answer: the user is asking to clarify that
    /// answer, not for a fresh analysis.
    pub fn is_follow_up(&self, request: &RoutingRequest) -> bool {
        if request.query.chars().count() >= self.config.follow_up_max_query_chars {
            return false;
        }
        request
            .history
            .iter()
            .rev()
            .take(self.config.follow_up_lookback)
            .any(|turn| {
                turn.role == Role::Assistant
                    && turn.content.chars().count() > self.config.follow_up_min_assistant_chars
            })
    }

    // ── Chain construction ─────────────────────────────────────────────

    /// Profile chain restricted to enabled providers, first occurrence of
    /// each provider only; falls back to every enabled provider when the
    /// profile names none of them.
    fn preferred_chain(&self, settings: &ProfileSettings) -> Vec<ProviderId> {
        let chain = dedup_providers(
            settings
                .chain
                .iter()
                .copied()
                .filter(|p| self.enabled.contains(p)),
        );
        if chain.is_empty() {
            self.enabled.clone()
        } else {
            chain
        }
    }

    fn order_chain(
        &self,
        request: &RoutingRequest,
        preferred: &[ProviderId],
        rationale: &mut Vec<String>,
    ) -> Vec<ProviderId> {
        let pinned = match request.override_provider() {
            Some(p) if self.enabled.contains(&p) => Some(p),
            Some(p) => {
                rationale.push(format!("override {p} ignored: provider not enabled"));
                None
            }
            None => None,
        };

        let Some(pinned) = pinned else {
            let ordered = self.ledger.best_fallback_chain(preferred);
            if ordered.as_slice() != preferred {
                rationale.push(format!("health reordered chain to {}", join(&ordered)));
            }
            return ordered;
        };

        if self.strict_override {
            rationale.push(format!("strict override pins {pinned}"));
            return vec![pinned];
        }

        let rest: Vec<ProviderId> = self
            .ledger
            .best_fallback_chain(preferred)
            .into_iter()
            .filter(|p| *p != pinned)
            .collect();

        let pinned_unhealthy = self.ledger.status(pinned) == HealthStatus::Unhealthy;
        let alternative_exists = rest
            .iter()
            .any(|p| self.ledger.status(*p) != HealthStatus::Unhealthy);

        if pinned_unhealthy && alternative_exists {
            let mut with_pinned = vec![pinned];
            with_pinned.extend(preferred.iter().copied().filter(|p| *p != pinned));
            let ordered = self.ledger.best_fallback_chain(&with_pinned);
            rationale.push(format!(
                "override {pinned} is unhealthy; demoted, chain {}",
                join(&ordered)
            ));
            return ordered;
        }

        rationale.push(format!("override starts chain at {pinned}"));
        let mut ordered = Vec::with_capacity(rest.len() + 1);
        ordered.push(pinned);
        ordered.extend(rest);
        ordered
    }

    fn model_for(&self, settings: &ProfileSettings, provider: ProviderId) -> String {
        settings
            .model_for(provider)
            .map(str::to_string)
            .or_else(|| self.provider_models.get(&provider).cloned())
            .unwrap_or_else(|| provider.default_model().to_string())
    }
}

fn describe_classification(c: &Classification) -> String {
    let mut out = format!("profile {}", c.profile);
    if !c.matched.is_empty() {
        out.push_str(&format!(" (matched: {})", c.matched.join(", ")));
    }
    if c.stage_bonus {
        out.push_str(" (stage hint)");
    }
    if c.profile == Profile::Baseline {
        out.push_str(" (no heuristic matched)");
    }
    out
}

/// Keep the first occurrence of each provider, preserving order.
fn dedup_providers(providers: impl IntoIterator<Item = ProviderId>) -> Vec<ProviderId> {
    let mut out: Vec<ProviderId> = Vec::with_capacity(ProviderId::ALL.len());
    for p in providers {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

fn join(chain: &[ProviderId]) -> String {
    chain
        .iter()
        .map(ProviderId::as_str)
        .collect::<Vec<_>>()
        .join(" > ")
}

// ── Tests ──────────────────────────────────────────────────────────────
