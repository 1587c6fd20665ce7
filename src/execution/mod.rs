//! # Stage: Fallback Execution Loop
//!
//! ## Responsibility
//! Realise a [`RoutingDecision`]: walk its frozen candidate chain, run the
//! reasoning pass or one direct call per candidate, and record every
//! outcome into the [`HealthLedger`].
//!
//! ## Guarantees
//! - Exactly one attempt per candidate, in chain order, no duplicates and
//!   no backoff between attempts.
//! - Every attempt outcome is written to the ledger before the next
//!   candidate is tried.
//! - Each call runs on its own task under the configured timeout; timeouts
//!   and panics count as failures.
//! - Only [`RouterError::AllProvidersExhausted`] leaves this module.
//!
//! ## Span Fields
//!
//! | Field | Description |
//! |-------|-------------|
//! | `profile` | Profile of the decision |
//! | `provider` | Decision's starting provider |
//! | `use_reasoning` | Whether the reasoning pass runs |
//! | `attempts` | Calls made, recorded on completion |
//! | `duration_ms` | Recorded on completion |
//! | `outcome` | `"ok"` or `"err"` |
//! | `error_kind` | Recorded only on error |
//!
//! Prompt text, context and model output are never logged.
//!
//! ## NOT Responsible For
//! - Choosing or reordering candidates (that belongs to `routing`)
//! - Racing providers in parallel

pub mod call;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{field, info, info_span, warn, Instrument};

use crate::backend::{BackendRegistry, GenerationParams};
use crate::health::HealthLedger;
use crate::reasoning::{ReasoningPass, ReasoningTrace};
use crate::request::RoutingRequest;
use crate::routing::RoutingDecision;
use crate::{metrics, ProviderId, RouterError};

use call::bounded_generate;

/// Result of one candidate in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The call (or reasoning pass) succeeded.
    Success,
    /// The call failed, timed out, or the reasoning pass aborted.
    Failure,
    /// No backend is registered for the provider; nothing was called.
    Skipped,
}

impl AttemptOutcome {
    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

/// One walked candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Candidate provider.
    pub provider: ProviderId,
    /// Candidate model.
    pub model: String,
    /// What happened.
    pub outcome: AttemptOutcome,
    /// Failure or skip reason.
    pub error: Option<String>,
    /// Wall time spent on the candidate.
    pub latency_ms: u64,
}

/// Successful realisation of a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// Provider that produced the text.
    pub provider: ProviderId,
    /// Model that produced the text.
    pub model: String,
    /// Generated text.
    pub text: String,
    /// `true` when the text came from a candidate other than the first.
    pub fallback_used: bool,
    /// Short user-facing note when a fallback served the request.
    pub fallback_note: Option<String>,
    /// Every candidate walked, in order, ending with the successful one.
    pub attempts: Vec<AttemptRecord>,
    /// Trace of the reasoning pass, when one ran.
    pub reasoning: Option<ReasoningTrace>,
}

impl ExecutionOutcome {
    /// Number of calls actually made (skipped candidates excluded).
    pub fn calls_made(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome != AttemptOutcome::Skipped)
            .count()
    }
}

/// Sequential failover executor.
///
/// # Panics
///
/// This type and its methods never panic.
pub struct FallbackExecutor {
    backends: BackendRegistry,
    ledger: Arc<dyn HealthLedger>,
    reasoning: ReasoningPass,
    call_timeout: Duration,
}

impl std::fmt::Debug for FallbackExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackExecutor")
            .field("backends", &self.backends)
            .field("reasoning", &self.reasoning)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl FallbackExecutor {
    /// Create an executor.
    ///
    /// # Arguments
    ///
    /// * `backends` — Backends keyed by provider.
    /// * `ledger` — Shared health ledger; this executor is its only writer.
    /// * `reasoning` — Reasoning pass used when a decision asks for it.
    /// * `call_timeout` — Upper bound for each direct call.
    pub fn new(
        backends: BackendRegistry,
        ledger: Arc<dyn HealthLedger>,
        reasoning: ReasoningPass,
        call_timeout: Duration,
    ) -> Self {
        Self {
            backends,
            ledger,
            reasoning,
            call_timeout,
        }
    }

    /// Registered backends.
    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Execute `decision` for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::AllProvidersExhausted`] when every candidate
    /// failed or was skipped. `attempts` counts calls actually made;
    /// `last_error` is the most recent failure.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn execute(
        &self,
        decision: &RoutingDecision,
        request: &RoutingRequest,
    ) -> Result<ExecutionOutcome, RouterError> {
        let span = info_span!(
            target: "router::execution",
            "execute",
            profile = decision.profile.as_str(),
            provider = %decision.provider,
            use_reasoning = decision.use_reasoning,
            attempts = field::Empty,
            duration_ms = field::Empty,
            outcome = field::Empty,
            error_kind = field::Empty,
        );
        let started = Instant::now();
        let result = self
            .walk_chain(decision, request)
            .instrument(span.clone())
            .await;

        span.record("duration_ms", started.elapsed().as_millis() as u64);
        match &result {
            Ok(outcome) => {
                span.record("attempts", outcome.calls_made());
                span.record("outcome", "ok");
            }
            Err(e) => {
                if let RouterError::AllProvidersExhausted { attempts, .. } = e {
                    span.record("attempts", *attempts);
                }
                span.record("outcome", "err");
                span.record("error_kind", e.kind());
            }
        }
        result
    }

    async fn walk_chain(
        &self,
        decision: &RoutingDecision,
        request: &RoutingRequest,
    ) -> Result<ExecutionOutcome, RouterError> {
        let prompt = request.render_prompt();
        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(decision.chain.len());
        let mut last_error: Option<String> = None;

        for (position, candidate) in decision.chain.iter().enumerate() {
            let provider = candidate.provider;

            let Some(backend) = self.backends.get(provider) else {
                warn!(
                    target: "router::execution",
                    provider = %provider,
                    position,
                    "no backend registered; skipping candidate"
                );
                metrics::inc_attempt(provider.as_str(), AttemptOutcome::Skipped.as_str());
                attempts.push(AttemptRecord {
                    provider,
                    model: candidate.model.clone(),
                    outcome: AttemptOutcome::Skipped,
                    error: Some("no backend registered".to_string()),
                    latency_ms: 0,
                });
                continue;
            };

            let params = GenerationParams {
                model: candidate.model.clone(),
                system_prompt: decision.system_prompt.clone(),
                user_prompt: prompt.clone(),
                temperature: decision.temperature,
                max_tokens: decision.max_tokens,
            };

            let started = Instant::now();
            let result = if decision.use_reasoning {
                self.reasoning
                    .run(backend, request, params)
                    .await
                    .map(|out| (out.text, Some(out.trace)))
            } else {
                bounded_generate(backend, params, self.call_timeout)
                    .await
                    .map(|text| (text, None))
            };
            let elapsed = started.elapsed();
            metrics::record_call_duration(provider.as_str(), elapsed);
            let latency_ms = elapsed.as_millis() as u64;

            match result {
                Ok((text, reasoning)) => {
                    self.ledger.record_success(provider, Utc::now());
                    metrics::inc_attempt(provider.as_str(), AttemptOutcome::Success.as_str());
                    attempts.push(AttemptRecord {
                        provider,
                        model: candidate.model.clone(),
                        outcome: AttemptOutcome::Success,
                        error: None,
                        latency_ms,
                    });

                    let fallback_used = position > 0;
                    let fallback_note = fallback_used.then(|| fallback_note(&attempts, provider));
                    if fallback_used {
                        metrics::inc_fallback(provider.as_str());
                        info!(
                            target: "router::execution",
                            provider = %provider,
                            position,
                            "request served by fallback provider"
                        );
                    }

                    return Ok(ExecutionOutcome {
                        provider,
                        model: candidate.model.clone(),
                        text,
                        fallback_used,
                        fallback_note,
                        attempts,
                        reasoning,
                    });
                }
                Err(err) => {
                    let message = match err {
                        RouterError::ProviderCall { message, .. } => message,
                        other => other.to_string(),
                    };
                    self.ledger.record_failure(provider, &message);
                    metrics::inc_attempt(provider.as_str(), AttemptOutcome::Failure.as_str());
                    warn!(
                        target: "router::execution",
                        provider = %provider,
                        model = %candidate.model,
                        position,
                        latency_ms,
                        error = %message,
                        "provider attempt failed"
                    );
                    attempts.push(AttemptRecord {
                        provider,
                        model: candidate.model.clone(),
                        outcome: AttemptOutcome::Failure,
                        error: Some(message.clone()),
                        latency_ms,
                    });
                    last_error = Some(format!("{provider}: {message}"));
                }
            }
        }

        metrics::inc_exhausted();
        let calls = attempts
            .iter()
            .filter(|a| a.outcome != AttemptOutcome::Skipped)
            .count();
        let last_error = last_error.unwrap_or_else(|| {
            if decision.chain.is_empty() {
                "no candidates in chain".to_string()
            } else {
                "no backend registered for any candidate".to_string()
            }
        });
        warn!(
            target: "router::execution",
            attempts = calls,
            candidates = decision.chain.len(),
            "all providers exhausted"
        );
        Err(RouterError::AllProvidersExhausted {
            attempts: calls,
            last_error,
        })
    }
}

fn fallback_note(attempts: &[AttemptRecord], served_by: ProviderId) -> String {
    let unavailable: Vec<&str> = attempts
        .iter()
        .filter(|a| a.outcome != AttemptOutcome::Success)
        .map(|a| a.provider.as_str())
        .collect();
    format!(
        "{} unavailable; answered by {served_by}",
        unavailable.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EchoBackend, GenerationBackend};
    use crate::config::ReasoningConfig;
    use crate::health::{HealthStatus, InMemoryHealthLedger};
    use crate::routing::{Candidate, Profile};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        provider: ProviderId,
        calls: AtomicUsize,
    }

    impl Failing {
        fn new(provider: ProviderId) -> Arc<Self> {
            Arc::new(Self {
                provider,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for Failing {
        fn provider(&self) -> ProviderId {
            self.provider
        }
        async fn generate(&self, _params: &GenerationParams) -> Result<String, RouterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RouterError::ProviderCall {
                provider: self.provider,
                message: "503 service unavailable".into(),
            })
        }
    }

    fn decision(chain: &[ProviderId], use_reasoning: bool) -> RoutingDecision {
        let chain: Vec<Candidate> = chain
            .iter()
            .map(|p| Candidate {
                provider: *p,
                model: p.default_model().to_string(),
            })
            .collect();
        RoutingDecision {
            provider: chain[0].provider,
            model: chain[0].model.clone(),
            use_reasoning,
            rationale: "test".into(),
            profile: Profile::Baseline,
            chain,
            temperature: 0.7,
            max_tokens: 64,
            system_prompt: String::new(),
        }
    }

    fn executor(backends: BackendRegistry, ledger: Arc<InMemoryHealthLedger>) -> FallbackExecutor {
        FallbackExecutor::new(
            backends,
            ledger,
            ReasoningPass::new(ReasoningConfig::default(), Duration::from_secs(5)),
            Duration::from_secs(5),
        )
    }

    fn echo(provider: ProviderId) -> Arc<EchoBackend> {
        Arc::new(EchoBackend::new(provider).with_delay(0))
    }

    #[tokio::test]
    async fn test_first_candidate_success_is_not_fallback() {
        let ledger = Arc::new(InMemoryHealthLedger::default());
        let exec = executor(
            BackendRegistry::new().with(echo(ProviderId::OpenAi)),
            Arc::clone(&ledger),
        );
        let outcome = exec
            .execute(
                &decision(&[ProviderId::OpenAi], false),
                &RoutingRequest::new("hi"),
            )
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: execute: {e}")));
        assert!(!outcome.fallback_used);
        assert!(outcome.fallback_note.is_none());
        assert!(outcome.reasoning.is_none());
        assert_eq!(outcome.attempts.len(), 1);
        assert!(ledger.state(ProviderId::OpenAi).last_success_at.is_some());
    }

    #[tokio::test]
    async fn test_failover_records_failure_then_success() {
        let ledger = Arc::new(InMemoryHealthLedger::default());
        let failing = Failing::new(ProviderId::Anthropic);
        let exec = executor(
            BackendRegistry::new()
                .with(failing.clone())
                .with(echo(ProviderId::OpenAi)),
            Arc::clone(&ledger),
        );
        let outcome = exec
            .execute(
                &decision(&[ProviderId::Anthropic, ProviderId::OpenAi], false),
                &RoutingRequest::new("hi"),
            )
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: execute: {e}")));

        assert_eq!(outcome.provider, ProviderId::OpenAi);
        assert!(outcome.fallback_used);
        assert_eq!(
            outcome.fallback_note.as_deref(),
            Some("anthropic unavailable; answered by open_ai")
        );
        assert_eq!(ledger.state(ProviderId::Anthropic).consecutive_failures, 1);
        assert_eq!(ledger.status(ProviderId::Anthropic), HealthStatus::Degraded);
        assert!(ledger.state(ProviderId::OpenAi).last_success_at.is_some());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_failing_exhausts_with_one_attempt_each() {
        let ledger = Arc::new(InMemoryHealthLedger::default());
        let a = Failing::new(ProviderId::OpenAi);
        let b = Failing::new(ProviderId::Gemini);
        let exec = executor(
            BackendRegistry::new().with(a.clone()).with(b.clone()),
            Arc::clone(&ledger),
        );
        let err = exec
            .execute(
                &decision(&[ProviderId::OpenAi, ProviderId::Gemini], false),
                &RoutingRequest::new("hi"),
            )
            .await
            .err();

        match err {
            Some(RouterError::AllProvidersExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.starts_with("gemini:"));
            }
            other => std::panic::panic_any(format!("unexpected: {other:?}")),
        }
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_candidate_is_skipped_without_ledger_write() {
        let ledger = Arc::new(InMemoryHealthLedger::default());
        let exec = executor(
            BackendRegistry::new().with(echo(ProviderId::Gemini)),
            Arc::clone(&ledger),
        );
        let outcome = exec
            .execute(
                &decision(&[ProviderId::Perplexity, ProviderId::Gemini], false),
                &RoutingRequest::new("hi"),
            )
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: execute: {e}")));

        assert_eq!(outcome.provider, ProviderId::Gemini);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::Skipped);
        assert_eq!(outcome.calls_made(), 1);
        assert_eq!(
            ledger.state(ProviderId::Perplexity),
            crate::health::ProviderHealthState::default()
        );
    }

    #[tokio::test]
    async fn test_no_registered_backends_reports_zero_attempts() {
        let exec = executor(
            BackendRegistry::new(),
            Arc::new(InMemoryHealthLedger::default()),
        );
        let err = exec
            .execute(
                &decision(&[ProviderId::OpenAi], false),
                &RoutingRequest::new("hi"),
            )
            .await
            .err();
        assert!(matches!(
            err,
            Some(RouterError::AllProvidersExhausted { attempts: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_reasoning_decision_returns_trace() {
        let exec = executor(
            BackendRegistry::new().with(echo(ProviderId::Anthropic)),
            Arc::new(InMemoryHealthLedger::default()),
        );
        let outcome = exec
            .execute(
                &decision(&[ProviderId::Anthropic], true),
                &RoutingRequest::new("compare a and b"),
            )
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: execute: {e}")));
        let trace = outcome
            .reasoning
            .unwrap_or_else(|| std::panic::panic_any("test: trace missing"));
        assert!(trace.drafts() >= 2);
    }

    #[tokio::test]
    async fn test_failed_reasoning_pass_falls_over_to_next_candidate() {
        let ledger = Arc::new(InMemoryHealthLedger::default());
        let exec = executor(
            BackendRegistry::new()
                .with(Failing::new(ProviderId::Anthropic))
                .with(echo(ProviderId::OpenAi)),
            Arc::clone(&ledger),
        );
        let outcome = exec
            .execute(
                &decision(&[ProviderId::Anthropic, ProviderId::OpenAi], true),
                &RoutingRequest::new("compare"),
            )
            .await
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: execute: {e}")));
        assert_eq!(outcome.provider, ProviderId::OpenAi);
        let message = ledger
            .state(ProviderId::Anthropic)
            .last_error
            .map(|e| e.message)
            .unwrap_or_default();
        assert!(message.contains("iteration 0"), "got {message}");
    }
}
