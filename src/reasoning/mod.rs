//! # Stage: Reasoning Pass
//!
//! ## Responsibility
//! Improve answer quality for deep-analysis requests by running an initial
//! draft followed by bounded refinement turns against one provider.
//!
//! ## Guarantees
//! - Bounded: at most `1 + max_iterations` calls, each on its own task with
//!   the configured call timeout.
//! - Early stop: refinement ends once two successive drafts are at least
//!   `convergence_threshold` similar (word-set Jaccard).
//! - Single provider: a failed iteration aborts the pass with
//!   [`RouterError::ReasoningAborted`]; failover is the execution loop's job.
//! - Observable: every pass returns a [`ReasoningTrace`].
//!
//! ## NOT Responsible For
//! - Choosing the provider (that belongs to `routing`)
//! - Recording health (only the execution loop writes the ledger)

pub mod similarity;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info_span, Instrument};

use crate::backend::{GenerationBackend, GenerationParams};
use crate::config::ReasoningConfig;
use crate::execution::call::bounded_generate;
use crate::request::RoutingRequest;
use crate::{metrics, ProviderId, RouterError};

pub use similarity::jaccard_similarity;

/// What a refinement turn concentrates on. Turns cycle through the variants
/// in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementFocus {
    /// Check claims, figures and logic against the request and context.
    Verify,
    /// Fill gaps the draft left open.
    Expand,
    /// Remove repetition and filler.
    Tighten,
}

impl RefinementFocus {
    const CYCLE: [RefinementFocus; 3] = [Self::Verify, Self::Expand, Self::Tighten];

    /// Focus for refinement turn `turn` (1-based).
    pub fn for_turn(turn: usize) -> Self {
        Self::CYCLE[turn.saturating_sub(1) % Self::CYCLE.len()]
    }

    /// Label for logs and traces.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Expand => "expand",
            Self::Tighten => "tighten",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::Verify => {
                "Review the draft below for factual errors, unsupported claims and \
                 inconsistent figures. Correct anything wrong."
            }
            Self::Expand => {
                "Review the draft below for gaps: missing comparisons, unaddressed parts \
                 of the request, or thin reasoning. Fill them."
            }
            Self::Tighten => {
                "Tighten the draft below: remove repetition and filler while keeping \
                 every substantive point."
            }
        }
    }
}

/// One draft produced during a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningStep {
    /// 0 is the initial draft; 1.. are refinement turns.
    pub iteration: usize,
    /// Refinement focus; `None` for the initial draft.
    pub focus: Option<RefinementFocus>,
    /// Similarity to the previous draft; `None` for the initial draft.
    pub similarity: Option<f64>,
    /// Draft length in characters.
    pub chars: usize,
    /// Wall time of the call.
    pub latency_ms: u64,
}

/// Observability record of one reasoning pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningTrace {
    /// Provider the pass ran against.
    pub provider: ProviderId,
    /// Model the pass ran against.
    pub model: String,
    /// One entry per draft, in order.
    pub steps: Vec<ReasoningStep>,
    /// Whether refinement stopped early on convergence.
    pub converged: bool,
}

impl ReasoningTrace {
    /// Number of drafts produced (initial draft included).
    pub fn drafts(&self) -> usize {
        self.steps.len()
    }
}

/// Final text plus its trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningOutput {
    /// Final draft.
    pub text: String,
    /// How it was produced.
    pub trace: ReasoningTrace,
}

/// Multi-step draft → refine pipeline.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug, Clone)]
pub struct ReasoningPass {
    config: ReasoningConfig,
    call_timeout: Duration,
}

impl ReasoningPass {
    /// Create a pass.
    ///
    /// # Arguments
    ///
    /// * `config` — Iteration bound, convergence threshold, refinement
    ///   temperature.
    /// * `call_timeout` — Upper bound for each individual call.
    pub fn new(config: ReasoningConfig, call_timeout: Duration) -> Self {
        Self {
            config,
            call_timeout,
        }
    }

    /// The pass configuration.
    pub fn config(&self) -> &ReasoningConfig {
        &self.config
    }

    /// Run the pass against one backend.
    ///
    /// # Arguments
    ///
    /// * `backend` — Backend for the candidate provider.
    /// * `request` — Original request (query and context feed refinements).
    /// * `params` — Parameters for the initial draft; refinements reuse the
    ///   model, system prompt and token limit with the refinement
    ///   temperature.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ReasoningAborted`] naming the failed iteration
    /// if any call fails or times out.
    pub async fn run(
        &self,
        backend: Arc<dyn GenerationBackend>,
        request: &RoutingRequest,
        params: GenerationParams,
    ) -> Result<ReasoningOutput, RouterError> {
        let provider = backend.provider();
        let span = info_span!(
            target: "router::reasoning",
            "reasoning_pass",
            provider = %provider,
            model = %params.model,
            max_iterations = self.config.max_iterations,
        );

        async move {
            let mut trace = ReasoningTrace {
                provider,
                model: params.model.clone(),
                steps: Vec::with_capacity(self.config.max_iterations + 1),
                converged: false,
            };

            let (mut draft, latency_ms) = self
                .call(Arc::clone(&backend), params.clone(), 0)
                .await?;
            trace.steps.push(ReasoningStep {
                iteration: 0,
                focus: None,
                similarity: None,
                chars: draft.chars().count(),
                latency_ms,
            });

            for iteration in 1..=self.config.max_iterations {
                let focus = RefinementFocus::for_turn(iteration);
                let refine = GenerationParams {
                    user_prompt: refinement_prompt(request, &draft, focus),
                    temperature: self.config.refinement_temperature,
                    ..params.clone()
                };

                let (next, latency_ms) = self
                    .call(Arc::clone(&backend), refine, iteration)
                    .await?;
                let similarity = jaccard_similarity(&draft, &next);
                trace.steps.push(ReasoningStep {
                    iteration,
                    focus: Some(focus),
                    similarity: Some(similarity),
                    chars: next.chars().count(),
                    latency_ms,
                });
                debug!(
                    target: "router::reasoning",
                    iteration,
                    focus = focus.as_str(),
                    similarity,
                    "refinement complete"
                );

                draft = next;
                if similarity >= self.config.convergence_threshold {
                    trace.converged = true;
                    break;
                }
            }

            metrics::record_reasoning_iterations(trace.drafts(), trace.converged);
            debug!(
                target: "router::reasoning",
                drafts = trace.drafts(),
                converged = trace.converged,
                "reasoning pass complete"
            );

            Ok::<_, RouterError>(ReasoningOutput { text: draft, trace })
        }
        .instrument(span)
        .await
    }

    async fn call(
        &self,
        backend: Arc<dyn GenerationBackend>,
        params: GenerationParams,
        iteration: usize,
    ) -> Result<(String, u64), RouterError> {
        let provider = backend.provider();
        let started = Instant::now();
        let text = bounded_generate(backend, params, self.call_timeout)
            .await
            .map_err(|e| RouterError::ReasoningAborted {
                provider,
                iteration,
                message: match e {
                    RouterError::ProviderCall { message, .. } => message,
                    other => other.to_string(),
                },
            })?;
        Ok((text, started.elapsed().as_millis() as u64))
    }
}

/// Prompt for one refinement turn: instruction, original request, context,
/// current draft.
fn refinement_prompt(request: &RoutingRequest, draft: &str, focus: RefinementFocus) -> String {
    let mut out = String::with_capacity(draft.len() + request.query.len() + 256);
    out.push_str(focus.instruction());
    out.push_str("\n\nOriginal request:\n");
    out.push_str(request.query.trim());
    if !request.context.trim().is_empty() {
        out.push_str("\n\nContext:\n");
        out.push_str(request.context.trim());
    }
    out.push_str("\n\nCurrent draft:\n");
    out.push_str(draft);
    out.push_str("\n\nReturn only the revised answer.");
    out
}
