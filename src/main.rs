//! Demo binary for tokio-llm-router
//!
//! Routes and executes a handful of marketing requests, then prints health
//! and metrics.
//!
//! ## Environment Variables
//!
//! - `ROUTER_CONFIG` — path to a TOML config (defaults apply when unset)
//! - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`,
//!   `PERPLEXITY_API_KEY` — providers without a key use the echo backend
//! - `LOG_FORMAT=json` — structured JSON output (production)
//! - `RUST_LOG=info` — log level filter

use std::sync::Arc;

use tokio_llm_router::config::loader;
use tokio_llm_router::{
    init_tracing, metrics, BackendRegistry, ContentRouter, ConversationTurn, EchoBackend,
    RoutingRequest,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = init_tracing();
    metrics::init_metrics()?;

    let config = loader::load_from_env()?;

    // HTTP backends where a key is present, echo otherwise.
    let client = reqwest::Client::new();
    let mut backends = BackendRegistry::new();
    for provider in config.enabled_providers() {
        match BackendRegistry::http_backend(provider, &config, &client) {
            Ok(backend) => {
                info!(provider = %provider, "using HTTP backend");
                backends.register(backend);
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "falling back to echo backend");
                backends.register(Arc::new(EchoBackend::new(provider)));
            }
        }
    }

    let router = ContentRouter::new(config, backends);

    let requests = vec![
        RoutingRequest::new("Compare Brand X and Brand Y social strategy"),
        RoutingRequest::new("Write a catchy tagline for our spring sale"),
        RoutingRequest::new("Calculate the ROI of a $5k budget at 2% CTR"),
        RoutingRequest::new("why only three?")
            .with_context("comprehensive analysis")
            .with_history(vec![
                ConversationTurn::user("Compare our competitors"),
                ConversationTurn::assistant("Competitor overview. ".repeat(40)),
            ]),
        RoutingRequest::new("Ideas for next week?").with_stage("content_creation", ""),
    ];

    for request in &requests {
        let decision = router.route(request);
        info!(
            profile = decision.profile.as_str(),
            provider = %decision.provider,
            use_reasoning = decision.use_reasoning,
            rationale = %decision.rationale,
            "decision"
        );

        match router.execute(&decision, request).await {
            Ok(outcome) => info!(
                provider = %outcome.provider,
                model = %outcome.model,
                fallback_used = outcome.fallback_used,
                chars = outcome.text.chars().count(),
                "request served"
            ),
            Err(e) => warn!(error = %e, "request failed"),
        }
    }

    for (provider, state, status) in router.health_snapshot() {
        info!(
            provider = %provider,
            status = status.as_str(),
            consecutive_failures = state.consecutive_failures,
            "provider health"
        );
    }

    println!("{}", metrics::gather_metrics());
    Ok(())
}
