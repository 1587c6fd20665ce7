//! Inbound facade.
//!
//! [`ContentRouter`] shares one [`HealthLedger`] between a routing engine and
//! a fallback executor built from the same [`RouterConfig`], and exposes the
//! inbound contract: [`ContentRouter::route`], [`ContentRouter::execute`]
//! and [`ContentRouter::handle`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{field, info, info_span, Instrument};
use uuid::Uuid;

use crate::backend::BackendRegistry;
use crate::config::RouterConfig;
use crate::execution::{ExecutionOutcome, FallbackExecutor};
use crate::health::{HealthLedger, HealthStatus, InMemoryHealthLedger, ProviderHealthState};
use crate::reasoning::ReasoningPass;
use crate::request::RoutingRequest;
use crate::routing::{RoutingDecision, RoutingEngine};
use crate::{ProviderId, RouterError};

/// Request router for the content-generation platform.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio_llm_router::config::RouterConfig;
/// use tokio_llm_router::{BackendRegistry, ContentRouter, EchoBackend, ProviderId, RoutingRequest};
///
/// # async fn example() -> Result<(), tokio_llm_router::RouterError> {
/// let backends = BackendRegistry::new()
///     .with(Arc::new(EchoBackend::new(ProviderId::OpenAi)))
///     .with(Arc::new(EchoBackend::new(ProviderId::Anthropic)));
/// let router = ContentRouter::new(RouterConfig::default(), backends);
/// let outcome = router.handle(&RoutingRequest::new("Write a tagline")).await?;
/// println!("{}", outcome.text);
/// # Ok(()) }
/// ```
pub struct ContentRouter {
    ledger: Arc<dyn HealthLedger>,
    engine: RoutingEngine,
    executor: FallbackExecutor,
}

impl std::fmt::Debug for ContentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRouter")
            .field("engine", &self.engine)
            .field("executor", &self.executor)
            .finish()
    }
}

impl ContentRouter {
    /// Build a router from `config` with a fresh in-memory ledger.
    ///
    /// Enabled providers without a registered backend stay in routing
    /// chains and are skipped at execution time.
    pub fn new(config: RouterConfig, backends: BackendRegistry) -> Self {
        let ledger = Arc::new(InMemoryHealthLedger::new(config.health.unhealthy_threshold));
        Self::with_ledger(config, backends, ledger)
    }

    /// Build a router over an existing ledger, e.g. one shared with other
    /// routers in the process or backed by an external store.
    ///
    /// `config.health.unhealthy_threshold` is not applied; the ledger
    /// classifies with its own threshold.
    pub fn with_ledger(
        config: RouterConfig,
        backends: BackendRegistry,
        ledger: Arc<dyn HealthLedger>,
    ) -> Self {
        let call_timeout = Duration::from_millis(config.execution.call_timeout_ms);

        let engine = RoutingEngine::new(
            config.routing.clone(),
            config.profiles.clone(),
            Arc::clone(&ledger),
        )
        .with_enabled_providers(config.enabled_providers())
        .with_provider_models(config.provider_models())
        .with_strict_override(config.execution.strict_override);

        let executor = FallbackExecutor::new(
            backends,
            Arc::clone(&ledger),
            ReasoningPass::new(config.reasoning.clone(), call_timeout),
            call_timeout,
        );

        Self {
            ledger,
            engine,
            executor,
        }
    }

    /// Build a router with HTTP backends for every enabled provider.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ConfigError`] if an enabled provider's API key
    /// is missing.
    pub fn from_config(config: RouterConfig) -> Result<Self, RouterError> {
        let backends = BackendRegistry::from_config(&config)?;
        Ok(Self::new(config, backends))
    }

    /// Route without executing.
    pub fn route(&self, request: &RoutingRequest) -> RoutingDecision {
        self.engine.route(request)
    }

    /// Execute a decision produced by [`ContentRouter::route`].
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::AllProvidersExhausted`] when every candidate
    /// failed.
    pub async fn execute(
        &self,
        decision: &RoutingDecision,
        request: &RoutingRequest,
    ) -> Result<ExecutionOutcome, RouterError> {
        self.executor.execute(decision, request).await
    }

    /// Validate, route and execute one request.
    ///
    /// # Errors
    ///
    /// - [`RouterError::InvalidRequest`] for an empty query; nothing is
    ///   routed and the ledger is untouched.
    /// - [`RouterError::AllProvidersExhausted`] when every candidate failed.
    pub async fn handle(&self, request: &RoutingRequest) -> Result<ExecutionOutcome, RouterError> {
        request.validate()?;

        let request_id = Uuid::new_v4();
        let span = info_span!(
            target: "router::routing",
            "handle",
            request_id = %request_id,
            profile = field::Empty,
            provider = field::Empty,
            duration_ms = field::Empty,
            outcome = field::Empty,
            error_kind = field::Empty,
        );

        let started = Instant::now();
        let result = async {
            let decision = self.route(request);
            tracing::Span::current().record("profile", decision.profile.as_str());
            info!(
                target: "router::routing",
                provider = %decision.provider,
                model = %decision.model,
                use_reasoning = decision.use_reasoning,
                rationale = %decision.rationale,
                "request routed"
            );
            self.execute(&decision, request).await
        }
        .instrument(span.clone())
        .await;

        span.record("duration_ms", started.elapsed().as_millis() as u64);
        match &result {
            Ok(outcome) => {
                span.record("provider", outcome.provider.as_str());
                span.record("outcome", "ok");
            }
            Err(e) => {
                span.record("outcome", "err");
                span.record("error_kind", e.kind());
            }
        }
        result
    }

    /// The shared health ledger.
    pub fn ledger(&self) -> &Arc<dyn HealthLedger> {
        &self.ledger
    }

    /// Point-in-time health of every provider.
    pub fn health_snapshot(&self) -> Vec<(ProviderId, ProviderHealthState, HealthStatus)> {
        self.ledger.snapshot()
    }

    /// Forget all health state.
    pub fn reset_health(&self) {
        self.ledger.reset();
    }
}
