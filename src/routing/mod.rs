//! # Stage: Routing Decision Engine
//!
//! ## Responsibility
//! Turn one [`RoutingRequest`](crate::RoutingRequest) into one
//! [`RoutingDecision`]: which provider and model to start with, whether to
//! run the reasoning pass, and the full ordered fallback chain.
//!
//! ## Guarantees
//! - Deterministic: the same request and the same health state always yield
//!   the same decision.
//! - Total: a decision is always produced. Unmatched requests use the
//!   baseline profile; a fully unhealthy fleet still yields a chain.
//! - Non-blocking: routing is a pure in-memory computation with no I/O.
//! - Override precedence: a manual provider override starts the chain, a
//!   manual reasoning flag replaces the heuristic.
//!
//! ## NOT Responsible For
//! - Calling providers (that belongs to `execution`)
//! - Recording call outcomes (only the execution loop writes health)
//! - Semantic understanding of the request (phrase heuristics only)

pub mod classifier;
pub mod config;
pub mod engine;

pub use classifier::{Classification, PhraseRule, PhraseTable};
pub use config::{
    stage_key, ExtraPhrases, Profile, ProfileSettings, ProfilesConfig, RoutingConfig,
};
pub use engine::{Candidate, RoutingDecision, RoutingEngine};
