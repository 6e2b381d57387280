// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Atelier - a workshop of specialist AI agents.
//!
//! Atelier coordinates a team of specialist agents (Founder, Designer,
//! Planner, Builder, Tester, Security, Reviewer) that collaborate
//! turn-by-turn on a single user request, producing a chain of typed
//! artifacts (PRD, design spec, tech plan, security review, test plan, code
//! review). The crate is the orchestration core only: prompts, model
//! backends, and the transport that streams events to clients are the
//! embedding layer's concern.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Core type definitions (AgentId, Message, RouteTarget, WorkflowEvent, providers)
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration defaults, env overrides, and file loading
//! - [`state`] - Workflow state and the pure merge that advances it
//! - [`artifact`] - The closed artifact sum type and the slot store
//! - [`cache`] - Exact-match response cache with TTL and capacity eviction
//! - [`guard`] - Turn limits, retry budgets, circuit breakers, timeouts
//! - [`agents`] - Agent worker trait and registry
//! - [`invoke`] - Resilient call wrapper (cache + retries + fallback + spans)
//! - [`router`] - Tiered next-agent decision with keyword fallback
//! - [`engine`] - The advance/run loop that ties everything together
//! - [`telemetry`] - Tracing, metrics, and observability infrastructure
//!
//! # Example
//!
//! ```rust,ignore
//! use atelier::config::EngineConfig;
//! use atelier::agents::AgentRegistry;
//! use atelier::engine::WorkflowEngine;
//!
//! let mut registry = AgentRegistry::new();
//! // registry.register(...) each specialist worker
//! let engine = WorkflowEngine::new(EngineConfig::from_env(), registry);
//!
//! let state = engine.new_workflow("please build a login form");
//! let (state, events) = engine.run(state, None).await;
//! ```

pub mod agents;
pub mod artifact;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod invoke;
pub mod router;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use agents::{AgentRegistry, AgentReply, AgentWorker, TurnContext};
pub use artifact::{Artifact, ArtifactKind, ArtifactStore, Readiness};
pub use cache::{CacheStats, ResponseCache};
pub use config::EngineConfig;
pub use engine::WorkflowEngine;
pub use error::{ConfigError, GuardError, ProviderError, Result, RouterError};
pub use guard::{GuardConfig, SafetyGuard};
pub use invoke::{InvocationOutcome, ResilientInvoker};
pub use router::{RouteDecision, TurnRouter};
pub use state::{Conversation, StateUpdate, TurnCounter, WorkflowState};
pub use telemetry::{Metrics, TelemetryConfig};
pub use types::{
    AgentId, BoxedProvider, CompletionProvider, CompletionResponse, Message, Role, RouteTarget,
    SharedProvider, TokenUsage, WorkflowEvent,
};

/// Atelier version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        // Verify key types are accessible
        let _msg = Message::user("test");
        let _state = WorkflowState::default();
        let _response = CompletionResponse::empty();
    }
}
