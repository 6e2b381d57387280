// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The workflow engine: one router decision plus one agent invocation per
//! advance, until the router says FINISH or a guard forces it.
//!
//! Each conversation advances strictly sequentially; distinct conversations
//! share nothing but the injected cache, guard, and metrics services, which
//! are concurrency-safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::agents::{AgentRegistry, TurnContext};
use crate::cache::ResponseCache;
use crate::config::EngineConfig;
use crate::guard::SafetyGuard;
use crate::invoke::{InvokerConfig, ResilientInvoker};
use crate::router::TurnRouter;
use crate::state::{StateUpdate, TurnCounter, WorkflowState};
use crate::telemetry::Metrics;
use crate::types::{Message, RouteTarget, SharedProvider, WorkflowEvent};

/// Orchestrates one conversation at a time; cheap to share across many.
pub struct WorkflowEngine {
    config: EngineConfig,
    registry: AgentRegistry,
    router: TurnRouter,
    invoker: ResilientInvoker,
    cache: Arc<ResponseCache>,
    guard: Arc<SafetyGuard>,
    metrics: Arc<Metrics>,
}

impl WorkflowEngine {
    /// Build an engine and its process-wide services from configuration.
    pub fn new(config: EngineConfig, registry: AgentRegistry) -> Self {
        let cache = Arc::new(ResponseCache::with_config(
            config.cache_enabled,
            config.cache_ttl(),
            config.cache_max_entries,
        ));
        let guard = Arc::new(SafetyGuard::with_config(config.guard_config()));
        let metrics = Arc::new(Metrics::new());
        Self::with_services(config, registry, cache, guard, metrics)
    }

    /// Build an engine over existing shared services. Lets multiple engines
    /// (or tests) share one cache, one set of breakers, one metrics sink.
    pub fn with_services(
        config: EngineConfig,
        registry: AgentRegistry,
        cache: Arc<ResponseCache>,
        guard: Arc<SafetyGuard>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let router = TurnRouter::new(guard.clone(), metrics.clone(), config.default_agent);
        let invoker = ResilientInvoker::with_config(
            cache.clone(),
            guard.clone(),
            metrics.clone(),
            InvokerConfig {
                attempts: config.invoke_attempts,
                backoff_base: Duration::from_millis(config.backoff_base_ms),
            },
        );

        Self {
            config,
            registry,
            router,
            invoker,
            cache,
            guard,
            metrics,
        }
    }

    /// Attach the primary classification provider.
    #[must_use]
    pub fn with_primary_provider(mut self, provider: SharedProvider) -> Self {
        self.router.set_primary(provider);
        self
    }

    /// Attach the secondary classification provider.
    #[must_use]
    pub fn with_secondary_provider(mut self, provider: SharedProvider) -> Self {
        self.router.set_secondary(provider);
        self
    }

    /// Fresh state for a new request, routed at the configured entry agent.
    pub fn new_workflow(&self, request: impl Into<String>) -> WorkflowState {
        WorkflowState::with_request(self.config.entry_agent, request)
    }

    /// Whether the workflow has reached its terminal state.
    pub fn is_terminal(&self, state: &WorkflowState) -> bool {
        state.next.is_finish()
    }

    /// The shared response cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// The shared safety guard.
    pub fn guard(&self) -> &Arc<SafetyGuard> {
        &self.guard
    }

    /// The shared metrics service.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Advance the workflow by one turn.
    pub async fn advance(&self, state: &WorkflowState) -> (WorkflowState, Vec<WorkflowEvent>) {
        self.advance_with_cancel(state, None).await
    }

    /// Advance the workflow by one turn, honoring a cancellation signal.
    pub async fn advance_with_cancel(
        &self,
        state: &WorkflowState,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> (WorkflowState, Vec<WorkflowEvent>) {
        if self.is_terminal(state) {
            tracing::debug!("advance on terminal state is a no-op");
            return (state.clone(), Vec::new());
        }

        let previous = state
            .next
            .agent()
            .filter(|agent| state.contributors.contains(agent));

        let decision = self.router.decide(state).await;
        let mut events = Vec::new();

        let agent = match decision.next {
            RouteTarget::Finish => {
                let finished = state.merge(StateUpdate {
                    next: Some(RouteTarget::Finish),
                    turn: Some(TurnCounter::Set(decision.turn_count)),
                    ..Default::default()
                });
                events.push(WorkflowEvent::Completed {
                    turns: finished.turn_count,
                });
                return (finished, events);
            }
            RouteTarget::Agent(agent) => agent,
        };

        // Consecutive repeats of one agent burn its retry budget.
        let retries = if previous == Some(agent) {
            state.retries(agent) + 1
        } else {
            state.retries(agent)
        };
        let retry_check = self.guard.check_agent_retries(agent, retries);
        if !retry_check.is_safe {
            let reason = retry_check.reason.unwrap_or_else(|| "retry limit".to_string());
            tracing::warn!(agent = %agent, reason = %reason, "forcing FINISH");
            let mut update = StateUpdate {
                next: Some(RouteTarget::Finish),
                turn: Some(TurnCounter::Set(decision.turn_count)),
                ..Default::default()
            };
            update.agent_retries.insert(agent, retries);
            let finished = state.merge(update.with_error(reason.clone()));
            events.push(WorkflowEvent::Error {
                agent: Some(agent),
                message: reason,
            });
            events.push(WorkflowEvent::Completed {
                turns: finished.turn_count,
            });
            return (finished, events);
        }

        // Record the routing decision before the agent runs.
        let mut route_update = StateUpdate {
            next: Some(RouteTarget::Agent(agent)),
            turn: Some(TurnCounter::Set(decision.turn_count)),
            ..Default::default()
        };
        route_update.agent_retries.insert(agent, retries);
        let routed = state.merge(route_update);

        if previous.is_some() && previous != Some(agent) {
            events.push(WorkflowEvent::Handoff {
                from: previous,
                to: agent,
            });
        }
        events.push(WorkflowEvent::AgentStart { agent });

        // Soft gate: missing dependencies are a diagnostic, not a block.
        let readiness = routed.artifact_store.check_readiness(agent);
        if !readiness.ready {
            let missing: Vec<&str> = readiness.missing.iter().map(|k| k.as_str()).collect();
            tracing::warn!(
                agent = %agent,
                missing = ?missing,
                "agent dependencies missing, proceeding with partial context"
            );
        }

        let Some(worker) = self.registry.get(agent) else {
            // Nothing can run this turn and routing would just repeat it.
            let reason = format!("no worker registered for {}", agent);
            tracing::error!(agent = %agent, "unregistered agent routed, forcing FINISH");
            let finished = routed.merge(
                StateUpdate {
                    next: Some(RouteTarget::Finish),
                    ..Default::default()
                }
                .with_error(reason.clone()),
            );
            events.push(WorkflowEvent::Error {
                agent: Some(agent),
                message: reason,
            });
            events.push(WorkflowEvent::Completed {
                turns: finished.turn_count,
            });
            return (finished, events);
        };

        let ctx = TurnContext {
            request: routed.latest_user_message().unwrap_or("").to_string(),
            transcript: routed.messages.clone(),
            artifact_context: routed.artifact_store.format_context(),
            artifacts: routed.artifact_store.clone(),
        };

        let outcome = self.invoker.invoke(worker, &ctx, cancel).await;

        events.push(WorkflowEvent::Chunk {
            agent,
            text: outcome.reply.message.clone(),
        });

        let mut turn_update =
            StateUpdate::message(Message::agent(agent, outcome.reply.message.clone()))
                .with_contributor(agent);
        if let Some(artifact) = outcome.reply.artifact.clone() {
            turn_update = turn_update.with_artifact(artifact, agent);
        }
        if outcome.fell_back {
            let diagnostic = outcome
                .error
                .clone()
                .unwrap_or_else(|| "agent failed".to_string());
            events.push(WorkflowEvent::Error {
                agent: Some(agent),
                message: diagnostic.clone(),
            });
            turn_update.needs_retry = Some(true);
            turn_update = turn_update.with_error(diagnostic);
        } else {
            turn_update.needs_retry = Some(false);
            turn_update = turn_update.clearing_error();
        }

        events.push(WorkflowEvent::AgentEnd {
            agent,
            duration_ms: outcome.duration.as_millis() as u64,
        });

        (routed.merge(turn_update), events)
    }

    /// Drive the workflow until terminal, accumulating all events.
    pub async fn run(
        &self,
        state: WorkflowState,
        cancel: Option<watch::Receiver<bool>>,
    ) -> (WorkflowState, Vec<WorkflowEvent>) {
        let mut state = state;
        let mut all_events = Vec::new();

        while !self.is_terminal(&state) {
            if cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false) {
                tracing::info!("workflow cancelled by caller");
                state = state.merge(StateUpdate {
                    next: Some(RouteTarget::Finish),
                    ..Default::default()
                });
                all_events.push(WorkflowEvent::Error {
                    agent: None,
                    message: "cancelled by caller".to_string(),
                });
                break;
            }

            let (next_state, events) = self.advance_with_cancel(&state, cancel.as_ref()).await;
            state = next_state;
            all_events.extend(events);
        }

        (state, all_events)
    }
}
