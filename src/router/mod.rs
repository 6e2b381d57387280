// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Turn router: decides which agent acts next, or that the workflow is done.
//!
//! Decision tiers, first success wins:
//!
//! - Tier 3 (checked first): the turn-limit guard forces FINISH regardless
//!   of content.
//! - Tier 0: the primary completion provider classifies the conversation.
//! - Tier 1: the secondary provider, when the primary errors or times out.
//! - Tier 2: deterministic keyword matching over the user's text, falling
//!   back to a configured default agent.
//!
//! Each tier increments a named counter so degradation is observable.

pub mod policy;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RouterError;
use crate::guard::SafetyGuard;
use crate::state::WorkflowState;
use crate::telemetry::{Metrics, RouteTier};
use crate::types::{AgentId, RouteTarget, Role, SharedProvider};

/// How many trailing messages the classifier gets to see.
const CLASSIFIER_WINDOW: usize = 6;

/// Per-message cap in the classifier digest.
const CLASSIFIER_SNIPPET_CHARS: usize = 300;

/// One routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    /// Who acts next, or FINISH.
    pub next: RouteTarget,
    /// The turn count after this decision.
    pub turn_count: u32,
    /// Which tier produced the decision.
    pub tier: RouteTier,
}

/// The tiered router.
pub struct TurnRouter {
    primary: Option<SharedProvider>,
    secondary: Option<SharedProvider>,
    guard: Arc<SafetyGuard>,
    metrics: Arc<Metrics>,
    default_agent: AgentId,
    classify_timeout: Duration,
}

impl TurnRouter {
    /// Create a router over the shared guard and metrics.
    pub fn new(guard: Arc<SafetyGuard>, metrics: Arc<Metrics>, default_agent: AgentId) -> Self {
        let classify_timeout = guard.config().call_timeout;
        Self {
            primary: None,
            secondary: None,
            guard,
            metrics,
            default_agent,
            classify_timeout,
        }
    }

    /// Attach the primary classification provider (tier 0).
    #[must_use]
    pub fn with_primary(mut self, provider: SharedProvider) -> Self {
        self.primary = Some(provider);
        self
    }

    /// Attach the secondary classification provider (tier 1).
    #[must_use]
    pub fn with_secondary(mut self, provider: SharedProvider) -> Self {
        self.secondary = Some(provider);
        self
    }

    /// Replace the primary provider in place.
    pub fn set_primary(&mut self, provider: SharedProvider) {
        self.primary = Some(provider);
    }

    /// Replace the secondary provider in place.
    pub fn set_secondary(&mut self, provider: SharedProvider) {
        self.secondary = Some(provider);
    }

    /// Decide the next agent for the current state.
    ///
    /// Never fails: every tier has a deterministic floor beneath it.
    pub async fn decide(&self, state: &WorkflowState) -> RouteDecision {
        let turn_count = state.turn_count + 1;

        // Tier 3 first: past the turn limit nothing else matters.
        let limit_check = self.guard.check_turn_limit(state.turn_count);
        if !limit_check.is_safe {
            tracing::warn!(
                reason = limit_check.reason.as_deref().unwrap_or(""),
                "forcing FINISH"
            );
            self.metrics.record_route(RouteTier::TurnLimit);
            return RouteDecision {
                next: RouteTarget::Finish,
                turn_count,
                tier: RouteTier::TurnLimit,
            };
        }

        let digest = conversation_digest(state);

        // Tier 0: primary provider.
        if let Some(provider) = &self.primary {
            match self.classify(provider, &digest).await {
                Ok(next) => {
                    self.metrics.record_route(RouteTier::Primary);
                    return RouteDecision {
                        next,
                        turn_count,
                        tier: RouteTier::Primary,
                    };
                }
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "primary classification failed");
                }
            }
        }

        // Tier 1: secondary provider.
        if let Some(provider) = &self.secondary {
            match self.classify(provider, &digest).await {
                Ok(next) => {
                    self.metrics.record_route(RouteTier::Secondary);
                    return RouteDecision {
                        next,
                        turn_count,
                        tier: RouteTier::Secondary,
                    };
                }
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "secondary classification failed");
                }
            }
        }

        // Tier 2: deterministic keyword matching, then the default agent.
        let text = state.latest_user_message().unwrap_or("");
        let agent = policy::keyword_match(text).unwrap_or(self.default_agent);
        tracing::debug!(agent = %agent, "keyword routing");
        self.metrics.record_route(RouteTier::Keyword);
        RouteDecision {
            next: RouteTarget::Agent(agent),
            turn_count,
            tier: RouteTier::Keyword,
        }
    }

    /// Ask one provider to classify the conversation.
    async fn classify(
        &self,
        provider: &SharedProvider,
        digest: &str,
    ) -> Result<RouteTarget, RouterError> {
        let call = provider.complete(policy::CLASSIFIER_PROMPT, digest);
        let response = tokio::time::timeout(self.classify_timeout, call)
            .await
            .map_err(|_| {
                RouterError::Classification(format!(
                    "timed out after {}ms",
                    self.classify_timeout.as_millis()
                ))
            })?
            .map_err(|err| RouterError::Classification(err.to_string()))?;

        if let Some(usage) = response.usage {
            self.metrics
                .record_tokens(usage.input_tokens as u64, usage.output_tokens as u64);
        }

        RouteTarget::from_str(&response.content)
            .map_err(|_| RouterError::UnknownAgent(response.content.trim().to_string()))
    }
}

/// Compact transcript tail the classifier reads instead of the full history.
fn conversation_digest(state: &WorkflowState) -> String {
    let skip = state.messages.len().saturating_sub(CLASSIFIER_WINDOW);
    state
        .messages
        .iter()
        .skip(skip)
        .map(|message| {
            let who = match (message.role, message.agent) {
                (Role::Assistant, Some(agent)) => agent.as_str().to_string(),
                (Role::Assistant, None) => "assistant".to_string(),
                (Role::User, _) => "user".to_string(),
                (Role::System, _) => "system".to_string(),
            };
            format!("{}: {}", who, truncate(&message.content, CLASSIFIER_SNIPPET_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `max_chars` characters, appending "..." if truncated.
/// Safe for multi-byte UTF-8 (truncates at char boundary).
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::ProviderError;
    use crate::guard::GuardConfig;
    use crate::types::{CompletionProvider, CompletionResponse, Message};

    struct FixedProvider {
        answer: Result<&'static str, ()>,
    }

    impl FixedProvider {
        fn answering(answer: &'static str) -> Arc<Self> {
            Arc::new(Self { answer: Ok(answer) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { answer: Err(()) })
        }
    }

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(
            &self,
            _system_prompt: &str,
            _input: &str,
        ) -> Result<CompletionResponse, ProviderError> {
            match self.answer {
                Ok(text) => Ok(CompletionResponse::text(text)),
                Err(()) => Err(ProviderError::NetworkError("unreachable".to_string())),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-1"
        }
    }

    fn router() -> TurnRouter {
        TurnRouter::new(
            Arc::new(SafetyGuard::new()),
            Arc::new(Metrics::new()),
            AgentId::Founder,
        )
    }

    #[tokio::test]
    async fn test_turn_limit_forces_finish_regardless_of_content() {
        let guard = Arc::new(SafetyGuard::with_config(GuardConfig {
            max_turns: 5,
            ..GuardConfig::default()
        }));
        let metrics = Arc::new(Metrics::new());
        let router = TurnRouter::new(guard, metrics.clone(), AgentId::Founder)
            .with_primary(FixedProvider::answering("Builder"));

        let mut state = WorkflowState::with_request(AgentId::Founder, "please build a login form");
        state.turn_count = 5;

        let decision = router.decide(&state).await;
        assert_eq!(decision.next, RouteTarget::Finish);
        assert_eq!(decision.tier, RouteTier::TurnLimit);
        assert_eq!(decision.turn_count, 6);
        assert_eq!(metrics.route_tiers().level3, 1);
    }

    #[tokio::test]
    async fn test_primary_classification() {
        let router = router().with_primary(FixedProvider::answering("Designer"));
        let state = WorkflowState::with_request(AgentId::Founder, "make it pretty");

        let decision = router.decide(&state).await;
        assert_eq!(decision.next, RouteTarget::Agent(AgentId::Designer));
        assert_eq!(decision.tier, RouteTier::Primary);
        assert_eq!(decision.turn_count, 1);
    }

    #[tokio::test]
    async fn test_primary_finish_answer() {
        let router = router().with_primary(FixedProvider::answering("FINISH"));
        let state = WorkflowState::with_request(AgentId::Founder, "thanks, all done");

        let decision = router.decide(&state).await;
        assert_eq!(decision.next, RouteTarget::Finish);
    }

    #[tokio::test]
    async fn test_secondary_takes_over_on_primary_failure() {
        let metrics = Arc::new(Metrics::new());
        let router = TurnRouter::new(Arc::new(SafetyGuard::new()), metrics.clone(), AgentId::Founder)
            .with_primary(FixedProvider::failing())
            .with_secondary(FixedProvider::answering("Planner"));
        let state = WorkflowState::with_request(AgentId::Founder, "what next?");

        let decision = router.decide(&state).await;
        assert_eq!(decision.next, RouteTarget::Agent(AgentId::Planner));
        assert_eq!(decision.tier, RouteTier::Secondary);
        assert_eq!(metrics.route_tiers().level1, 1);
    }

    #[tokio::test]
    async fn test_unparseable_answer_degrades() {
        // Primary answers garbage, secondary answers garbage: keyword tier
        // must resolve it.
        let router = router()
            .with_primary(FixedProvider::answering("the Builder should act"))
            .with_secondary(FixedProvider::answering("hmm"));
        let state = WorkflowState::with_request(AgentId::Founder, "please build a login form");

        let decision = router.decide(&state).await;
        assert_eq!(decision.next, RouteTarget::Agent(AgentId::Builder));
        assert_eq!(decision.tier, RouteTier::Keyword);
    }

    #[tokio::test]
    async fn test_keyword_routing_without_providers() {
        let router = router();
        let state = WorkflowState::with_request(AgentId::Founder, "please build a login form");

        let decision = router.decide(&state).await;
        assert_eq!(decision.next, RouteTarget::Agent(AgentId::Builder));
        assert_eq!(decision.tier, RouteTier::Keyword);
    }

    #[tokio::test]
    async fn test_keyword_whole_word_no_substring_false_positive() {
        let router = router();
        // "suite" contains "ui" and "building" contains "build"; neither may
        // match, so routing lands on the default agent.
        let state =
            WorkflowState::with_request(AgentId::Founder, "the building has a lovely suite");

        let decision = router.decide(&state).await;
        assert_eq!(decision.next, RouteTarget::Agent(AgentId::Founder));
    }

    #[tokio::test]
    async fn test_no_match_routes_default() {
        let metrics = Arc::new(Metrics::new());
        let router = TurnRouter::new(
            Arc::new(SafetyGuard::new()),
            metrics.clone(),
            AgentId::Planner,
        );
        let state = WorkflowState::with_request(AgentId::Founder, "hello there");

        let decision = router.decide(&state).await;
        assert_eq!(decision.next, RouteTarget::Agent(AgentId::Planner));
        assert_eq!(metrics.route_tiers().level2, 1);
        assert_eq!(metrics.route_tiers().total, 1);
    }

    #[test]
    fn test_conversation_digest_window() {
        let mut state = WorkflowState::with_request(AgentId::Founder, "start");
        for i in 0..10 {
            state.messages.push(Message::agent(AgentId::Builder, format!("step {}", i)));
        }

        let digest = conversation_digest(&state);
        assert!(digest.contains("Builder: step 9"));
        assert!(!digest.contains("user: start"), "old messages fall out of the window");
        assert_eq!(digest.lines().count(), CLASSIFIER_WINDOW);
    }

    #[test]
    fn test_truncate_multibyte() {
        let result = truncate("café!", 4);
        assert_eq!(result, "café...");
    }
}
