// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core types for the atelier workflow engine.
//!
//! This module defines the fundamental data structures used throughout the engine:
//! agent identities, conversation messages, routing targets, workflow events, and
//! the completion-provider abstraction the router classifies with.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

// ============================================================================
// Agents
// ============================================================================

/// Identity of one specialist agent in the workflow.
///
/// The set is closed: every consumption site matches exhaustively, so adding
/// an agent is a compile-time checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentId {
    /// Frames the product: produces the PRD.
    Founder,
    /// Produces the design specification.
    Designer,
    /// Produces the technical plan.
    Planner,
    /// Implements; iterates on its own output.
    Builder,
    /// Produces the test plan; iterates on its own output.
    Tester,
    /// Produces the security review.
    Security,
    /// Produces the code review.
    Reviewer,
}

impl AgentId {
    /// All agents, in no particular order.
    pub const ALL: [AgentId; 7] = [
        AgentId::Founder,
        AgentId::Designer,
        AgentId::Planner,
        AgentId::Builder,
        AgentId::Tester,
        AgentId::Security,
        AgentId::Reviewer,
    ];

    /// Canonical name used in routing, logs, and classifier output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Founder => "Founder",
            Self::Designer => "Designer",
            Self::Planner => "Planner",
            Self::Builder => "Builder",
            Self::Tester => "Tester",
            Self::Security => "Security",
            Self::Reviewer => "Reviewer",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing an agent identity from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseAgentIdError;

impl std::fmt::Display for ParseAgentIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid agent identifier")
    }
}

impl std::error::Error for ParseAgentIdError {}

impl std::str::FromStr for AgentId {
    type Err = ParseAgentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "founder" => Ok(Self::Founder),
            "designer" => Ok(Self::Designer),
            "planner" => Ok(Self::Planner),
            "builder" => Ok(Self::Builder),
            "tester" => Ok(Self::Tester),
            "security" => Ok(Self::Security),
            "reviewer" => Ok(Self::Reviewer),
            _ => Err(ParseAgentIdError),
        }
    }
}

/// Where the router sends the conversation next: a named agent, or done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteTarget {
    /// Hand the turn to this agent.
    Agent(AgentId),
    /// Terminate the workflow.
    Finish,
}

impl RouteTarget {
    /// Whether this target terminates the workflow.
    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish)
    }

    /// The agent, if this target names one.
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Self::Agent(id) => Some(*id),
            Self::Finish => None,
        }
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent(id) => f.write_str(id.as_str()),
            Self::Finish => f.write_str("FINISH"),
        }
    }
}

impl std::str::FromStr for RouteTarget {
    type Err = ParseAgentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("finish") || trimmed.eq_ignore_ascii_case("done") {
            return Ok(Self::Finish);
        }
        trimmed.parse::<AgentId>().map(Self::Agent)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message in the conversation transcript.
///
/// Assistant messages carry the agent that produced them so failures and
/// fallbacks stay attributable in-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Producing agent, for assistant messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            agent: None,
        }
    }

    /// Create an assistant message attributed to an agent.
    pub fn agent(agent: AgentId, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            agent: Some(agent),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            agent: None,
        }
    }
}

// ============================================================================
// Workflow events
// ============================================================================

/// Structured events emitted while a workflow advances.
///
/// The transport that exposes these to clients (HTTP streaming, RPC) is an
/// external collaborator; the engine only produces the sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// An agent's turn began.
    AgentStart { agent: AgentId },
    /// Content produced during an agent's turn.
    Chunk { agent: AgentId, text: String },
    /// Control passed from one agent to the next.
    Handoff {
        from: Option<AgentId>,
        to: AgentId,
    },
    /// An agent's turn ended.
    AgentEnd { agent: AgentId, duration_ms: u64 },
    /// The workflow reached its terminal state.
    Completed { turns: u32 },
    /// A failure was absorbed and surfaced in-band.
    Error {
        agent: Option<AgentId>,
        message: String,
    },
}

// ============================================================================
// Completion providers
// ============================================================================

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Total tokens consumed.
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response from a completion provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Generated text.
    pub content: String,
    /// Token usage, if the provider reports it.
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Create a text-only response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    /// Create an empty response.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Abstraction over a large-language-model backend.
///
/// The engine never talks to a concrete API; the request-handling layer
/// supplies implementations. Only the classification/completion surface the
/// router and agents need is modeled here.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run a single completion against this provider.
    async fn complete(
        &self,
        system_prompt: &str,
        input: &str,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Provider name (for spans and diagnostics).
    fn name(&self) -> &str;

    /// Model identifier (participates in cache keys).
    fn model(&self) -> &str;
}

/// A boxed provider for dynamic dispatch.
pub type BoxedProvider = Box<dyn CompletionProvider>;

/// A shared provider for use across tasks.
pub type SharedProvider = Arc<dyn CompletionProvider>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_agent_id_roundtrip() {
        for agent in AgentId::ALL {
            let parsed = AgentId::from_str(agent.as_str()).unwrap();
            assert_eq!(parsed, agent);
        }
    }

    #[test]
    fn test_agent_id_case_insensitive() {
        assert_eq!(AgentId::from_str("builder").unwrap(), AgentId::Builder);
        assert_eq!(AgentId::from_str("  FOUNDER ").unwrap(), AgentId::Founder);
        assert!(AgentId::from_str("intern").is_err());
    }

    #[test]
    fn test_route_target_parse() {
        assert_eq!(RouteTarget::from_str("FINISH").unwrap(), RouteTarget::Finish);
        assert_eq!(RouteTarget::from_str("finish").unwrap(), RouteTarget::Finish);
        assert_eq!(
            RouteTarget::from_str("Planner").unwrap(),
            RouteTarget::Agent(AgentId::Planner)
        );
        assert!(RouteTarget::from_str("nobody").is_err());
    }

    #[test]
    fn test_route_target_display() {
        assert_eq!(RouteTarget::Finish.to_string(), "FINISH");
        assert_eq!(RouteTarget::Agent(AgentId::Tester).to_string(), "Tester");
    }

    #[test]
    fn test_message_constructors() {
        let msg = Message::agent(AgentId::Builder, "done");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.agent, Some(AgentId::Builder));

        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert!(msg.agent.is_none());
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_workflow_event_serde() {
        let event = WorkflowEvent::Handoff {
            from: Some(AgentId::Founder),
            to: AgentId::Designer,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("handoff"));
        let back: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, WorkflowEvent::Handoff { .. }));
    }
}
