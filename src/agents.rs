// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent worker trait and registry.
//!
//! A worker is the executable side of one [`AgentId`]: given the turn
//! context it produces a reply and, usually, an artifact. What a worker says
//! (its prompt, its model) is the embedding layer's concern; the engine only
//! needs this seam.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::{Artifact, ArtifactStore};
use crate::error::Result;
use crate::types::{AgentId, Message, TokenUsage};

/// Everything a worker gets to see for one turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    /// The user query driving this workflow (the most recent user message).
    pub request: String,
    /// Conversation transcript so far.
    pub transcript: Vec<Message>,
    /// Artifact briefing from [`ArtifactStore::format_context`].
    pub artifact_context: String,
    /// Typed access to the current artifacts.
    pub artifacts: ArtifactStore,
}

impl TurnContext {
    /// Context for a bare request with no history.
    pub fn for_request(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            transcript: Vec::new(),
            artifact_context: String::new(),
            artifacts: ArtifactStore::new(),
        }
    }
}

/// What one worker turn produced.
///
/// Serializable so the response cache can memoize whole replies.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentReply {
    /// Message content for the transcript.
    pub message: String,
    /// Artifact produced this turn, if any.
    pub artifact: Option<Artifact>,
    /// Token usage, if the underlying provider reported it.
    pub usage: Option<TokenUsage>,
}

impl AgentReply {
    /// A plain text reply.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            artifact: None,
            usage: None,
        }
    }

    /// Attach an artifact to this reply.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Attach token usage to this reply.
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Trait implemented by every agent worker.
#[async_trait]
pub trait AgentWorker: Send + Sync {
    /// Which agent this worker embodies.
    fn id(&self) -> AgentId;

    /// Whether replies from this worker may be served from the response
    /// cache. Workers whose output depends on more than the user query
    /// should opt out.
    fn cacheable(&self) -> bool {
        true
    }

    /// Run one turn.
    async fn run(&self, ctx: &TurnContext) -> Result<AgentReply>;
}

/// Registry of available workers, maps agent identities to implementations.
#[derive(Default)]
pub struct AgentRegistry {
    workers: HashMap<AgentId, Arc<dyn AgentWorker>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker. A later registration for the same agent replaces
    /// the earlier one.
    pub fn register(&mut self, worker: Arc<dyn AgentWorker>) {
        self.workers.insert(worker.id(), worker);
    }

    /// Look up the worker for an agent.
    pub fn get(&self, agent: AgentId) -> Option<Arc<dyn AgentWorker>> {
        self.workers.get(&agent).cloned()
    }

    /// Whether a worker is registered for an agent.
    pub fn contains(&self, agent: AgentId) -> bool {
        self.workers.contains_key(&agent)
    }

    /// Registered agents, sorted.
    pub fn agents(&self) -> Vec<AgentId> {
        let mut agents: Vec<_> = self.workers.keys().copied().collect();
        agents.sort();
        agents
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoWorker {
        id: AgentId,
    }

    #[async_trait]
    impl AgentWorker for EchoWorker {
        fn id(&self) -> AgentId {
            self.id
        }

        async fn run(&self, ctx: &TurnContext) -> Result<AgentReply> {
            Ok(AgentReply::text(format!("{}: {}", self.id, ctx.request)))
        }
    }

    #[tokio::test]
    async fn test_registry_register_and_dispatch() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(EchoWorker {
            id: AgentId::Builder,
        }));

        assert!(registry.contains(AgentId::Builder));
        assert!(!registry.contains(AgentId::Tester));
        assert_eq!(registry.agents(), vec![AgentId::Builder]);

        let worker = registry.get(AgentId::Builder).unwrap();
        let ctx = TurnContext::for_request("build a login form");
        let reply = worker.run(&ctx).await.unwrap();
        assert_eq!(reply.message, "Builder: build a login form");
        assert!(reply.artifact.is_none());
    }

    #[test]
    fn test_registry_replaces_on_reregister() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(EchoWorker {
            id: AgentId::Tester,
        }));
        registry.register(Arc::new(EchoWorker {
            id: AgentId::Tester,
        }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reply_builders() {
        let reply = AgentReply::text("done").with_usage(TokenUsage {
            input_tokens: 10,
            output_tokens: 2,
        });
        assert_eq!(reply.message, "done");
        assert_eq!(reply.usage.unwrap().total(), 12);
    }
}
