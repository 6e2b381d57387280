// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Workflow state and the pure merge that advances it.
//!
//! One [`WorkflowState`] is threaded through every turn of a conversation.
//! Turns never mutate it in place: each produces a [`StateUpdate`] and the
//! engine applies [`WorkflowState::merge`], so replay and testing are
//! deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactStore};
use crate::types::{AgentId, Message, RouteTarget};

/// How a partial update touches the turn counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnCounter {
    /// Increment by one. This is what every router decision emits.
    Advance,
    /// Explicit override. Clamped so the counter never decreases.
    Set(u32),
}

/// The versioned record for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Full conversation transcript, append-only.
    pub messages: Vec<Message>,
    /// Routing decision for the upcoming turn.
    pub next: RouteTarget,
    /// Every agent that has contributed so far. Never shrinks.
    pub contributors: BTreeSet<AgentId>,
    /// Append-only log of every artifact ever produced (superseded versions
    /// included). The authoritative current-per-kind view is `artifact_store`.
    pub artifacts: Vec<Artifact>,
    /// Current artifact per kind, with producers and timestamps.
    pub artifact_store: ArtifactStore,
    /// Router decisions taken so far. Monotonically non-decreasing.
    pub turn_count: u32,
    /// Consecutive self-loop count per agent.
    pub agent_retries: BTreeMap<AgentId, u32>,
    /// The last turn failed and the same agent should run again.
    pub needs_retry: bool,
    /// Diagnostic from the most recent failure, if any.
    pub last_error: Option<String>,
}

impl WorkflowState {
    /// Fresh state routed at the entry agent.
    pub fn new(entry: AgentId) -> Self {
        Self {
            messages: Vec::new(),
            next: RouteTarget::Agent(entry),
            contributors: BTreeSet::new(),
            artifacts: Vec::new(),
            artifact_store: ArtifactStore::new(),
            turn_count: 0,
            agent_retries: BTreeMap::new(),
            needs_retry: false,
            last_error: None,
        }
    }

    /// Fresh state seeded with the user's opening message.
    pub fn with_request(entry: AgentId, request: impl Into<String>) -> Self {
        let mut state = Self::new(entry);
        state.messages.push(Message::user(request));
        state
    }

    /// The most recent user message, if any. This is what routing and cache
    /// keying operate on.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::types::Role::User))
            .map(|m| m.content.as_str())
    }

    /// Recorded retries for an agent.
    pub fn retries(&self, agent: AgentId) -> u32 {
        self.agent_retries.get(&agent).copied().unwrap_or(0)
    }

    /// Apply a partial update, producing the successor state.
    ///
    /// Pure: `self` is untouched. Field semantics:
    /// messages/artifacts append, `next`/`needs_retry`/`last_error` are
    /// last-write-wins, contributors union, artifact slots shallow-merge,
    /// retries merge per key, and the turn counter advances or is overridden
    /// (never backwards).
    #[must_use = "merge returns the successor state; the original is unchanged"]
    pub fn merge(&self, update: StateUpdate) -> WorkflowState {
        let mut next = self.clone();

        next.messages.extend(update.messages);
        next.artifacts
            .extend(update.artifacts.iter().map(|(artifact, _)| artifact.clone()));

        for (artifact, producer) in update.artifacts {
            let producer = producer.unwrap_or_else(|| {
                // Unattributed writes fall back to the routed agent.
                self.next.agent().unwrap_or(AgentId::Founder)
            });
            next.artifact_store.insert(artifact, producer);
        }

        if let Some(target) = update.next {
            next.next = target;
        }

        next.contributors.extend(update.contributors);

        match update.turn {
            Some(TurnCounter::Advance) => next.turn_count += 1,
            Some(TurnCounter::Set(value)) => next.turn_count = next.turn_count.max(value),
            None => {}
        }

        for (agent, count) in update.agent_retries {
            next.agent_retries.insert(agent, count);
        }

        if let Some(flag) = update.needs_retry {
            next.needs_retry = flag;
        }

        if let Some(error) = update.last_error {
            next.last_error = error;
        }

        next
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new(AgentId::Founder)
    }
}

/// A partial update produced by one turn.
///
/// Every field is optional or additive; `Default` is a no-op update.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    /// Messages to append.
    pub messages: Vec<Message>,
    /// New routing decision.
    pub next: Option<RouteTarget>,
    /// Agents to add to the contributor set.
    pub contributors: BTreeSet<AgentId>,
    /// Artifacts produced this turn, each with an optional explicit producer.
    pub artifacts: Vec<(Artifact, Option<AgentId>)>,
    /// Turn counter action.
    pub turn: Option<TurnCounter>,
    /// Per-agent retry counts to overwrite.
    pub agent_retries: BTreeMap<AgentId, u32>,
    /// New retry flag.
    pub needs_retry: Option<bool>,
    /// New error diagnostic; `Some(None)` clears it.
    pub last_error: Option<Option<String>>,
}

impl StateUpdate {
    /// Update carrying a single message.
    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            ..Self::default()
        }
    }

    /// Update carrying a routing decision and a turn advance.
    pub fn route(target: RouteTarget) -> Self {
        Self {
            next: Some(target),
            turn: Some(TurnCounter::Advance),
            ..Self::default()
        }
    }

    /// Add a contributor.
    #[must_use]
    pub fn with_contributor(mut self, agent: AgentId) -> Self {
        self.contributors.insert(agent);
        self
    }

    /// Add an artifact attributed to a producer.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact, producer: AgentId) -> Self {
        self.artifacts.push((artifact, Some(producer)));
        self
    }

    /// Record a failure diagnostic.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(Some(error.into()));
        self
    }

    /// Clear any recorded failure diagnostic.
    #[must_use]
    pub fn clearing_error(mut self) -> Self {
        self.last_error = Some(None);
        self
    }
}

/// Bookkeeping for one end-to-end workflow run.
///
/// Accumulates token usage across turns; the request-handling layer keys
/// these by the conversation identifier it supplies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: String,
    /// Short title (usually derived from the opening request).
    pub title: String,
    /// Total prompt tokens used.
    pub prompt_tokens: u64,
    /// Total completion tokens used.
    pub completion_tokens: u64,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
    /// Last update timestamp (Unix epoch seconds).
    pub updated_at: i64,
}

impl Conversation {
    /// Create a new conversation record.
    pub fn new(title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Self::generate_id(),
            title: title.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Generate a unique conversation ID based on timestamp and UUID.
    pub fn generate_id() -> String {
        let now = chrono::Utc::now();
        let short_uuid = &uuid::Uuid::new_v4().to_string()[..8];
        format!("conv-{}-{}", now.format("%Y-%m-%d-%H-%M-%S"), short_uuid)
    }

    /// Update the record's updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// Add token usage to the conversation.
    pub fn add_usage(&mut self, prompt_tokens: u64, completion_tokens: u64) {
        self.prompt_tokens += prompt_tokens;
        self.completion_tokens += completion_tokens;
        self.touch();
    }

    /// Get total tokens used.
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}
