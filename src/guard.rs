// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Safety guard: turn limits, retry budgets, circuit breakers, timeouts.
//!
//! The guard prevents a sick agent or a runaway conversation from consuming
//! unbounded resources. Limit checks are pure; the circuit breakers are
//! process-wide state keyed by agent, shared across all conversations.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::error::{GuardError, Result};
use crate::types::AgentId;

/// Default cap on router decisions per conversation.
pub const MAX_TURNS: u32 = 50;

/// Default retry budget for self-loop-capable agents.
pub const MAX_AGENT_RETRIES: u32 = 3;

/// Default per-call timeout.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default circuit-breaker cooldown.
pub const BREAKER_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Limits enforced by the guard.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Hard cap on router decisions per conversation.
    pub max_turns: u32,
    /// Retry budget for self-loop-capable agents; everyone else gets 1.
    pub max_agent_retries: u32,
    /// Per-call timeout.
    pub call_timeout: Duration,
    /// How long an open breaker stays open before auto-recovery.
    pub breaker_cooldown: Duration,
    /// Agents expected to iterate on their own output.
    pub self_loop_agents: BTreeSet<AgentId>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_turns: MAX_TURNS,
            max_agent_retries: MAX_AGENT_RETRIES,
            call_timeout: CALL_TIMEOUT,
            breaker_cooldown: BREAKER_COOLDOWN,
            self_loop_agents: [AgentId::Builder, AgentId::Tester].into_iter().collect(),
        }
    }
}

/// Outcome of a pure limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyCheck {
    /// Proceeding is within limits.
    pub is_safe: bool,
    /// Names the violated limit when unsafe.
    pub reason: Option<String>,
}

impl SafetyCheck {
    fn safe() -> Self {
        Self {
            is_safe: true,
            reason: None,
        }
    }

    fn violation(reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: Some(reason.into()),
        }
    }
}

/// Circuit-breaker state for one agent.
#[derive(Debug, Clone, Copy, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
    is_open: bool,
}

/// Read-only view of one agent's breaker, for metrics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub failure_count: u32,
    pub is_open: bool,
}

/// The safety guard. Construct once per process and inject.
pub struct SafetyGuard {
    config: GuardConfig,
    breakers: RwLock<HashMap<AgentId, BreakerState>>,
}

impl SafetyGuard {
    /// Create a guard with default limits.
    pub fn new() -> Self {
        Self::with_config(GuardConfig::default())
    }

    /// Create a guard with custom limits.
    pub fn with_config(config: GuardConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The configured limits.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Check the conversation-wide turn limit.
    pub fn check_turn_limit(&self, turn_count: u32) -> SafetyCheck {
        if turn_count >= self.config.max_turns {
            SafetyCheck::violation(format!(
                "turn limit reached: {} of {} turns used",
                turn_count, self.config.max_turns
            ))
        } else {
            SafetyCheck::safe()
        }
    }

    /// The retry budget for an agent: `max_agent_retries` for agents that
    /// iterate on their own output, exactly 1 for everyone else.
    pub fn retry_budget(&self, agent: AgentId) -> u32 {
        if self.config.self_loop_agents.contains(&agent) {
            self.config.max_agent_retries
        } else {
            1
        }
    }

    /// Check an agent's retry budget.
    pub fn check_agent_retries(&self, agent: AgentId, retries: u32) -> SafetyCheck {
        let budget = self.retry_budget(agent);
        if retries >= budget {
            SafetyCheck::violation(format!(
                "retry budget exhausted for {}: {} of {} retries used",
                agent, retries, budget
            ))
        } else {
            SafetyCheck::safe()
        }
    }

    /// Record a failed call. Opens the breaker once the failure count
    /// reaches `max_agent_retries`.
    pub fn record_failure(&self, agent: AgentId) {
        if let Ok(mut breakers) = self.breakers.write() {
            let state = breakers.entry(agent).or_default();
            state.failure_count += 1;
            state.last_failure = Some(Instant::now());
            if state.failure_count >= self.config.max_agent_retries {
                if !state.is_open {
                    tracing::warn!(agent = %agent, failures = state.failure_count, "circuit breaker opened");
                }
                state.is_open = true;
            }
        }
    }

    /// Record a successful call. Closes the breaker and resets its count.
    pub fn record_success(&self, agent: AgentId) {
        if let Ok(mut breakers) = self.breakers.write() {
            let state = breakers.entry(agent).or_default();
            state.failure_count = 0;
            state.last_failure = None;
            state.is_open = false;
        }
    }

    /// Whether calls to this agent are currently being skipped.
    ///
    /// An open breaker whose cooldown has elapsed auto-recovers here: the
    /// failure count resets and the breaker closes.
    pub fn is_open(&self, agent: AgentId) -> bool {
        let mut breakers = match self.breakers.write() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let state = breakers.entry(agent).or_default();

        if state.is_open {
            let cooled = state
                .last_failure
                .map(|at| at.elapsed() > self.config.breaker_cooldown)
                .unwrap_or(true);
            if cooled {
                tracing::info!(agent = %agent, "circuit breaker cooled down, closing");
                state.failure_count = 0;
                state.last_failure = None;
                state.is_open = false;
                return false;
            }
        }

        state.is_open
    }

    /// Read-only breaker view for one agent.
    pub fn breaker(&self, agent: AgentId) -> BreakerSnapshot {
        match self.breakers.read() {
            Ok(breakers) => breakers
                .get(&agent)
                .map(|s| BreakerSnapshot {
                    failure_count: s.failure_count,
                    is_open: s.is_open,
                })
                .unwrap_or_default(),
            Err(_) => BreakerSnapshot::default(),
        }
    }

    /// Race `call` against the configured per-call timeout.
    ///
    /// On timeout the result names the agent and the budget; otherwise the
    /// call's own outcome is returned. The timer is dropped on both paths.
    pub async fn with_timeout<F, T>(&self, agent: AgentId, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = self.config.call_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GuardError::Timeout {
                agent,
                timeout_ms: timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    /// Run `call` under breaker and timeout protection.
    ///
    /// An open breaker short-circuits to `fallback` without invoking the
    /// call. Otherwise success and failure are recorded in the breaker, and
    /// any failure degrades to `fallback` instead of propagating.
    pub async fn safe_execute<F, T>(&self, agent: AgentId, call: F, fallback: T) -> T
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_open(agent) {
            tracing::warn!(agent = %agent, "circuit open, returning fallback without calling");
            return fallback;
        }

        match self.with_timeout(agent, call).await {
            Ok(value) => {
                self.record_success(agent);
                value
            }
            Err(err) => {
                self.record_failure(agent);
                tracing::warn!(agent = %agent, error = %err, "call failed, returning fallback");
                fallback
            }
        }
    }
}

impl Default for SafetyGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn quick_guard(cooldown: Duration) -> SafetyGuard {
        SafetyGuard::with_config(GuardConfig {
            breaker_cooldown: cooldown,
            ..GuardConfig::default()
        })
    }

    #[test]
    fn test_turn_limit_boundary() {
        let guard = SafetyGuard::new();
        assert!(guard.check_turn_limit(0).is_safe);
        assert!(guard.check_turn_limit(49).is_safe);

        let check = guard.check_turn_limit(50);
        assert!(!check.is_safe);
        assert!(check.reason.unwrap().contains("turn limit"));

        assert!(!guard.check_turn_limit(51).is_safe);
    }

    #[test]
    fn test_retry_budget_by_agent() {
        let guard = SafetyGuard::new();
        assert_eq!(guard.retry_budget(AgentId::Builder), 3);
        assert_eq!(guard.retry_budget(AgentId::Tester), 3);
        assert_eq!(guard.retry_budget(AgentId::Founder), 1);
        assert_eq!(guard.retry_budget(AgentId::Reviewer), 1);
    }

    #[test]
    fn test_single_failure_exhausts_non_self_loop_budget() {
        let guard = SafetyGuard::new();
        assert!(guard.check_agent_retries(AgentId::Designer, 0).is_safe);
        assert!(!guard.check_agent_retries(AgentId::Designer, 1).is_safe);

        assert!(guard.check_agent_retries(AgentId::Builder, 2).is_safe);
        let check = guard.check_agent_retries(AgentId::Builder, 3);
        assert!(!check.is_safe);
        assert!(check.reason.unwrap().contains("Builder"));
    }

    #[test]
    fn test_breaker_opens_at_threshold_not_before() {
        let guard = SafetyGuard::new();

        guard.record_failure(AgentId::Builder);
        guard.record_failure(AgentId::Builder);
        assert!(!guard.is_open(AgentId::Builder));
        assert_eq!(guard.breaker(AgentId::Builder).failure_count, 2);

        guard.record_failure(AgentId::Builder);
        assert!(guard.is_open(AgentId::Builder));
    }

    #[test]
    fn test_breaker_cooldown_auto_recovery() {
        let guard = quick_guard(Duration::from_millis(10));
        for _ in 0..3 {
            guard.record_failure(AgentId::Builder);
        }
        assert!(guard.is_open(AgentId::Builder));

        std::thread::sleep(Duration::from_millis(20));

        assert!(!guard.is_open(AgentId::Builder));
        assert_eq!(guard.breaker(AgentId::Builder).failure_count, 0);
    }

    #[test]
    fn test_record_success_closes_breaker() {
        let guard = SafetyGuard::new();
        for _ in 0..3 {
            guard.record_failure(AgentId::Tester);
        }
        assert!(guard.is_open(AgentId::Tester));

        guard.record_success(AgentId::Tester);
        assert!(!guard.is_open(AgentId::Tester));
        assert_eq!(guard.breaker(AgentId::Tester), BreakerSnapshot::default());
    }

    #[test]
    fn test_breakers_are_per_agent() {
        let guard = SafetyGuard::new();
        for _ in 0..3 {
            guard.record_failure(AgentId::Builder);
        }
        assert!(guard.is_open(AgentId::Builder));
        assert!(!guard.is_open(AgentId::Tester));
    }

    #[tokio::test]
    async fn test_with_timeout_fires() {
        let guard = SafetyGuard::with_config(GuardConfig {
            call_timeout: Duration::from_millis(10),
            ..GuardConfig::default()
        });

        let result: Result<&str> = guard
            .with_timeout(AgentId::Builder, async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok("too late")
            })
            .await;

        let err = result.unwrap_err();
        let guard_err = err.downcast_ref::<GuardError>().unwrap();
        assert!(matches!(
            guard_err,
            GuardError::Timeout {
                agent: AgentId::Builder,
                timeout_ms: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_outcome_through() {
        let guard = SafetyGuard::new();

        let ok: Result<u32> = guard.with_timeout(AgentId::Planner, async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<u32> = guard
            .with_timeout(AgentId::Planner, async {
                Err(anyhow::anyhow!("provider exploded"))
            })
            .await;
        assert!(err.unwrap_err().to_string().contains("provider exploded"));
    }

    #[tokio::test]
    async fn test_safe_execute_open_breaker_skips_call() {
        let guard = SafetyGuard::new();
        for _ in 0..3 {
            guard.record_failure(AgentId::Builder);
        }

        let invoked = Arc::new(AtomicBool::new(false));
        let flag = invoked.clone();
        let result = guard
            .safe_execute(
                AgentId::Builder,
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok("real".to_string())
                },
                "fallback".to_string(),
            )
            .await;

        assert_eq!(result, "fallback");
        assert!(!invoked.load(Ordering::SeqCst), "open breaker must skip the call");
    }

    #[tokio::test]
    async fn test_safe_execute_records_success_and_failure() {
        let guard = SafetyGuard::new();

        let ok = guard
            .safe_execute(AgentId::Tester, async { Ok(1u32) }, 0u32)
            .await;
        assert_eq!(ok, 1);
        assert_eq!(guard.breaker(AgentId::Tester).failure_count, 0);

        let fell_back = guard
            .safe_execute(
                AgentId::Tester,
                async { Err(anyhow::anyhow!("boom")) },
                99u32,
            )
            .await;
        assert_eq!(fell_back, 99);
        assert_eq!(guard.breaker(AgentId::Tester).failure_count, 1);
    }
}
