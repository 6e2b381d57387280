// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resilient call wrapper around a single agent invocation.
//!
//! Composes, in order: an observability span, a response-cache lookup, the
//! circuit breaker, a bounded retry loop with linear backoff under the
//! per-call timeout, a fire-and-forget cache write, and fallback synthesis.
//! An agent failure never propagates out of here; the workflow always gets a
//! reply it can merge and keep moving with.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::agents::{AgentReply, AgentWorker, TurnContext};
use crate::cache::ResponseCache;
use crate::guard::SafetyGuard;
use crate::telemetry::{AgentSpan, Metrics};
use crate::types::AgentId;

/// Default attempts per invocation before falling back.
pub const DEFAULT_ATTEMPTS: u32 = 2;

/// Default base of the linear backoff between attempts.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Retry tuning for the wrapper.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Attempts per invocation.
    pub attempts: u32,
    /// Backoff before attempt N+1 is `N x backoff_base`.
    pub backoff_base: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

/// What one wrapped invocation produced.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    /// The agent that was invoked.
    pub agent: AgentId,
    /// The reply to merge into the workflow. Always present; on exhausted
    /// retries this is a synthesized fallback.
    pub reply: AgentReply,
    /// The reply came from the response cache; no call was made.
    pub from_cache: bool,
    /// The reply is a synthesized fallback, not real agent output.
    pub fell_back: bool,
    /// Attempts actually made (0 for cache hits and open breakers).
    pub attempts: u32,
    /// Wall-clock time spent in the wrapper.
    pub duration: Duration,
    /// Diagnostic from the last failure, when `fell_back` is set.
    pub error: Option<String>,
}

/// The wrapper. One per engine; shares the process-wide cache, guard, and
/// metrics services.
pub struct ResilientInvoker {
    cache: Arc<ResponseCache>,
    guard: Arc<SafetyGuard>,
    metrics: Arc<Metrics>,
    config: InvokerConfig,
}

impl ResilientInvoker {
    /// Create a wrapper over the shared services.
    pub fn new(cache: Arc<ResponseCache>, guard: Arc<SafetyGuard>, metrics: Arc<Metrics>) -> Self {
        Self::with_config(cache, guard, metrics, InvokerConfig::default())
    }

    /// Create a wrapper with custom retry tuning.
    pub fn with_config(
        cache: Arc<ResponseCache>,
        guard: Arc<SafetyGuard>,
        metrics: Arc<Metrics>,
        config: InvokerConfig,
    ) -> Self {
        Self {
            cache,
            guard,
            metrics,
            config,
        }
    }

    /// Invoke one agent worker for one turn.
    ///
    /// `cancel` is checked before every backoff sleep so an aborted request
    /// does not sit out useless delays.
    pub async fn invoke(
        &self,
        worker: Arc<dyn AgentWorker>,
        ctx: &TurnContext,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> InvocationOutcome {
        let agent = worker.id();
        let span = AgentSpan::start(agent, self.metrics.clone());

        // Cache first: identical work is never paid for twice.
        let cache_key = ResponseCache::make_key(agent.as_str(), "", &ctx.request);
        if self.cache.is_enabled() && worker.cacheable() {
            if let Some(raw) = self.cache.get(&cache_key) {
                match serde_json::from_str::<AgentReply>(&raw) {
                    Ok(reply) => {
                        let duration = span.elapsed();
                        span.finish_cached();
                        return InvocationOutcome {
                            agent,
                            reply,
                            from_cache: true,
                            fell_back: false,
                            attempts: 0,
                            duration,
                            error: None,
                        };
                    }
                    Err(err) => {
                        // Cache faults are non-fatal; treat as a miss.
                        tracing::warn!(agent = %agent, error = %err, "dropping undecodable cache entry");
                    }
                }
            }
        }

        // An open breaker skips the call entirely.
        if self.guard.is_open(agent) {
            tracing::warn!(agent = %agent, "circuit open, synthesizing fallback");
            self.metrics.record_fallback(agent);
            span.record_attempts(0);
            let duration = span.elapsed();
            span.finish(false);
            return self.fallback_outcome(agent, 0, duration, "circuit breaker open".to_string());
        }

        let mut last_error = String::new();
        for attempt in 1..=self.config.attempts.max(1) {
            if attempt > 1 {
                if is_cancelled(cancel) {
                    last_error = "request cancelled before retry".to_string();
                    break;
                }
                // An earlier attempt may have tripped the breaker.
                if self.guard.is_open(agent) {
                    break;
                }
                // Linear backoff: attempt N waits (N-1) x base before running.
                tokio::time::sleep(self.config.backoff_base * (attempt - 1)).await;
            }

            match self.guard.with_timeout(agent, worker.run(ctx)).await {
                Ok(reply) => {
                    self.guard.record_success(agent);
                    if let Some(usage) = reply.usage {
                        self.metrics
                            .record_tokens(usage.input_tokens as u64, usage.output_tokens as u64);
                    }
                    self.write_back(worker.cacheable(), cache_key, &reply);
                    span.record_attempts(attempt);
                    let duration = span.elapsed();
                    span.finish(true);
                    return InvocationOutcome {
                        agent,
                        reply,
                        from_cache: false,
                        fell_back: false,
                        attempts: attempt,
                        duration,
                        error: None,
                    };
                }
                Err(err) => {
                    self.guard.record_failure(agent);
                    last_error = err.to_string();
                    tracing::warn!(
                        agent = %agent,
                        attempt,
                        max_attempts = self.config.attempts,
                        error = %last_error,
                        "agent attempt failed"
                    );
                }
            }
        }

        self.metrics.record_fallback(agent);
        span.record_attempts(self.config.attempts);
        let duration = span.elapsed();
        span.finish(false);
        self.fallback_outcome(agent, self.config.attempts, duration, last_error)
    }

    /// Queue the cache write without blocking the response path.
    fn write_back(&self, cacheable: bool, key: String, reply: &AgentReply) {
        if !cacheable || !self.cache.is_enabled() {
            return;
        }

        let serialized = match serde_json::to_string(reply) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "skipping cache write for unserializable reply");
                return;
            }
        };
        let cost_units = reply
            .usage
            .map(|u| u.total() as u64)
            .unwrap_or_else(|| (reply.message.len() / 4) as u64);

        let cache = self.cache.clone();
        tokio::spawn(async move {
            cache.set(key, serialized, cost_units);
        });
    }

    fn fallback_outcome(
        &self,
        agent: AgentId,
        attempts: u32,
        duration: Duration,
        error: String,
    ) -> InvocationOutcome {
        InvocationOutcome {
            agent,
            reply: AgentReply::text(fallback_message(agent, &error)),
            from_cache: false,
            fell_back: true,
            attempts,
            duration,
            error: Some(error),
        }
    }
}

/// The in-band diagnostic that stands in for a failed agent's reply.
pub fn fallback_message(agent: AgentId, error: &str) -> String {
    format!(
        "{} could not complete this step ({}). Continuing with what we have so far.",
        agent, error
    )
}

fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.map(|rx| *rx.borrow()).unwrap_or(false)
}
