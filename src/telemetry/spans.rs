// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span helpers for consistent instrumentation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info_span, Span};

use crate::types::AgentId;

use super::metrics::Metrics;

/// Extension trait for enhanced span functionality.
pub trait SpanExt {
    /// Record the result of an operation (success/error).
    fn record_result<T, E>(&self, result: &Result<T, E>);

    /// Record a numeric value.
    fn record_value(&self, name: &'static str, value: i64);

    /// Record a string value.
    fn record_str(&self, name: &'static str, value: &str);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>) {
        self.record("success", result.is_ok());
        self.record("error", result.is_err());
    }

    fn record_value(&self, name: &'static str, value: i64) {
        self.record(name, value);
    }

    fn record_str(&self, name: &'static str, value: &str) {
        self.record(name, value);
    }
}

/// RAII guard for timing one agent invocation.
///
/// Records the agent, duration, cache/success outcome to the span and to the
/// injected metrics service on finish.
pub struct AgentSpan {
    agent: AgentId,
    metrics: Arc<Metrics>,
    start: Instant,
    span: Span,
}

impl AgentSpan {
    /// Start a new agent invocation span.
    pub fn start(agent: AgentId, metrics: Arc<Metrics>) -> Self {
        let span = info_span!(
            "agent_call",
            agent = %agent,
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
            cache.hit = tracing::field::Empty,
            attempts = tracing::field::Empty,
        );

        Self {
            agent,
            metrics,
            start: Instant::now(),
            span,
        }
    }

    /// Get the underlying tracing span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Enter the span context.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Elapsed time so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record how many attempts the call took.
    pub fn record_attempts(&self, attempts: u32) {
        self.span.record("attempts", attempts as i64);
    }

    /// Close the span as a cache hit: no agent call happened.
    pub fn finish_cached(self) {
        self.span.record("cache.hit", true);
        self.span.record("success", true);
        self.metrics.record_cache_hit(self.agent);

        tracing::debug!(parent: &self.span, "served from response cache");
    }

    /// Close the span, recording duration and outcome.
    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed();
        let duration_ms = duration.as_secs_f64() * 1000.0;

        self.span.record("duration_ms", duration_ms);
        self.span.record("success", success);
        self.span.record("cache.hit", false);
        self.metrics.record_call(self.agent, duration, success);

        tracing::info!(
            parent: &self.span,
            "agent call complete"
        );
    }

    /// Finish with a result, automatically determining success.
    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) {
        self.finish(result.is_ok());
    }
}
