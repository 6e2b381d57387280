// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics collection for the orchestration core.
//!
//! Lightweight counters without external dependencies; the scrape-able
//! export schema is the embedding layer's concern. One [`Metrics`] instance
//! is shared process-wide by all conversations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::types::AgentId;

/// Which routing tier produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTier {
    /// Primary completion provider classified the conversation.
    Primary,
    /// Secondary provider answered after the primary failed.
    Secondary,
    /// Deterministic keyword matching.
    Keyword,
    /// Turn-limit guard forced termination.
    TurnLimit,
}

impl RouteTier {
    /// Stable level number used in counter names (level0..level3).
    pub fn level(&self) -> u8 {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
            Self::Keyword => 2,
            Self::TurnLimit => 3,
        }
    }
}

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    /// Call metrics by agent.
    agents: RwLock<HashMap<AgentId, AgentCallMetrics>>,

    /// Call latency distribution across all agents.
    latency: RwLock<Histogram>,

    /// Routing decisions by tier.
    level0: AtomicU64,
    level1: AtomicU64,
    level2: AtomicU64,
    level3: AtomicU64,
    route_total: AtomicU64,

    /// Token usage tracking.
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,

    /// Start time for calculating uptime.
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            latency: RwLock::new(Histogram::default()),
            level0: AtomicU64::new(0),
            level1: AtomicU64::new(0),
            level2: AtomicU64::new(0),
            level3: AtomicU64::new(0),
            route_total: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one agent call.
    pub fn record_call(&self, agent: AgentId, duration: Duration, success: bool) {
        let mut agents = self.agents.write().unwrap();
        agents.entry(agent).or_default().record(duration, success);
        drop(agents);

        self.latency.write().unwrap().record(duration);
    }

    /// Record a fallback response synthesized for an agent.
    pub fn record_fallback(&self, agent: AgentId) {
        let mut agents = self.agents.write().unwrap();
        agents.entry(agent).or_default().fallbacks += 1;
    }

    /// Record a cache hit that skipped an agent call.
    pub fn record_cache_hit(&self, agent: AgentId) {
        let mut agents = self.agents.write().unwrap();
        agents.entry(agent).or_default().cache_hits += 1;
    }

    /// Record a routing decision at a tier.
    pub fn record_route(&self, tier: RouteTier) {
        match tier {
            RouteTier::Primary => &self.level0,
            RouteTier::Secondary => &self.level1,
            RouteTier::Keyword => &self.level2,
            RouteTier::TurnLimit => &self.level3,
        }
        .fetch_add(1, Ordering::Relaxed);
        self.route_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record token usage.
    pub fn record_tokens(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    /// Get metrics for a specific agent.
    pub fn agent_metrics(&self, agent: AgentId) -> Option<AgentCallMetrics> {
        self.agents.read().unwrap().get(&agent).cloned()
    }

    /// Routing tier counters.
    pub fn route_tiers(&self) -> RouteTierSnapshot {
        RouteTierSnapshot {
            level0: self.level0.load(Ordering::Relaxed),
            level1: self.level1.load(Ordering::Relaxed),
            level2: self.level2.load(Ordering::Relaxed),
            level3: self.level3.load(Ordering::Relaxed),
            total: self.route_total.load(Ordering::Relaxed),
        }
    }

    /// Get total token counts (prompt, completion).
    pub fn token_counts(&self) -> (u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }

    /// Get uptime since metrics were initialized.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            agents: self.agents.read().unwrap().clone(),
            latency: self.latency.read().unwrap().clone(),
            route_tiers: self.route_tiers(),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.agents.write().unwrap().clear();
        *self.latency.write().unwrap() = Histogram::default();
        self.level0.store(0, Ordering::Relaxed);
        self.level1.store(0, Ordering::Relaxed);
        self.level2.store(0, Ordering::Relaxed);
        self.level3.store(0, Ordering::Relaxed);
        self.route_total.store(0, Ordering::Relaxed);
        self.prompt_tokens.store(0, Ordering::Relaxed);
        self.completion_tokens.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Call metrics for a single agent.
#[derive(Debug, Clone)]
pub struct AgentCallMetrics {
    /// Total invocations (cache hits excluded).
    pub invocations: u64,

    /// Invocations that returned a real result.
    pub successes: u64,

    /// Invocations whose final attempt failed.
    pub failures: u64,

    /// Fallback responses synthesized after exhausted retries.
    pub fallbacks: u64,

    /// Calls skipped entirely by a cache hit.
    pub cache_hits: u64,

    /// Total time spent in this agent.
    pub total_duration: Duration,

    /// Minimum call time.
    pub min_duration: Duration,

    /// Maximum call time.
    pub max_duration: Duration,
}

impl AgentCallMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self {
            invocations: 0,
            successes: 0,
            failures: 0,
            fallbacks: 0,
            cache_hits: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
        }
    }

    /// Record one call.
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.invocations += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
    }

    /// Calculate average call time.
    pub fn avg_duration(&self) -> Duration {
        if self.invocations == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.invocations as u32
        }
    }

    /// Calculate success rate (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            1.0
        } else {
            self.successes as f64 / self.invocations as f64
        }
    }
}

impl Default for AgentCallMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Routing tier counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteTierSnapshot {
    pub level0: u64,
    pub level1: u64,
    pub level2: u64,
    pub level3: u64,
    pub total: u64,
}

/// Simple histogram with fixed buckets for latency tracking.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Bucket boundaries in microseconds.
    /// Default: [100us, 1ms, 10ms, 100ms, 1s, 10s, +inf]
    buckets: Vec<u64>,

    /// Count per bucket.
    counts: Vec<u64>,
}

impl Histogram {
    /// Create a histogram with custom bucket boundaries (in microseconds).
    pub fn with_buckets(buckets: Vec<u64>) -> Self {
        let counts = vec![0; buckets.len() + 1];
        Self { buckets, counts }
    }

    /// Record a duration value.
    pub fn record(&mut self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        let bucket_idx = self
            .buckets
            .iter()
            .position(|&b| micros <= b)
            .unwrap_or(self.buckets.len());
        self.counts[bucket_idx] += 1;
    }

    /// Get counts for each bucket.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Get bucket boundaries.
    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Calculate approximate percentile (p50, p90, p99, etc.).
    pub fn percentile(&self, p: f64) -> Duration {
        let total: u64 = self.counts.iter().sum();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = (total as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let micros = if i < self.buckets.len() {
                    self.buckets[i]
                } else {
                    self.buckets.last().copied().unwrap_or(0) * 10
                };
                return Duration::from_micros(micros);
            }
        }

        Duration::ZERO
    }

    /// Get p50 (median) latency.
    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    /// Get p99 latency.
    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // Default buckets: 100us, 1ms, 10ms, 100ms, 1s, 10s
        Self::with_buckets(vec![100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000])
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Call metrics by agent.
    pub agents: HashMap<AgentId, AgentCallMetrics>,

    /// Call latency distribution.
    pub latency: Histogram,

    /// Routing decisions by tier.
    pub route_tiers: RouteTierSnapshot,

    /// Total prompt tokens.
    pub prompt_tokens: u64,

    /// Total completion tokens.
    pub completion_tokens: u64,

    /// Uptime when snapshot was taken.
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Workflow Metrics ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Tokens: {} prompt, {} completion\n",
            self.prompt_tokens, self.completion_tokens
        ));
        report.push_str(&format!(
            "Routing: {} decisions (L0 {}, L1 {}, L2 {}, L3 {})\n",
            self.route_tiers.total,
            self.route_tiers.level0,
            self.route_tiers.level1,
            self.route_tiers.level2,
            self.route_tiers.level3
        ));
        report.push_str(&format!(
            "Latency: p50 {:.2?}, p99 {:.2?}\n\n",
            self.latency.p50(),
            self.latency.p99()
        ));

        if !self.agents.is_empty() {
            report.push_str("Agent Calls:\n");
            let mut agents: Vec<_> = self.agents.iter().collect();
            agents.sort_by_key(|(agent, _)| **agent);
            for (agent, metrics) in agents {
                report.push_str(&format!(
                    "  {}: {} calls, {:.1}% success, {} fallbacks, {} cache hits, avg {:.2?}\n",
                    agent,
                    metrics.invocations,
                    metrics.success_rate() * 100.0,
                    metrics.fallbacks,
                    metrics.cache_hits,
                    metrics.avg_duration()
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_call_metrics() {
        let mut metrics = AgentCallMetrics::new();
        metrics.record(Duration::from_millis(100), true);
        metrics.record(Duration::from_millis(200), true);
        metrics.record(Duration::from_millis(50), false);

        assert_eq!(metrics.invocations, 3);
        assert_eq!(metrics.successes, 2);
        assert_eq!(metrics.failures, 1);
        assert!((metrics.success_rate() - 0.666).abs() < 0.01);
        assert_eq!(metrics.min_duration, Duration::from_millis(50));
        assert_eq!(metrics.max_duration, Duration::from_millis(200));
    }

    #[test]
    fn test_route_tier_counters() {
        let metrics = Metrics::new();
        metrics.record_route(RouteTier::Primary);
        metrics.record_route(RouteTier::Primary);
        metrics.record_route(RouteTier::Keyword);
        metrics.record_route(RouteTier::TurnLimit);

        let tiers = metrics.route_tiers();
        assert_eq!(tiers.level0, 2);
        assert_eq!(tiers.level1, 0);
        assert_eq!(tiers.level2, 1);
        assert_eq!(tiers.level3, 1);
        assert_eq!(tiers.total, 4);
    }

    #[test]
    fn test_tier_levels() {
        assert_eq!(RouteTier::Primary.level(), 0);
        assert_eq!(RouteTier::Secondary.level(), 1);
        assert_eq!(RouteTier::Keyword.level(), 2);
        assert_eq!(RouteTier::TurnLimit.level(), 3);
    }

    #[test]
    fn test_histogram() {
        let mut hist = Histogram::default();

        hist.record(Duration::from_micros(50)); // bucket 0 (<=100us)
        hist.record(Duration::from_micros(500)); // bucket 1 (<=1ms)
        hist.record(Duration::from_millis(5)); // bucket 2 (<=10ms)

        assert_eq!(hist.counts()[0], 1);
        assert_eq!(hist.counts()[1], 1);
        assert_eq!(hist.counts()[2], 1);
    }

    #[test]
    fn test_histogram_percentiles() {
        let mut hist = Histogram::default();
        for _ in 0..100 {
            hist.record(Duration::from_micros(500));
        }

        assert_eq!(hist.p50(), Duration::from_micros(1_000));
        assert_eq!(hist.p99(), Duration::from_micros(1_000));
    }

    #[test]
    fn test_snapshot_and_report() {
        let metrics = Metrics::new();
        metrics.record_call(AgentId::Builder, Duration::from_millis(100), true);
        metrics.record_fallback(AgentId::Builder);
        metrics.record_cache_hit(AgentId::Planner);
        metrics.record_tokens(1000, 500);

        let snapshot = metrics.snapshot();
        assert!(snapshot.agents.contains_key(&AgentId::Builder));
        assert_eq!(snapshot.prompt_tokens, 1000);
        assert_eq!(snapshot.completion_tokens, 500);

        let report = snapshot.format_report();
        assert!(report.contains("Builder"));
        assert!(report.contains("1 fallbacks"));
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = Metrics::new();
        metrics.record_call(AgentId::Tester, Duration::from_millis(100), true);
        metrics.record_tokens(100, 50);
        metrics.record_route(RouteTier::Keyword);

        metrics.reset();

        assert!(metrics.agent_metrics(AgentId::Tester).is_none());
        assert_eq!(metrics.token_counts(), (0, 0));
        assert_eq!(metrics.route_tiers(), RouteTierSnapshot::default());
    }
}
