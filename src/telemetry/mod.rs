// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing, metrics, and observability infrastructure.
//!
//! Metrics are an explicit service injected into the engine rather than an
//! ambient global, so every test can construct a fresh instance. Span helpers
//! wrap `tracing` spans with the fields the engine always records.

pub mod init;
pub mod metrics;
pub mod spans;

pub use init::{init_telemetry, TelemetryConfig};
pub use metrics::{
    AgentCallMetrics, Histogram, Metrics, MetricsSnapshot, RouteTier, RouteTierSnapshot,
};
pub use spans::{AgentSpan, SpanExt};
