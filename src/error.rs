// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the atelier workflow engine.
//!
//! This module provides strongly-typed errors for different parts of the engine,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.

use thiserror::Error;

use crate::types::AgentId;

/// Errors that can occur when talking to a completion provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::NetworkError(_) | Self::Timeout(_)
        )
    }
}

/// Errors raised by the safety guard when a limit is exceeded.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Turn limit reached: {turns} turns used, {limit} allowed")]
    TurnLimitExceeded { turns: u32, limit: u32 },

    #[error("Retry budget exhausted for {agent}: {retries} retries used, {budget} allowed")]
    RetryBudgetExhausted {
        agent: AgentId,
        retries: u32,
        budget: u32,
    },

    #[error("Circuit breaker open for {agent}")]
    CircuitOpen { agent: AgentId },

    #[error("Agent {agent} timed out after {timeout_ms}ms")]
    Timeout { agent: AgentId, timeout_ms: u64 },
}

/// Errors that can occur while deciding the next agent.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Classifier returned an unknown agent: {0}")]
    UnknownAgent(String),

    #[error("No completion provider configured")]
    NoProvider,
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
