// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Engine configuration: defaults, environment overrides, and file loading.
//!
//! Everything is defaulted so the engine runs unmodified. Precedence, lowest
//! to highest: built-in defaults, workspace config file, `ATELIER_*`
//! environment variables.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::guard::GuardConfig;
use crate::types::AgentId;

/// Config file names to search for in the workspace root (in order).
pub const CONFIG_FILES: &[&str] = &[
    ".atelier.json",
    ".atelier/config.json",
    "atelier.config.yaml",
];

/// Tunables for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Response cache on/off.
    pub cache_enabled: bool,
    /// Response cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Response cache capacity.
    pub cache_max_entries: usize,
    /// Hard cap on router decisions per conversation.
    pub max_turns: u32,
    /// Retry budget for self-loop-capable agents.
    pub max_agent_retries: u32,
    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: u64,
    /// Circuit-breaker cooldown in seconds.
    pub breaker_cooldown_secs: u64,
    /// Attempts per agent invocation before falling back.
    pub invoke_attempts: u32,
    /// Base of the linear backoff between attempts, in milliseconds.
    pub backoff_base_ms: u64,
    /// Agents allowed to iterate on their own output.
    pub self_loop_agents: Vec<AgentId>,
    /// Where keyword routing lands when nothing matches.
    pub default_agent: AgentId,
    /// Where a fresh workflow starts.
    pub entry_agent: AgentId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: 3600,
            cache_max_entries: 1000,
            max_turns: 50,
            max_agent_retries: 3,
            call_timeout_ms: 30_000,
            breaker_cooldown_secs: 300,
            invoke_attempts: 2,
            backoff_base_ms: 1000,
            self_loop_agents: vec![AgentId::Builder, AgentId::Tester],
            default_agent: AgentId::Founder,
            entry_agent: AgentId::Founder,
        }
    }
}

impl EngineConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load from the workspace root (first matching file in [`CONFIG_FILES`]),
    /// then apply environment overrides. Missing file means defaults.
    pub fn load(workspace_root: &Path) -> Result<Self, ConfigError> {
        let mut config = match find_config_file(workspace_root) {
            Some(path) => load_config_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay `ATELIER_*` environment variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_bool("ATELIER_CACHE_ENABLED") {
            self.cache_enabled = v;
        }
        if let Some(v) = env_parse("ATELIER_CACHE_TTL_SECS") {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("ATELIER_CACHE_MAX_ENTRIES") {
            self.cache_max_entries = v;
        }
        if let Some(v) = env_parse("ATELIER_MAX_TURNS") {
            self.max_turns = v;
        }
        if let Some(v) = env_parse("ATELIER_MAX_AGENT_RETRIES") {
            self.max_agent_retries = v;
        }
        if let Some(v) = env_parse("ATELIER_CALL_TIMEOUT_MS") {
            self.call_timeout_ms = v;
        }
        if let Some(v) = env_parse("ATELIER_BREAKER_COOLDOWN_SECS") {
            self.breaker_cooldown_secs = v;
        }
        if let Some(v) = env_parse("ATELIER_INVOKE_ATTEMPTS") {
            self.invoke_attempts = v;
        }
        if let Some(v) = env_parse("ATELIER_BACKOFF_BASE_MS") {
            self.backoff_base_ms = v;
        }
        if let Some(v) = env_parse::<AgentId>("ATELIER_DEFAULT_AGENT") {
            self.default_agent = v;
        }
        if let Some(v) = env_parse::<AgentId>("ATELIER_ENTRY_AGENT") {
            self.entry_agent = v;
        }
    }

    /// Cache TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Per-call timeout as a duration.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Breaker cooldown as a duration.
    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }

    /// The self-loop set.
    pub fn self_loop_set(&self) -> BTreeSet<AgentId> {
        self.self_loop_agents.iter().copied().collect()
    }

    /// Derive the guard limits from this config.
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            max_turns: self.max_turns,
            max_agent_retries: self.max_agent_retries,
            call_timeout: self.call_timeout(),
            breaker_cooldown: self.breaker_cooldown(),
            self_loop_agents: self.self_loop_set(),
        }
    }
}

/// Find the first config file present in the workspace root.
pub fn find_config_file(workspace_root: &Path) -> Option<std::path::PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.exists())
}

/// Load a configuration file (JSON or YAML, by extension).
pub fn load_config_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config override");
            None
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring unparseable boolean override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The environment is process-global; tests that touch or read it
    // serialize on this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.cache_max_entries, 1000);
        assert_eq!(config.max_turns, 50);
        assert_eq!(config.max_agent_retries, 3);
        assert_eq!(config.call_timeout_ms, 30_000);
        assert_eq!(config.breaker_cooldown_secs, 300);
        assert_eq!(config.invoke_attempts, 2);
        assert_eq!(config.default_agent, AgentId::Founder);
        assert!(config.self_loop_set().contains(&AgentId::Builder));
        assert!(config.self_loop_set().contains(&AgentId::Tester));
    }

    #[test]
    fn test_guard_config_derivation() {
        let config = EngineConfig {
            max_turns: 10,
            call_timeout_ms: 500,
            ..Default::default()
        };
        let guard = config.guard_config();
        assert_eq!(guard.max_turns, 10);
        assert_eq!(guard.call_timeout, Duration::from_millis(500));
        assert_eq!(guard.self_loop_agents.len(), 2);
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("ATELIER_MAX_TURNS", "7");
        std::env::set_var("ATELIER_CACHE_ENABLED", "off");
        std::env::set_var("ATELIER_DEFAULT_AGENT", "builder");
        std::env::set_var("ATELIER_BACKOFF_BASE_MS", "not-a-number");

        let config = EngineConfig::from_env();

        std::env::remove_var("ATELIER_MAX_TURNS");
        std::env::remove_var("ATELIER_CACHE_ENABLED");
        std::env::remove_var("ATELIER_DEFAULT_AGENT");
        std::env::remove_var("ATELIER_BACKOFF_BASE_MS");

        assert_eq!(config.max_turns, 7);
        assert!(!config.cache_enabled);
        assert_eq!(config.default_agent, AgentId::Builder);
        // Unparseable value falls back to the default.
        assert_eq!(config.backoff_base_ms, 1000);
    }

    #[test]
    fn test_load_json_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".atelier.json"),
            r#"{"maxTurns": 12, "cacheEnabled": false}"#,
        )
        .unwrap();

        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_turns, 12);
        assert!(!config.cache_enabled);
        // Unspecified fields keep defaults.
        assert_eq!(config.max_agent_retries, 3);
    }

    #[test]
    fn test_load_yaml_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("atelier.config.yaml"),
            "maxAgentRetries: 5\nselfLoopAgents: [Builder]\n",
        )
        .unwrap();

        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_agent_retries, 5);
        assert_eq!(config.self_loop_agents, vec![AgentId::Builder]);
    }

    #[test]
    fn test_load_missing_file_is_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_turns, EngineConfig::default().max_turns);
    }

    #[test]
    fn test_load_invalid_json_errors() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".atelier.json"), "{not json").unwrap();
        let err = EngineConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::JsonError(_)));
    }
}
