// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Response cache with TTL and capacity eviction.
//!
//! Memoizes agent outputs by an exact-match key: a sha256 over the normalized
//! model identifier, system prompt, and input text. Not a similarity cache.
//! Reads and writes are best-effort; a cache fault never aborts the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Default cache TTL (1 hour).
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default max entry count.
const DEFAULT_MAX_SIZE: usize = 1000;

/// Cache entry with timestamp and hit accounting.
struct CacheEntry {
    value: String,
    /// Provider cost of producing the value, in abstract units.
    cost_units: u64,
    created_at: Instant,
    hit_count: u64,
}

impl CacheEntry {
    fn new(value: String, cost_units: u64) -> Self {
        Self {
            value,
            cost_units,
            created_at: Instant::now(),
            hit_count: 0,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Thread-safe, process-wide response cache.
///
/// Shared by all concurrently running conversations; construct once at
/// startup and inject.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    enabled: bool,
    ttl: Duration,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache with default settings.
    pub fn new() -> Self {
        Self::with_config(true, DEFAULT_TTL, DEFAULT_MAX_SIZE)
    }

    /// Create a cache with custom settings.
    pub fn with_config(enabled: bool, ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            enabled,
            ttl,
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether caching is enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Generate the exact-match key for a (model, system prompt, input) triple.
    ///
    /// Inputs are normalized (trimmed, whitespace-collapsed, lowercased) so
    /// formatting noise does not defeat the cache.
    pub fn make_key(model: &str, system_prompt: &str, input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(normalize(model).as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize(system_prompt).as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize(input).as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        format!("{}:{}", normalize(model), &hash[..16])
    }

    /// Look up a cached response.
    ///
    /// Sweeps expired entries first, then looks up; a hit increments the
    /// entry's hit count.
    pub fn get(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let mut entries = self.entries.write().ok()?;

        entries.retain(|_, entry| !entry.is_expired(self.ttl));

        if let Some(entry) = entries.get_mut(key) {
            entry.hit_count += 1;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite a cached response.
    ///
    /// Evicts the globally oldest entries until under capacity before
    /// inserting. Silently does nothing if the lock is poisoned.
    pub fn set(&self, key: String, value: String, cost_units: u64) {
        if !self.enabled {
            return;
        }

        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(_) => return,
        };

        while entries.len() >= self.max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    entries.remove(&k);
                }
                None => break,
            }
        }

        entries.insert(key, CacheEntry::new(value, cost_units));
    }

    /// Snapshot the cache statistics.
    pub fn stats(&self) -> CacheStats {
        let (entry_count, units_saved) = match self.entries.read() {
            Ok(entries) => (
                entries.len(),
                entries
                    .values()
                    .map(|e| e.hit_count * e.cost_units)
                    .sum::<u64>(),
            ),
            Err(_) => (0, 0),
        };

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entry_count,
            units_saved,
        }
    }

    /// Drop all entries and reset counters.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cumulative hits since the last clear.
    pub hits: u64,
    /// Cumulative misses since the last clear.
    pub misses: u64,
    /// Live entries.
    pub entries: usize,
    /// Total cost units saved: sum of hit_count x cost_units across entries.
    pub units_saved: u64,
}
