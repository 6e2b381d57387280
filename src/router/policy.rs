// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Routing policy data: the classifier prompt and the keyword table.
//!
//! Policy lives here so tuning who-handles-what never touches the decision
//! machinery in `router`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::AgentId;

/// System prompt for model-based classification (tiers 0 and 1).
///
/// The model must answer with exactly one agent name or FINISH.
pub const CLASSIFIER_PROMPT: &str = "\
You route a product conversation to the next specialist. The team:
- Founder: frames the product idea and writes the PRD
- Designer: UI/UX design and wireframes
- Planner: technical architecture and implementation planning
- Builder: writes the implementation
- Tester: test strategy and QA
- Security: security review
- Reviewer: code review and final feedback

Read the conversation and answer with exactly one word: the name of the
agent that should act next, or FINISH if the request is fully handled.";

/// Keyword table for deterministic fallback routing (tier 2).
///
/// Priority-ordered: the first agent with any whole-word match wins.
pub const KEYWORD_TABLE: &[(AgentId, &[&str])] = &[
    (
        AgentId::Security,
        &["security", "vulnerability", "exploit", "penetration"],
    ),
    (AgentId::Tester, &["test", "tests", "qa", "coverage"]),
    (AgentId::Reviewer, &["review", "feedback", "critique"]),
    (
        AgentId::Builder,
        &["build", "implement", "code", "develop", "fix"],
    ),
    (
        AgentId::Planner,
        &["plan", "architecture", "roadmap", "estimate"],
    ),
    (
        AgentId::Designer,
        &["design", "ui", "ux", "wireframe", "mockup"],
    ),
    (AgentId::Founder, &["idea", "vision", "product", "prd"]),
];

/// Compiled, case-insensitive, word-boundary patterns for the table above.
static KEYWORD_PATTERNS: Lazy<Vec<(AgentId, Vec<Regex>)>> = Lazy::new(|| {
    KEYWORD_TABLE
        .iter()
        .map(|(agent, keywords)| {
            let patterns = keywords
                .iter()
                .filter_map(|kw| {
                    // Word boundaries so "build" never fires inside
                    // "building" and "ui" never fires inside "suite".
                    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw))).ok()
                })
                .collect();
            (*agent, patterns)
        })
        .collect()
});

/// Match the user's text against the keyword table.
///
/// Returns the first agent in priority order with a whole-word hit.
pub fn keyword_match(text: &str) -> Option<AgentId> {
    KEYWORD_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
        .map(|(agent, _)| *agent)
}
