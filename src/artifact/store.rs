// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Slot store for the current artifact of each kind.
//!
//! One nullable slot per kind, latest write wins. The store also remembers
//! which agent produced each slot and when. It is created empty at workflow
//! start and discarded with the workflow instance; slots are never deleted
//! individually.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AgentId;

use super::{
    Artifact, ArtifactKind, CodeReview, DesignSpec, Prd, SecurityReview, TechPlan, TestPlan,
};

/// Static dependency table: the artifact kinds each agent consumes.
///
/// This is a declaration, not an enforcement point; see
/// [`ArtifactStore::check_readiness`].
pub fn requirements(agent: AgentId) -> &'static [ArtifactKind] {
    match agent {
        AgentId::Founder => &[],
        AgentId::Designer => &[ArtifactKind::Prd],
        AgentId::Planner => &[ArtifactKind::Prd, ArtifactKind::DesignSpec],
        AgentId::Builder => &[ArtifactKind::TechPlan, ArtifactKind::DesignSpec],
        AgentId::Tester => &[
            ArtifactKind::Prd,
            ArtifactKind::DesignSpec,
            ArtifactKind::TechPlan,
        ],
        AgentId::Security => &[ArtifactKind::TechPlan],
        AgentId::Reviewer => &[ArtifactKind::TechPlan],
    }
}

/// Result of a readiness check: a diagnostic, not a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// All declared dependencies are present.
    pub ready: bool,
    /// Kinds the agent declared but the store lacks.
    pub missing: Vec<ArtifactKind>,
}

/// Typed slots for the current artifact of each kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactStore {
    prd: Option<Prd>,
    design_spec: Option<DesignSpec>,
    tech_plan: Option<TechPlan>,
    security_review: Option<SecurityReview>,
    test_plan: Option<TestPlan>,
    code_review: Option<CodeReview>,

    /// Which agent wrote each slot.
    producers: BTreeMap<ArtifactKind, AgentId>,
    /// When each slot was last written.
    timestamps: BTreeMap<ArtifactKind, DateTime<Utc>>,
}

impl ArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new store with the matching slot set to `artifact`.
    ///
    /// Latest wins: a second write of the same kind overwrites the slot and
    /// refreshes its producer and timestamp. Other slots are untouched.
    #[must_use = "store returns a new ArtifactStore; the original is unchanged"]
    pub fn store(&self, artifact: Artifact, producer: AgentId) -> Self {
        let mut next = self.clone();
        next.insert(artifact, producer);
        next
    }

    /// In-place variant of [`ArtifactStore::store`], used by state merging.
    pub(crate) fn insert(&mut self, artifact: Artifact, producer: AgentId) {
        let kind = artifact.kind();
        match artifact {
            Artifact::Prd(prd) => self.prd = Some(prd),
            Artifact::DesignSpec(spec) => self.design_spec = Some(spec),
            Artifact::TechPlan(plan) => self.tech_plan = Some(plan),
            Artifact::SecurityReview(review) => self.security_review = Some(review),
            Artifact::TestPlan(plan) => self.test_plan = Some(plan),
            Artifact::CodeReview(review) => self.code_review = Some(review),
        }
        self.producers.insert(kind, producer);
        self.timestamps.insert(kind, Utc::now());
    }

    /// Get the current artifact of a kind, if any.
    pub fn get(&self, kind: ArtifactKind) -> Option<Artifact> {
        match kind {
            ArtifactKind::Prd => self.prd.clone().map(Artifact::Prd),
            ArtifactKind::DesignSpec => self.design_spec.clone().map(Artifact::DesignSpec),
            ArtifactKind::TechPlan => self.tech_plan.clone().map(Artifact::TechPlan),
            ArtifactKind::SecurityReview => {
                self.security_review.clone().map(Artifact::SecurityReview)
            }
            ArtifactKind::TestPlan => self.test_plan.clone().map(Artifact::TestPlan),
            ArtifactKind::CodeReview => self.code_review.clone().map(Artifact::CodeReview),
        }
    }

    /// Whether a slot is filled.
    pub fn has(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Prd => self.prd.is_some(),
            ArtifactKind::DesignSpec => self.design_spec.is_some(),
            ArtifactKind::TechPlan => self.tech_plan.is_some(),
            ArtifactKind::SecurityReview => self.security_review.is_some(),
            ArtifactKind::TestPlan => self.test_plan.is_some(),
            ArtifactKind::CodeReview => self.code_review.is_some(),
        }
    }

    /// Typed accessors for consumers that know what they need.
    pub fn prd(&self) -> Option<&Prd> {
        self.prd.as_ref()
    }

    pub fn design_spec(&self) -> Option<&DesignSpec> {
        self.design_spec.as_ref()
    }

    pub fn tech_plan(&self) -> Option<&TechPlan> {
        self.tech_plan.as_ref()
    }

    pub fn security_review(&self) -> Option<&SecurityReview> {
        self.security_review.as_ref()
    }

    pub fn test_plan(&self) -> Option<&TestPlan> {
        self.test_plan.as_ref()
    }

    pub fn code_review(&self) -> Option<&CodeReview> {
        self.code_review.as_ref()
    }

    /// The agent that wrote a slot.
    pub fn producer(&self, kind: ArtifactKind) -> Option<AgentId> {
        self.producers.get(&kind).copied()
    }

    /// When a slot was last written.
    pub fn timestamp(&self, kind: ArtifactKind) -> Option<DateTime<Utc>> {
        self.timestamps.get(&kind).copied()
    }

    /// Kinds currently filled, in pipeline order.
    pub fn kinds(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| self.has(*kind))
            .collect()
    }

    /// Whether any slot is filled.
    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }

    /// Check whether all of an agent's declared dependencies are present.
    ///
    /// Soft gate: callers log the missing kinds and proceed with partial
    /// context rather than blocking the agent.
    pub fn check_readiness(&self, agent: AgentId) -> Readiness {
        let missing: Vec<ArtifactKind> = requirements(agent)
            .iter()
            .copied()
            .filter(|kind| !self.has(*kind))
            .collect();
        Readiness {
            ready: missing.is_empty(),
            missing,
        }
    }

    /// Shallow merge by slot: any slot filled in `other` overwrites this
    /// store's slot, along with its producer and timestamp.
    #[must_use = "merged returns a new ArtifactStore; the original is unchanged"]
    pub fn merged(&self, other: &ArtifactStore) -> Self {
        let mut next = self.clone();
        for kind in ArtifactKind::ALL {
            if let Some(artifact) = other.get(kind) {
                match artifact {
                    Artifact::Prd(prd) => next.prd = Some(prd),
                    Artifact::DesignSpec(spec) => next.design_spec = Some(spec),
                    Artifact::TechPlan(plan) => next.tech_plan = Some(plan),
                    Artifact::SecurityReview(review) => next.security_review = Some(review),
                    Artifact::TestPlan(plan) => next.test_plan = Some(plan),
                    Artifact::CodeReview(review) => next.code_review = Some(review),
                }
                if let Some(producer) = other.producer(kind) {
                    next.producers.insert(kind, producer);
                }
                if let Some(ts) = other.timestamp(kind) {
                    next.timestamps.insert(kind, ts);
                }
            }
        }
        next
    }

    /// Human/LLM-readable summary of all filled slots, used to brief the
    /// next agent without replaying the whole message history.
    pub fn format_context(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = String::from("Artifacts so far:\n");
        for kind in self.kinds() {
            if let Some(artifact) = self.get(kind) {
                let producer = self
                    .producer(kind)
                    .map(|p| format!(" (by {})", p))
                    .unwrap_or_default();
                out.push_str(&format!("- {}: {}{}\n", kind, artifact.summary(), producer));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ReviewVerdict, UserStory};

    fn sample_prd() -> Artifact {
        Artifact::Prd(Prd {
            goal: "Ship a login form".to_string(),
            user_stories: vec![UserStory {
                role: "visitor".to_string(),
                want: "to sign in".to_string(),
                so_that: "I can see my dashboard".to_string(),
            }],
            success_criteria: vec![],
        })
    }

    fn sample_design() -> Artifact {
        Artifact::DesignSpec(DesignSpec {
            overview: "Single-page form".to_string(),
            screens: vec!["login".to_string()],
            user_flows: vec!["happy path".to_string()],
        })
    }

    #[test]
    fn test_store_sets_slot_producer_timestamp() {
        let store = ArtifactStore::new().store(sample_prd(), AgentId::Founder);

        assert!(store.has(ArtifactKind::Prd));
        assert_eq!(store.producer(ArtifactKind::Prd), Some(AgentId::Founder));
        assert!(store.timestamp(ArtifactKind::Prd).is_some());
        assert!(!store.has(ArtifactKind::TechPlan));
    }

    #[test]
    fn test_store_latest_wins() {
        let store = ArtifactStore::new()
            .store(sample_prd(), AgentId::Founder)
            .store(sample_design(), AgentId::Designer);

        let replacement = Artifact::Prd(Prd {
            goal: "Ship a signup form instead".to_string(),
            user_stories: vec![],
            success_criteria: vec![],
        });
        let store = store.store(replacement, AgentId::Reviewer);

        let prd = store.prd().unwrap();
        assert_eq!(prd.goal, "Ship a signup form instead");
        assert_eq!(store.producer(ArtifactKind::Prd), Some(AgentId::Reviewer));

        // Other slots untouched.
        assert!(store.has(ArtifactKind::DesignSpec));
        assert_eq!(
            store.producer(ArtifactKind::DesignSpec),
            Some(AgentId::Designer)
        );
    }

    #[test]
    fn test_requirements_table() {
        assert!(requirements(AgentId::Founder).is_empty());
        assert_eq!(requirements(AgentId::Designer), &[ArtifactKind::Prd]);
        assert_eq!(
            requirements(AgentId::Builder),
            &[ArtifactKind::TechPlan, ArtifactKind::DesignSpec]
        );
        assert_eq!(requirements(AgentId::Tester).len(), 3);
    }

    #[test]
    fn test_readiness_designer_needs_prd() {
        let empty = ArtifactStore::new();
        let readiness = empty.check_readiness(AgentId::Designer);
        assert!(!readiness.ready);
        assert_eq!(readiness.missing, vec![ArtifactKind::Prd]);

        let with_prd = empty.store(sample_prd(), AgentId::Founder);
        assert!(with_prd.check_readiness(AgentId::Designer).ready);
    }

    #[test]
    fn test_readiness_planner_reports_missing_design() {
        let store = ArtifactStore::new().store(sample_prd(), AgentId::Founder);
        let readiness = store.check_readiness(AgentId::Planner);
        assert!(!readiness.ready);
        assert_eq!(readiness.missing, vec![ArtifactKind::DesignSpec]);
    }

    #[test]
    fn test_readiness_no_dependencies_always_ready() {
        let empty = ArtifactStore::new();
        assert!(empty.check_readiness(AgentId::Founder).ready);
    }

    #[test]
    fn test_merged_overwrites_by_slot() {
        let base = ArtifactStore::new().store(sample_prd(), AgentId::Founder);
        let update = ArtifactStore::new().store(sample_design(), AgentId::Designer);

        let merged = base.merged(&update);
        assert!(merged.has(ArtifactKind::Prd));
        assert!(merged.has(ArtifactKind::DesignSpec));
        assert_eq!(
            merged.producer(ArtifactKind::DesignSpec),
            Some(AgentId::Designer)
        );
    }

    #[test]
    fn test_format_context() {
        let empty = ArtifactStore::new();
        assert!(empty.format_context().is_empty());

        let store = ArtifactStore::new()
            .store(sample_prd(), AgentId::Founder)
            .store(
                Artifact::CodeReview(CodeReview {
                    verdict: ReviewVerdict::Approve,
                    blocking: vec![],
                    suggestions: vec!["rename handler".to_string()],
                }),
                AgentId::Reviewer,
            );

        let context = store.format_context();
        assert!(context.contains("PRD: Ship a login form (1 stories)"));
        assert!(context.contains("by Founder"));
        assert!(context.contains("Code Review"));
        assert!(context.contains("Approve"));
    }
}
