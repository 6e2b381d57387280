// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed work artifacts produced by agents.
//!
//! Every document that flows between agents is one of a closed set of six
//! kinds, each with its own payload shape. Consumption sites match
//! exhaustively, so the compiler covers all kinds.

mod store;

pub use store::{requirements, ArtifactStore, Readiness};

use serde::{Deserialize, Serialize};

// ============================================================================
// Kinds
// ============================================================================

/// Discriminant for the six artifact kinds.
///
/// Identity is by kind: the store tracks at most one current artifact per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Prd,
    DesignSpec,
    TechPlan,
    SecurityReview,
    TestPlan,
    CodeReview,
}

impl ArtifactKind {
    /// All kinds, in pipeline order.
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::Prd,
        ArtifactKind::DesignSpec,
        ArtifactKind::TechPlan,
        ArtifactKind::SecurityReview,
        ArtifactKind::TestPlan,
        ArtifactKind::CodeReview,
    ];

    /// Human-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prd => "PRD",
            Self::DesignSpec => "Design Spec",
            Self::TechPlan => "Tech Plan",
            Self::SecurityReview => "Security Review",
            Self::TestPlan => "Test Plan",
            Self::CodeReview => "Code Review",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// One user story in a PRD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStory {
    /// Who wants it ("As a ...").
    pub role: String,
    /// What they want ("I want ...").
    pub want: String,
    /// Why ("so that ...").
    pub so_that: String,
}

/// Product requirements document, produced by the Founder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prd {
    pub goal: String,
    pub user_stories: Vec<UserStory>,
    pub success_criteria: Vec<String>,
}

/// Design specification, produced by the Designer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignSpec {
    pub overview: String,
    pub screens: Vec<String>,
    pub user_flows: Vec<String>,
}

/// One architecture component in a tech plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub responsibility: String,
}

/// Technical plan, produced by the Planner. Steps are ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechPlan {
    pub overview: String,
    pub components: Vec<Component>,
    pub steps: Vec<String>,
}

/// Severity assessment in a security review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Security review, produced by the Security agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityReview {
    pub risk_level: RiskLevel,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// One case in a test plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub expectation: String,
}

/// Test plan, produced by the Tester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    pub strategy: String,
    pub cases: Vec<TestCase>,
}

/// Outcome of a code review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    RequestChanges,
    NeedsDiscussion,
}

/// Code review, produced by the Reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReview {
    pub verdict: ReviewVerdict,
    pub blocking: Vec<String>,
    pub suggestions: Vec<String>,
}

// ============================================================================
// The artifact sum type
// ============================================================================

/// A structured document produced by one agent and consumed by later agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Prd(Prd),
    DesignSpec(DesignSpec),
    TechPlan(TechPlan),
    SecurityReview(SecurityReview),
    TestPlan(TestPlan),
    CodeReview(CodeReview),
}

impl Artifact {
    /// The kind tag for this artifact.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Prd(_) => ArtifactKind::Prd,
            Self::DesignSpec(_) => ArtifactKind::DesignSpec,
            Self::TechPlan(_) => ArtifactKind::TechPlan,
            Self::SecurityReview(_) => ArtifactKind::SecurityReview,
            Self::TestPlan(_) => ArtifactKind::TestPlan,
            Self::CodeReview(_) => ArtifactKind::CodeReview,
        }
    }

    /// One-line, kind-specific summary used to brief the next agent.
    pub fn summary(&self) -> String {
        match self {
            Self::Prd(prd) => {
                format!("{} ({} stories)", prd.goal, prd.user_stories.len())
            }
            Self::DesignSpec(spec) => {
                format!("{} ({} screens)", spec.overview, spec.screens.len())
            }
            Self::TechPlan(plan) => {
                format!("{} ({} steps)", plan.overview, plan.steps.len())
            }
            Self::SecurityReview(review) => format!(
                "risk {:?}, {} findings",
                review.risk_level,
                review.findings.len()
            ),
            Self::TestPlan(plan) => {
                format!("{} ({} cases)", plan.strategy, plan.cases.len())
            }
            Self::CodeReview(review) => format!(
                "{:?}, {} blocking issues",
                review.verdict,
                review.blocking.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prd() -> Prd {
        Prd {
            goal: "Ship a login form".to_string(),
            user_stories: vec![UserStory {
                role: "visitor".to_string(),
                want: "to sign in".to_string(),
                so_that: "I can see my dashboard".to_string(),
            }],
            success_criteria: vec!["sign-in under 5 seconds".to_string()],
        }
    }

    #[test]
    fn test_artifact_kind() {
        let artifact = Artifact::Prd(sample_prd());
        assert_eq!(artifact.kind(), ArtifactKind::Prd);
    }

    #[test]
    fn test_artifact_summary_counts() {
        let artifact = Artifact::Prd(sample_prd());
        let summary = artifact.summary();
        assert!(summary.contains("Ship a login form"));
        assert!(summary.contains("1 stories"));
    }

    #[test]
    fn test_artifact_serde_tagged() {
        let artifact = Artifact::CodeReview(CodeReview {
            verdict: ReviewVerdict::RequestChanges,
            blocking: vec!["unchecked input".to_string()],
            suggestions: vec![],
        });
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(json.contains("\"kind\":\"code_review\""));
        assert!(json.contains("request_changes"));

        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), ArtifactKind::CodeReview);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ArtifactKind::TechPlan.to_string(), "Tech Plan");
        assert_eq!(ArtifactKind::ALL.len(), 6);
    }
}
