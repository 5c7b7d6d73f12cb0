//! Destination conflict detection and resolution.
//!
//! The detector inspects an [`OperationPlan`] and reports [`Conflict`]s; the
//! resolver applies a [`ResolutionStrategy`] per conflict and hands back a
//! [`PlanDecision`] that the batch runner folds into the plan before the
//! next conflict is handled.

mod detector;
mod plan;
mod policy;
mod resolver;
mod strategy;
mod target;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use detector::{ConflictDetector, ScopeFilter};
pub use plan::{OperationPlan, PlanEntry, ProposedOperation, WriteMode};
pub use policy::{PolicyScope, StrategyPolicies, StrategyPolicy};
pub use resolver::{
    BatchResolution, ConflictResolver, PlanDecision, PromptCallback, ResolutionResult,
    ResolutionSettings, StrategyRegistry,
};
pub use strategy::{
    BackupStrategy, ConflictStrategy, MergeStrategy, OverwriteStrategy, PromptStrategy,
    RenameStrategy, ResolutionContext, SkipStrategy, StrategyOutcome,
};
pub use target::{EntryKind, StdTargetFs, TargetFs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    PathCollision,
    RuleCollision,
    PatternOverlap,
    PermissionConflict,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PathCollision => "path_collision",
            Self::RuleCollision => "rule_collision",
            Self::PatternOverlap => "pattern_overlap",
            Self::PermissionConflict => "permission_conflict",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breadth at which a conflict or policy applies, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictScope {
    Pattern,
    Rule,
    Ruleset,
    Global,
}

impl fmt::Display for ConflictScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pattern => "pattern",
            Self::Rule => "rule",
            Self::Ruleset => "ruleset",
            Self::Global => "global",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Skip,
    Overwrite,
    Rename,
    Backup,
    Prompt,
    Merge,
}

impl ResolutionStrategy {
    pub const ALL: [ResolutionStrategy; 6] = [
        Self::Skip,
        Self::Overwrite,
        Self::Rename,
        Self::Backup,
        Self::Prompt,
        Self::Merge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::Backup => "backup",
            Self::Prompt => "prompt",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected conflict. Created fresh per detection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Uuid,
    pub conflict_type: ConflictType,
    pub scope: ConflictScope,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub severity: Severity,
    pub auto_resolvable: bool,
    pub suggested_strategy: Option<ResolutionStrategy>,
    /// Plan entry this conflict is about; strategies act on it.
    pub operation_index: usize,
    /// Other plan entries involved.
    pub related_operations: Vec<usize>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn scopes_order_narrowest_first() {
        assert!(ConflictScope::Pattern < ConflictScope::Rule);
        assert!(ConflictScope::Ruleset < ConflictScope::Global);
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(ConflictType::PathCollision.to_string(), "path_collision");
        assert_eq!(
            serde_json::to_string(&ResolutionStrategy::Rename).unwrap(),
            "\"rename\""
        );
    }
}
