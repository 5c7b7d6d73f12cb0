//! Proposed operations and the plan resolutions are applied to.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{PatternId, RuleId, RulesetId};

use super::resolver::{PlanDecision, ResolutionResult};

/// How an operation writes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// The target must not be claimed by anything else.
    #[default]
    Create,
    /// Replace whatever is at the target.
    Overwrite,
    /// Merge into the target.
    Merge,
}

/// One source → target move or copy proposed by the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedOperation {
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default)]
    pub pattern_id: Option<PatternId>,
    #[serde(default)]
    pub rule_id: Option<RuleId>,
    #[serde(default)]
    pub ruleset_id: Option<RulesetId>,
    #[serde(default)]
    pub source_is_dir: bool,
    #[serde(default)]
    pub source_checksum: Option<String>,
    #[serde(default)]
    pub write_mode: WriteMode,
}

impl ProposedOperation {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            pattern_id: None,
            rule_id: None,
            ruleset_id: None,
            source_is_dir: false,
            source_checksum: None,
            write_mode: WriteMode::Create,
        }
    }

    pub fn with_pattern(mut self, pattern_id: impl Into<PatternId>) -> Self {
        self.pattern_id = Some(pattern_id.into());
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<RuleId>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_ruleset(mut self, ruleset_id: impl Into<RulesetId>) -> Self {
        self.ruleset_id = Some(ruleset_id.into());
        self
    }

    pub fn directory(mut self) -> Self {
        self.source_is_dir = true;
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.source_checksum = Some(checksum.into());
        self
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub operation: ProposedOperation,
    pub dropped: bool,
}

/// Ordered operations plus a dropped flag per entry. Indices are stable:
/// dropping an entry never shifts the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPlan {
    entries: Vec<PlanEntry>,
}

impl OperationPlan {
    pub fn new(operations: impl IntoIterator<Item = ProposedOperation>) -> Self {
        Self {
            entries: operations
                .into_iter()
                .map(|operation| PlanEntry {
                    operation,
                    dropped: false,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProposedOperation> {
        self.entries.get(index).map(|entry| &entry.operation)
    }

    pub fn is_dropped(&self, index: usize) -> bool {
        self.entries.get(index).is_some_and(|entry| entry.dropped)
    }

    /// Entries still in the plan, with their indices.
    pub fn active(&self) -> impl Iterator<Item = (usize, &ProposedOperation)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.dropped)
            .map(|(index, entry)| (index, &entry.operation))
    }

    /// Operations still in the plan, in order.
    pub fn final_operations(&self) -> Vec<ProposedOperation> {
        self.active().map(|(_, operation)| operation.clone()).collect()
    }

    /// True when an active entry other than `except` targets `path`.
    pub fn claims(&self, path: &Path, except: usize) -> bool {
        self.active()
            .any(|(index, operation)| index != except && operation.target == path)
    }

    /// A copy of the plan with entry `index` redirected to `target`.
    pub fn with_target(&self, index: usize, target: impl Into<PathBuf>) -> Self {
        let mut plan = self.clone();
        if let Some(entry) = plan.entries.get_mut(index) {
            entry.operation.target = target.into();
        }
        plan
    }

    /// Folds a resolution into the plan. Returns `false` when the result
    /// refers to an entry the plan does not have.
    pub fn apply(&mut self, result: &ResolutionResult) -> bool {
        let Some(entry) = self.entries.get_mut(result.operation_index) else {
            return false;
        };
        if !result.success {
            return true;
        }
        match &result.decision {
            PlanDecision::Drop => entry.dropped = true,
            PlanDecision::Redirect(target) => entry.operation.target = target.clone(),
            PlanDecision::Overwrite => entry.operation.write_mode = WriteMode::Overwrite,
            PlanDecision::Merge => entry.operation.write_mode = WriteMode::Merge,
            PlanDecision::Unchanged => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_ignore_dropped_entries_and_self() {
        let mut plan = OperationPlan::new(vec![
            ProposedOperation::new("/a/report.pdf", "/dest/report.pdf"),
            ProposedOperation::new("/b/report.pdf", "/dest/report.pdf"),
        ]);
        assert!(plan.claims(Path::new("/dest/report.pdf"), 1));
        assert!(!plan.claims(Path::new("/dest/other.pdf"), 1));

        plan.entries[0].dropped = true;
        assert!(!plan.claims(Path::new("/dest/report.pdf"), 1));
        assert_eq!(plan.final_operations().len(), 1);
    }

    #[test]
    fn with_target_leaves_the_original_alone() {
        let plan = OperationPlan::new(vec![ProposedOperation::new("/a", "/dest/a")]);
        let moved = plan.with_target(0, "/dest/a_1");
        assert_eq!(plan.get(0).unwrap().target, PathBuf::from("/dest/a"));
        assert_eq!(moved.get(0).unwrap().target, PathBuf::from("/dest/a_1"));
    }
}
