//! Conflict detection over an operation plan.
//!
//! Detection is read-only with respect to the plan and only queries disk
//! through [`TargetFs`]. Conflicts are reported in plan order, grouped by
//! kind: path collisions, then rule collisions and overlaps, then
//! permission problems.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::events::{EngineEvent, NullEventSink, SharedEventSink};
use crate::types::{PatternId, RuleId, RulesetId};

use super::target::{EntryKind, StdTargetFs, TargetFs};
use super::{
    Conflict, ConflictScope, ConflictType, OperationPlan, ProposedOperation, Severity,
    StrategyPolicies, WriteMode,
};

/// Restricts detection to operations belonging to one ruleset, rule, or
/// pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScopeFilter {
    #[default]
    All,
    Ruleset(RulesetId),
    Rule(RuleId),
    Pattern(PatternId),
}

impl ScopeFilter {
    pub fn includes(&self, operation: &ProposedOperation) -> bool {
        match self {
            Self::All => true,
            Self::Ruleset(id) => operation.ruleset_id.as_ref() == Some(id),
            Self::Rule(id) => operation.rule_id.as_ref() == Some(id),
            Self::Pattern(id) => operation.pattern_id.as_ref() == Some(id),
        }
    }
}

#[derive(Clone)]
pub struct ConflictDetector {
    target_fs: Arc<dyn TargetFs>,
    policies: StrategyPolicies,
    events: SharedEventSink,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(
            Arc::new(StdTargetFs),
            StrategyPolicies::default(),
            Arc::new(NullEventSink),
        )
    }
}

impl std::fmt::Debug for ConflictDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictDetector")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl ConflictDetector {
    pub fn new(
        target_fs: Arc<dyn TargetFs>,
        policies: StrategyPolicies,
        events: SharedEventSink,
    ) -> Self {
        Self {
            target_fs,
            policies,
            events,
        }
    }

    pub fn target_fs(&self) -> &Arc<dyn TargetFs> {
        &self.target_fs
    }

    pub fn policies(&self) -> &StrategyPolicies {
        &self.policies
    }

    /// Detects conflicts among the plan's active operations and emits a
    /// `ConflictDetected` event for each.
    pub fn detect(&self, plan: &OperationPlan, scope: &ScopeFilter) -> Vec<Conflict> {
        let conflicts = self.detect_quiet(plan, scope);
        for conflict in &conflicts {
            self.events.emit(&EngineEvent::ConflictDetected {
                conflict_type: conflict.conflict_type,
                severity: conflict.severity,
                target: conflict.target_path.display().to_string(),
            });
        }
        conflicts
    }

    /// Convenience wrapper for callers holding a bare operation list.
    pub fn detect_operations(
        &self,
        operations: &[ProposedOperation],
        scope: &ScopeFilter,
    ) -> Vec<Conflict> {
        self.detect(&OperationPlan::new(operations.iter().cloned()), scope)
    }

    /// Same as [`detect`](Self::detect) without emitting events; used when
    /// strategies re-check a tentative plan.
    pub fn detect_quiet(&self, plan: &OperationPlan, scope: &ScopeFilter) -> Vec<Conflict> {
        let operations: Vec<(usize, &ProposedOperation)> = plan
            .active()
            .filter(|(_, operation)| scope.includes(operation))
            .collect();

        let mut conflicts = Vec::new();
        self.path_collisions(&operations, &mut conflicts);
        self.source_collisions(&operations, &mut conflicts);
        self.permission_conflicts(&operations, &mut conflicts);
        conflicts
    }

    fn path_collisions(
        &self,
        operations: &[(usize, &ProposedOperation)],
        conflicts: &mut Vec<Conflict>,
    ) {
        let mut by_target: HashMap<&Path, Vec<(usize, &ProposedOperation)>> = HashMap::new();
        let mut order: Vec<&Path> = Vec::new();
        for &(index, operation) in operations {
            if operation.write_mode != WriteMode::Create {
                continue;
            }
            let group = by_target.entry(operation.target.as_path()).or_insert_with(|| {
                order.push(operation.target.as_path());
                Vec::new()
            });
            // Exact duplicates of an earlier operation are not conflicts.
            if group.iter().any(|(_, seen)| seen.source == operation.source) {
                continue;
            }
            group.push((index, operation));
        }

        for target in order {
            let Some(group) = by_target.get(target) else {
                continue;
            };
            let Some((&(_, keeper), rest)) = group.split_first() else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let existing = self.target_fs.entry_kind(target);
            for &(index, operation) in rest {
                let severity = self.collision_severity(target, existing, keeper, operation);
                let related: Vec<usize> = group
                    .iter()
                    .map(|(other, _)| *other)
                    .filter(|other| *other != index)
                    .collect();
                let description = format!(
                    "{} and {} both target {}",
                    keeper.source.display(),
                    operation.source.display(),
                    target.display()
                );
                conflicts.push(self.build(
                    ConflictType::PathCollision,
                    severity,
                    index,
                    operation,
                    related,
                    &[keeper, operation],
                    description,
                ));
            }
        }
    }

    fn collision_severity(
        &self,
        target: &Path,
        existing: EntryKind,
        keeper: &ProposedOperation,
        operation: &ProposedOperation,
    ) -> Severity {
        if keeper.source_is_dir != operation.source_is_dir {
            return Severity::Critical;
        }
        match existing {
            EntryKind::Missing => Severity::Low,
            EntryKind::Directory if !operation.source_is_dir => Severity::Critical,
            EntryKind::File if operation.source_is_dir => Severity::Critical,
            EntryKind::Directory => Severity::Medium,
            EntryKind::File => {
                let incoming = operation
                    .source_checksum
                    .clone()
                    .or_else(|| self.target_fs.checksum(&operation.source));
                match (incoming, self.target_fs.checksum(target)) {
                    (Some(incoming), Some(current)) if incoming == current => Severity::Medium,
                    _ => Severity::High,
                }
            }
        }
    }

    // Same source sent to different targets by different rules or patterns.
    fn source_collisions(
        &self,
        operations: &[(usize, &ProposedOperation)],
        conflicts: &mut Vec<Conflict>,
    ) {
        let mut by_source: HashMap<&Path, Vec<(usize, &ProposedOperation)>> = HashMap::new();
        let mut order: Vec<&Path> = Vec::new();
        for &(index, operation) in operations {
            by_source
                .entry(operation.source.as_path())
                .or_insert_with(|| {
                    order.push(operation.source.as_path());
                    Vec::new()
                })
                .push((index, operation));
        }

        for source in order {
            let Some(group) = by_source.get(source) else {
                continue;
            };
            for (position, &(index, operation)) in group.iter().enumerate() {
                let earlier = group[..position].iter().find_map(|&(_, other)| {
                    if other.target == operation.target {
                        return None;
                    }
                    source_conflict_type(other, operation).map(|kind| (kind, other))
                });
                let Some((conflict_type, other)) = earlier else {
                    continue;
                };
                let related: Vec<usize> = group
                    .iter()
                    .filter(|(other_index, candidate)| {
                        *other_index != index && candidate.target != operation.target
                    })
                    .map(|(other_index, _)| *other_index)
                    .collect();
                let severity = match conflict_type {
                    ConflictType::RuleCollision => Severity::High,
                    _ => Severity::Medium,
                };
                let description = format!(
                    "{} is sent to both {} and {}",
                    source.display(),
                    other.target.display(),
                    operation.target.display()
                );
                conflicts.push(self.build(
                    conflict_type,
                    severity,
                    index,
                    operation,
                    related,
                    &[other, operation],
                    description,
                ));
            }
        }
    }

    fn permission_conflicts(
        &self,
        operations: &[(usize, &ProposedOperation)],
        conflicts: &mut Vec<Conflict>,
    ) {
        for &(index, operation) in operations {
            if self.target_fs.is_writable(&operation.target) {
                continue;
            }
            let description = format!("{} is not writable", operation.target.display());
            conflicts.push(self.build(
                ConflictType::PermissionConflict,
                Severity::High,
                index,
                operation,
                Vec::new(),
                &[operation],
                description,
            ));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        conflict_type: ConflictType,
        severity: Severity,
        index: usize,
        operation: &ProposedOperation,
        related_operations: Vec<usize>,
        involved: &[&ProposedOperation],
        description: String,
    ) -> Conflict {
        let suggested_strategy = self.policies.suggest(conflict_type, operation);
        Conflict {
            id: Uuid::new_v4(),
            conflict_type,
            scope: shared_scope(involved),
            source_path: operation.source.clone(),
            target_path: operation.target.clone(),
            severity,
            auto_resolvable: severity <= Severity::Medium && suggested_strategy.is_some(),
            suggested_strategy,
            operation_index: index,
            related_operations,
            description,
        }
    }
}

fn source_conflict_type(
    first: &ProposedOperation,
    second: &ProposedOperation,
) -> Option<ConflictType> {
    match (&first.rule_id, &second.rule_id) {
        (Some(a), Some(b)) if a != b => return Some(ConflictType::RuleCollision),
        _ => {}
    }
    match (&first.pattern_id, &second.pattern_id) {
        (Some(a), Some(b)) if a != b => Some(ConflictType::PatternOverlap),
        _ => None,
    }
}

/// Narrowest identifier every involved operation shares.
fn shared_scope(involved: &[&ProposedOperation]) -> ConflictScope {
    fn shared<T: PartialEq>(
        involved: &[&ProposedOperation],
        key: impl Fn(&ProposedOperation) -> Option<&T>,
    ) -> bool {
        let Some(first) = involved.first().and_then(|operation| key(operation)) else {
            return false;
        };
        involved.iter().all(|operation| key(operation) == Some(first))
    }

    if shared(involved, |operation| operation.pattern_id.as_ref()) {
        ConflictScope::Pattern
    } else if shared(involved, |operation| operation.rule_id.as_ref()) {
        ConflictScope::Rule
    } else if shared(involved, |operation| operation.ruleset_id.as_ref()) {
        ConflictScope::Ruleset
    } else {
        ConflictScope::Global
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::events::MemoryEventSink;

    fn detector() -> ConflictDetector {
        ConflictDetector::default()
    }

    #[test]
    fn two_sources_one_target_is_one_collision() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("report.pdf");
        let plan = OperationPlan::new(vec![
            ProposedOperation::new("/a/report.pdf", &target),
            ProposedOperation::new("/b/report.pdf", &target),
        ]);

        let conflicts = detector().detect(&plan, &ScopeFilter::All);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::PathCollision);
        assert_eq!(conflict.severity, Severity::Low);
        assert_eq!(conflict.operation_index, 1);
        assert_eq!(conflict.related_operations, vec![0]);
        assert_eq!(conflict.scope, ConflictScope::Global);
        assert_eq!(
            conflict.suggested_strategy,
            Some(super::super::ResolutionStrategy::Rename)
        );
        assert!(conflict.auto_resolvable);
    }

    #[test]
    fn existing_target_raises_severity() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("report.pdf");
        fs::write(&target, "old").unwrap();
        let incoming = dir.path().join("incoming.pdf");
        fs::write(&incoming, "new").unwrap();
        let same = dir.path().join("same.pdf");
        fs::write(&same, "old").unwrap();

        let plan = OperationPlan::new(vec![
            ProposedOperation::new("/a/report.pdf", &target),
            ProposedOperation::new(&incoming, &target),
            ProposedOperation::new(&same, &target),
            ProposedOperation::new("/c/folder", &target).directory(),
        ]);
        let severities: Vec<Severity> = detector()
            .detect(&plan, &ScopeFilter::All)
            .into_iter()
            .filter(|conflict| conflict.conflict_type == ConflictType::PathCollision)
            .map(|conflict| conflict.severity)
            .collect();
        assert_eq!(
            severities,
            vec![Severity::High, Severity::Medium, Severity::Critical]
        );
    }

    #[test]
    fn duplicates_and_non_create_writes_are_not_collisions() {
        let plan = OperationPlan::new(vec![
            ProposedOperation::new("/a/x", "/dest/x"),
            ProposedOperation::new("/a/x", "/dest/x"),
            ProposedOperation::new("/b/x", "/dest/x").with_write_mode(WriteMode::Overwrite),
        ]);
        let conflicts = detector().detect_quiet(&plan, &ScopeFilter::All);
        assert!(conflicts
            .iter()
            .all(|conflict| conflict.conflict_type != ConflictType::PathCollision));
    }

    #[test]
    fn rule_collisions_and_pattern_overlaps() {
        let plan = OperationPlan::new(vec![
            ProposedOperation::new("/in/a", "/one/a").with_rule("r1"),
            ProposedOperation::new("/in/a", "/two/a").with_rule("r2"),
            ProposedOperation::new("/in/b", "/one/b")
                .with_rule("r1")
                .with_pattern("p1"),
            ProposedOperation::new("/in/b", "/two/b")
                .with_rule("r1")
                .with_pattern("p2"),
        ]);
        let conflicts = detector().detect_quiet(&plan, &ScopeFilter::All);
        let kinds: Vec<(ConflictType, Severity, usize)> = conflicts
            .iter()
            .map(|conflict| {
                (
                    conflict.conflict_type,
                    conflict.severity,
                    conflict.operation_index,
                )
            })
            .collect();
        assert!(kinds.contains(&(ConflictType::RuleCollision, Severity::High, 1)));
        assert!(kinds.contains(&(ConflictType::PatternOverlap, Severity::Medium, 3)));

        let overlap = conflicts
            .iter()
            .find(|conflict| conflict.conflict_type == ConflictType::PatternOverlap)
            .unwrap();
        assert_eq!(overlap.scope, ConflictScope::Rule);
    }

    #[test]
    fn scope_filter_limits_operations() {
        let plan = OperationPlan::new(vec![
            ProposedOperation::new("/a/x", "/dest/x").with_ruleset("rs1"),
            ProposedOperation::new("/b/x", "/dest/x").with_ruleset("rs2"),
        ]);
        let conflicts =
            detector().detect_quiet(&plan, &ScopeFilter::Ruleset(RulesetId::from("rs1")));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn detect_emits_events() {
        let sink = Arc::new(MemoryEventSink::new());
        let detector = ConflictDetector::new(
            Arc::new(StdTargetFs),
            StrategyPolicies::default(),
            sink.clone(),
        );
        let operations = vec![
            ProposedOperation::new("/a/x", "/dest/x"),
            ProposedOperation::new("/b/x", "/dest/x"),
        ];
        detector.detect_operations(&operations, &ScopeFilter::All);
        assert_eq!(sink.count("conflict_detected"), 1);
        assert!(detector
            .detect_quiet(&OperationPlan::new(operations), &ScopeFilter::All)
            .iter()
            .all(|conflict| conflict.operation_index == 1));
        assert_eq!(sink.count("conflict_detected"), 1);
    }

    /// Missing targets everywhere; writes are refused under `denied`.
    struct ReadOnlyUnder {
        denied: std::path::PathBuf,
    }

    impl TargetFs for ReadOnlyUnder {
        fn entry_kind(&self, _path: &Path) -> EntryKind {
            EntryKind::Missing
        }

        fn checksum(&self, _path: &Path) -> Option<String> {
            None
        }

        fn is_writable(&self, path: &Path) -> bool {
            !path.starts_with(&self.denied)
        }

        fn rename(&self, _from: &Path, _to: &Path) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unwritable_target_is_a_permission_conflict() {
        let detector = ConflictDetector::new(
            Arc::new(ReadOnlyUnder {
                denied: "/locked".into(),
            }),
            StrategyPolicies::default(),
            Arc::new(NullEventSink),
        );
        let plan = OperationPlan::new(vec![
            ProposedOperation::new("/in/a.txt", "/open/a.txt"),
            ProposedOperation::new("/in/b.txt", "/locked/b.txt").with_rule("r1"),
        ]);

        let conflicts = detector.detect(&plan, &ScopeFilter::All);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::PermissionConflict);
        assert_eq!(conflict.severity, Severity::High);
        assert!(!conflict.auto_resolvable);
        assert_eq!(conflict.operation_index, 1);
        assert!(conflict.related_operations.is_empty());
        assert_eq!(conflict.scope, ConflictScope::Rule);
        assert_eq!(conflict.target_path, std::path::PathBuf::from("/locked/b.txt"));
    }
}
