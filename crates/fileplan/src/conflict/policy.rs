//! Scoped default strategies.
//!
//! A policy names a scope (global, ruleset, rule, or pattern) and optionally
//! a conflict type. For a given conflict the narrowest matching scope wins,
//! a type-specific policy beats a type-agnostic one at the same scope, and
//! declaration order settles anything left.

use serde::{Deserialize, Serialize};

use crate::types::{PatternId, RuleId, RulesetId};

use super::{ConflictScope, ConflictType, ProposedOperation, ResolutionStrategy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    Global,
    Ruleset(RulesetId),
    Rule(RuleId),
    Pattern(PatternId),
}

impl PolicyScope {
    pub fn level(&self) -> ConflictScope {
        match self {
            Self::Global => ConflictScope::Global,
            Self::Ruleset(_) => ConflictScope::Ruleset,
            Self::Rule(_) => ConflictScope::Rule,
            Self::Pattern(_) => ConflictScope::Pattern,
        }
    }

    fn covers(&self, operation: &ProposedOperation) -> bool {
        match self {
            Self::Global => true,
            Self::Ruleset(id) => operation.ruleset_id.as_ref() == Some(id),
            Self::Rule(id) => operation.rule_id.as_ref() == Some(id),
            Self::Pattern(id) => operation.pattern_id.as_ref() == Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPolicy {
    pub scope: PolicyScope,
    #[serde(default)]
    pub conflict_type: Option<ConflictType>,
    pub strategy: ResolutionStrategy,
}

impl StrategyPolicy {
    pub fn new(scope: PolicyScope, strategy: ResolutionStrategy) -> Self {
        Self {
            scope,
            conflict_type: None,
            strategy,
        }
    }

    pub fn for_type(mut self, conflict_type: ConflictType) -> Self {
        self.conflict_type = Some(conflict_type);
        self
    }

    fn applies(&self, conflict_type: ConflictType, operation: &ProposedOperation) -> bool {
        self.conflict_type.map_or(true, |kind| kind == conflict_type)
            && self.scope.covers(operation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyPolicies {
    policies: Vec<StrategyPolicy>,
}

impl Default for StrategyPolicies {
    fn default() -> Self {
        Self {
            policies: vec![
                StrategyPolicy::new(PolicyScope::Global, ResolutionStrategy::Rename)
                    .for_type(ConflictType::PathCollision),
                StrategyPolicy::new(PolicyScope::Global, ResolutionStrategy::Skip)
                    .for_type(ConflictType::PatternOverlap),
            ],
        }
    }
}

impl StrategyPolicies {
    pub fn empty() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    pub fn new(policies: Vec<StrategyPolicy>) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &[StrategyPolicy] {
        &self.policies
    }

    pub fn push(&mut self, policy: StrategyPolicy) {
        self.policies.push(policy);
    }

    pub fn suggest(
        &self,
        conflict_type: ConflictType,
        operation: &ProposedOperation,
    ) -> Option<ResolutionStrategy> {
        self.policies
            .iter()
            .enumerate()
            .filter(|(_, policy)| policy.applies(conflict_type, operation))
            .min_by_key(|(order, policy)| {
                (policy.scope.level(), policy.conflict_type.is_none(), *order)
            })
            .map(|(_, policy)| policy.strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation() -> ProposedOperation {
        ProposedOperation::new("/in/a.pdf", "/out/a.pdf")
            .with_pattern("p1")
            .with_rule("r1")
            .with_ruleset("rs1")
    }

    #[test]
    fn defaults_cover_path_collisions_and_overlaps() {
        let policies = StrategyPolicies::default();
        assert_eq!(
            policies.suggest(ConflictType::PathCollision, &operation()),
            Some(ResolutionStrategy::Rename)
        );
        assert_eq!(
            policies.suggest(ConflictType::PatternOverlap, &operation()),
            Some(ResolutionStrategy::Skip)
        );
        assert_eq!(
            policies.suggest(ConflictType::RuleCollision, &operation()),
            None
        );
    }

    #[test]
    fn narrowest_scope_wins() {
        let mut policies = StrategyPolicies::default();
        policies.push(StrategyPolicy::new(
            PolicyScope::Ruleset("rs1".into()),
            ResolutionStrategy::Backup,
        ));
        policies.push(StrategyPolicy::new(
            PolicyScope::Pattern("p1".into()),
            ResolutionStrategy::Skip,
        ));
        assert_eq!(
            policies.suggest(ConflictType::PathCollision, &operation()),
            Some(ResolutionStrategy::Skip)
        );

        let other = ProposedOperation::new("/in/b", "/out/b").with_ruleset("rs1");
        assert_eq!(
            policies.suggest(ConflictType::PathCollision, &other),
            Some(ResolutionStrategy::Backup)
        );
    }

    #[test]
    fn type_specific_beats_agnostic_at_same_scope() {
        let policies = StrategyPolicies::new(vec![
            StrategyPolicy::new(PolicyScope::Rule("r1".into()), ResolutionStrategy::Skip),
            StrategyPolicy::new(PolicyScope::Rule("r1".into()), ResolutionStrategy::Overwrite)
                .for_type(ConflictType::PathCollision),
            StrategyPolicy::new(PolicyScope::Rule("r1".into()), ResolutionStrategy::Backup)
                .for_type(ConflictType::PathCollision),
        ]);
        assert_eq!(
            policies.suggest(ConflictType::PathCollision, &operation()),
            Some(ResolutionStrategy::Overwrite)
        );
        assert_eq!(
            policies.suggest(ConflictType::RuleCollision, &operation()),
            Some(ResolutionStrategy::Skip)
        );
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = r#"
- scope:
    pattern: p1
  strategy: merge
- scope: global
  conflict_type: permission_conflict
  strategy: skip
"#;
        let policies: StrategyPolicies = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policies.policies().len(), 2);
        assert_eq!(
            policies.policies()[0].scope,
            PolicyScope::Pattern("p1".into())
        );
    }
}
