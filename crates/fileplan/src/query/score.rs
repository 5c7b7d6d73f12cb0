//! Complexity scoring and performance warnings for parsed queries.

use serde::{Deserialize, Serialize};

use super::expression::{LogicalOp, QueryNode, Value};
use super::field::FieldType;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

/// Node-level statistics of a parsed tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub nodes: usize,
    pub content_terms: usize,
    pub regex_terms: usize,
    pub group_refs: usize,
    /// True when every content term sits next to a cheap term in a
    /// top-level conjunction.
    pub content_narrowed: bool,
}

impl QueryStats {
    pub fn of(root: &QueryNode) -> Self {
        let mut stats = Self::default();
        root.walk(&mut |node| {
            stats.nodes += 1;
            match node {
                QueryNode::Group(_) => stats.group_refs += 1,
                other => {
                    if let Some(comparison) = other.leaf_comparison() {
                        if comparison.field.field_type() == FieldType::Content {
                            stats.content_terms += 1;
                        }
                        if matches!(comparison.value, Value::Regex(_)) {
                            stats.regex_terms += 1;
                        }
                    }
                }
            }
        });
        stats.content_narrowed = stats.content_terms == 0 || is_narrowed(root);
        stats
    }

    /// Complexity score in `MIN_SCORE..=MAX_SCORE`.
    pub fn score(&self) -> u8 {
        let mut score = self.nodes.div_ceil(3);
        if self.content_terms > 0 {
            score += 3 + (self.content_terms - 1);
        }
        if self.regex_terms > 0 {
            score += 1;
        }
        if self.group_refs > 0 {
            score += 1;
        }
        score.clamp(MIN_SCORE as usize, MAX_SCORE as usize) as u8
    }
}

fn is_narrowed(root: &QueryNode) -> bool {
    match root {
        QueryNode::Logical(node) if node.op == LogicalOp::And => node
            .children
            .iter()
            .any(|child| content_terms(child) == 0),
        _ => false,
    }
}

fn content_terms(root: &QueryNode) -> usize {
    let mut count = 0usize;
    root.walk(&mut |node| {
        if let Some(comparison) = node.leaf_comparison() {
            if comparison.field.field_type() == FieldType::Content {
                count += 1;
            }
        }
    });
    count
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationIssueKind {
    PerformanceRisk,
    UnnarrowedContentSearch,
    NodeLimitExceeded,
}

/// A warning attached to a successful parse. The query is still usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: ValidationIssueKind,
    pub message: String,
}

pub fn validation_issues(
    stats: &QueryStats,
    score: u8,
    warning_score: u8,
    max_nodes: usize,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if score >= warning_score {
        issues.push(ValidationIssue {
            kind: ValidationIssueKind::PerformanceRisk,
            message: format!("complexity score {score} is at or above {warning_score}"),
        });
    }
    if !stats.content_narrowed {
        issues.push(ValidationIssue {
            kind: ValidationIssueKind::UnnarrowedContentSearch,
            message: "content search is not narrowed by a name, size or date term".to_string(),
        });
    }
    if stats.nodes > max_nodes {
        issues.push(ValidationIssue {
            kind: ValidationIssueKind::NodeLimitExceeded,
            message: format!("query has {} nodes, limit is {max_nodes}", stats.nodes),
        });
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expression::GlobPattern;
    use crate::query::field::{Field, Operator};

    fn like(pattern: &str) -> QueryNode {
        QueryNode::compare(
            Field::Name,
            Operator::Like,
            Value::Pattern(GlobPattern::literal(pattern)),
        )
    }

    fn content(needle: &str) -> QueryNode {
        QueryNode::compare(Field::Content, Operator::Contains, Value::Text(needle.into()))
    }

    #[test]
    fn single_glob_scores_one() {
        let stats = QueryStats::of(&like("*.txt"));
        assert_eq!(stats.score(), 1);
        assert!(validation_issues(&stats, stats.score(), 8, 64).is_empty());
    }

    #[test]
    fn content_terms_raise_the_score() {
        let stats = QueryStats::of(&QueryNode::logical(
            LogicalOp::And,
            vec![like("*.txt"), content("invoice")],
        ));
        // three nodes -> 1, content -> +3
        assert_eq!(stats.score(), 4);
        assert!(stats.content_narrowed);
    }

    #[test]
    fn bare_content_search_is_flagged() {
        let stats = QueryStats::of(&content("invoice"));
        let issues = validation_issues(&stats, stats.score(), 8, 64);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ValidationIssueKind::UnnarrowedContentSearch);

        let or = QueryStats::of(&QueryNode::logical(
            LogicalOp::Or,
            vec![like("*.txt"), content("invoice")],
        ));
        assert!(!or.content_narrowed);
    }

    #[test]
    fn score_is_clamped() {
        let many = (0..60).map(|index| like(&format!("{index}*"))).collect();
        let stats = QueryStats::of(&QueryNode::logical(LogicalOp::Or, many));
        assert_eq!(stats.score(), MAX_SCORE);
        let kinds = validation_issues(&stats, stats.score(), 8, 32)
            .into_iter()
            .map(|issue| issue.kind)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ValidationIssueKind::PerformanceRisk,
                ValidationIssueKind::NodeLimitExceeded
            ]
        );
    }
}
