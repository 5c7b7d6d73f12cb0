//! Query optimization.
//!
//! Applies deterministic rewrites that make evaluation cheaper:
//! - Flattens nested AND/OR expressions
//! - Removes double negation
//! - Reorders AND/OR operands by cost (metadata first, content last)
//!
//! The input is consumed and a new tree is returned; matching semantics are
//! unchanged because AND/OR are commutative and evaluation has no side
//! effects beyond reading content.

use super::expression::{FieldComparison, LogicalNode, LogicalOp, QueryNode, Value};
use super::field::{Field, FieldType};

pub fn optimize_query(node: QueryNode) -> QueryNode {
    match node {
        QueryNode::Logical(LogicalNode { op, children }) => match op {
            LogicalOp::And | LogicalOp::Or => optimize_associative(op, children),
            LogicalOp::Not => optimize_not(children),
            LogicalOp::Xor => QueryNode::logical(
                LogicalOp::Xor,
                children.into_iter().map(optimize_query).collect(),
            ),
        },
        other => other,
    }
}

/// Flattens nested operands of the same operator and reorders by priority.
fn optimize_associative(op: LogicalOp, children: Vec<QueryNode>) -> QueryNode {
    let mut flattened = Vec::new();

    for child in children.into_iter().map(optimize_query) {
        match child {
            QueryNode::Logical(LogicalNode {
                op: nested,
                children,
            }) if nested == op => flattened.extend(children),
            other => flattened.push(other),
        }
    }

    if flattened.len() == 1 {
        if let Some(only) = flattened.pop() {
            return only;
        }
    }
    reorder_by_priority(&mut flattened);
    QueryNode::logical(op, flattened)
}

fn optimize_not(children: Vec<QueryNode>) -> QueryNode {
    let mut children = children.into_iter().map(optimize_query).collect::<Vec<_>>();
    if children.len() != 1 {
        return QueryNode::logical(LogicalOp::Not, children);
    }
    match children.pop() {
        Some(QueryNode::Logical(LogicalNode {
            op: LogicalOp::Not,
            children: mut inner,
        })) if inner.len() == 1 => match inner.pop() {
            Some(only) => only,
            None => QueryNode::logical(LogicalOp::Not, Vec::new()),
        },
        Some(child) => QueryNode::not(child),
        None => QueryNode::logical(LogicalOp::Not, Vec::new()),
    }
}

/// Reorders operands by evaluation cost.
///
/// Priority levels (lower executes first):
/// - 0: metadata comparisons (`size`, dates, flags, `extension`)
/// - 1: name/path text and glob terms
/// - 2: regex comparisons
/// - 3: group references, resolved at evaluation time
/// - 4: content search, which reads the file
///
/// The sort is stable so equal-cost operands keep their written order.
fn reorder_by_priority(parts: &mut Vec<QueryNode>) {
    if parts.len() <= 1 {
        return;
    }

    let mut keyed: Vec<_> = parts
        .drain(..)
        .map(|node| (evaluation_cost(&node), node))
        .collect();
    keyed.sort_by_key(|(cost, _)| *cost);
    parts.extend(keyed.into_iter().map(|(_, node)| node));
}

pub(crate) fn evaluation_cost(node: &QueryNode) -> u8 {
    match node {
        QueryNode::Comparison(comparison) => comparison_cost(comparison),
        QueryNode::Glob(_) => 1,
        QueryNode::Group(_) => 3,
        QueryNode::Logical(node) => node
            .children
            .iter()
            .map(evaluation_cost)
            .max()
            .unwrap_or_default(),
    }
}

fn comparison_cost(comparison: &FieldComparison) -> u8 {
    match (comparison.field.field_type(), &comparison.value) {
        (FieldType::Content, _) => 4,
        (_, Value::Regex(_)) => 2,
        (FieldType::Integer | FieldType::DateTime | FieldType::Boolean, _) => 0,
        (FieldType::Text, _) if comparison.field == Field::Extension => 0,
        (FieldType::Text, _) => 1,
    }
}
