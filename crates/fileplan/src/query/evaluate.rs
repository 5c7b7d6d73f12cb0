//! Query evaluation against a single record.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::error::MatchEvaluationError;
use crate::types::FileRecord;

use super::content::{file_content_contains, file_content_matches_regex};
use super::context::RecordContext;
use super::expression::{FieldComparison, LogicalNode, LogicalOp, QueryAst, QueryNode, Value};
use super::field::{FieldType, Operator};
use super::text_match::wildcard_matches;

/// Looks up the compiled query behind a `@group` reference.
pub trait GroupResolver: Send + Sync {
    fn resolve_group(&self, group: &str) -> Option<QueryAst>;
}

/// Resolver with no groups; every reference is unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGroups;

impl GroupResolver for NoGroups {
    fn resolve_group(&self, _group: &str) -> Option<QueryAst> {
        None
    }
}

impl<T: GroupResolver + ?Sized> GroupResolver for Arc<T> {
    fn resolve_group(&self, group: &str) -> Option<QueryAst> {
        (**self).resolve_group(group)
    }
}

/// Outcome of evaluating one record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluation {
    pub matched: bool,
    /// Leaf terms that made the query true, in evaluation order.
    pub conditions: Vec<String>,
}

pub fn evaluate_query(
    query: &QueryAst,
    record: &FileRecord,
    now: NaiveDateTime,
    groups: &dyn GroupResolver,
) -> Result<Evaluation, MatchEvaluationError> {
    let context = RecordContext::new(record, now, query.case_sensitive());
    let mut evaluator = Evaluator {
        groups,
        visiting: Vec::new(),
        conditions: Vec::new(),
    };
    let matched = evaluator.evaluate(query.root(), &context)?;
    if !matched {
        evaluator.conditions.clear();
    }
    Ok(Evaluation {
        matched,
        conditions: evaluator.conditions,
    })
}

struct Evaluator<'g> {
    groups: &'g dyn GroupResolver,
    visiting: Vec<String>,
    conditions: Vec<String>,
}

impl Evaluator<'_> {
    fn evaluate(
        &mut self,
        node: &QueryNode,
        context: &RecordContext<'_>,
    ) -> Result<bool, MatchEvaluationError> {
        match node {
            QueryNode::Logical(logical) => self.evaluate_logical(logical, context),
            QueryNode::Group(group) => self.evaluate_group(&group.group_id, context),
            QueryNode::Comparison(comparison) => {
                let matched = evaluate_comparison(comparison, context)?;
                if matched {
                    self.conditions.push(node.to_string());
                }
                Ok(matched)
            }
            QueryNode::Glob(glob) => {
                let matched = evaluate_comparison(&glob.comparison, context)?;
                if matched {
                    self.conditions.push(glob.raw_glob.clone());
                }
                Ok(matched)
            }
        }
    }

    fn evaluate_logical(
        &mut self,
        node: &LogicalNode,
        context: &RecordContext<'_>,
    ) -> Result<bool, MatchEvaluationError> {
        let mark = self.conditions.len();
        match node.op {
            LogicalOp::And => {
                for child in &node.children {
                    if !self.evaluate(child, context)? {
                        self.conditions.truncate(mark);
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicalOp::Or => {
                for child in &node.children {
                    if self.evaluate(child, context)? {
                        return Ok(true);
                    }
                    self.conditions.truncate(mark);
                }
                Ok(false)
            }
            LogicalOp::Not => {
                let mut matched = false;
                for child in &node.children {
                    matched = self.evaluate(child, context)?;
                    self.conditions.truncate(mark);
                    if matched {
                        break;
                    }
                }
                if !matched {
                    self.conditions.push(QueryNode::Logical(node.clone()).to_string());
                }
                Ok(!matched)
            }
            LogicalOp::Xor => {
                let mut count = 0usize;
                for child in &node.children {
                    let child_mark = self.conditions.len();
                    if self.evaluate(child, context)? {
                        count += 1;
                        if count > 1 {
                            self.conditions.truncate(mark);
                            return Ok(false);
                        }
                    } else {
                        self.conditions.truncate(child_mark);
                    }
                }
                if count != 1 {
                    self.conditions.truncate(mark);
                }
                Ok(count == 1)
            }
        }
    }

    fn evaluate_group(
        &mut self,
        group: &str,
        context: &RecordContext<'_>,
    ) -> Result<bool, MatchEvaluationError> {
        if self.visiting.iter().any(|visiting| visiting == group) {
            return Err(MatchEvaluationError::GroupCycle {
                group: group.to_string(),
            });
        }
        let query = self
            .groups
            .resolve_group(group)
            .ok_or_else(|| MatchEvaluationError::UnknownGroup {
                group: group.to_string(),
            })?;

        let mark = self.conditions.len();
        self.visiting.push(group.to_string());
        let matched = if query.case_sensitive() == context.case_sensitive() {
            self.evaluate(query.root(), context)
        } else {
            let regrouped =
                RecordContext::new(context.record(), *context.now(), query.case_sensitive());
            self.evaluate(query.root(), &regrouped)
        };
        self.visiting.pop();

        let matched = matched?;
        self.conditions.truncate(mark);
        if matched {
            self.conditions.push(format!("@{group}"));
        }
        Ok(matched)
    }
}

fn evaluate_comparison(
    comparison: &FieldComparison,
    context: &RecordContext<'_>,
) -> Result<bool, MatchEvaluationError> {
    let FieldComparison {
        field,
        operator,
        value,
    } = comparison;
    let operator = *operator;

    let matched = match field.field_type() {
        FieldType::Text => {
            let Some(actual) = context.text(*field) else {
                return Ok(operator == Operator::Ne);
            };
            compare_text(operator, value, actual, context)
        }
        FieldType::Integer => {
            if context.is_dir() {
                return Ok(false);
            }
            match value {
                Value::Size(size) => size.matches(operator, context.size()),
                _ => false,
            }
        }
        FieldType::DateTime => {
            let Some(timestamp) = context.timestamp(*field) else {
                return Ok(operator == Operator::Ne);
            };
            match value {
                Value::Date(date) => date.matches(operator, timestamp, context.today()),
                _ => false,
            }
        }
        FieldType::Boolean => {
            let (Some(actual), Value::Bool(expected)) = (context.flag(*field), value) else {
                return Ok(false);
            };
            match operator {
                Operator::Eq => actual == *expected,
                Operator::Ne => actual != *expected,
                _ => false,
            }
        }
        FieldType::Content => {
            if context.is_dir() {
                return Ok(false);
            }
            let path = &context.record().path;
            let result = match (operator, value) {
                (Operator::Contains, Value::Text(needle)) => {
                    file_content_contains(path, needle.as_bytes(), !context.case_sensitive())
                }
                (Operator::Matches, Value::Regex(regex)) => file_content_matches_regex(path, regex),
                _ => Ok(false),
            };
            result.map_err(|source| MatchEvaluationError::ContentRead {
                path: path.clone(),
                source,
            })?
        }
    };
    Ok(matched)
}

fn compare_text(
    operator: Operator,
    value: &Value,
    actual: &str,
    context: &RecordContext<'_>,
) -> bool {
    let expected = match value {
        Value::Regex(regex) => return operator == Operator::Matches && regex.is_match(actual),
        Value::Text(text) => std::borrow::Cow::Borrowed(text.as_str()),
        Value::Pattern(pattern) => pattern.render(context.now(), !context.case_sensitive()),
        _ => return false,
    };
    let expected = expected.as_ref();

    match operator {
        Operator::Eq => actual == expected,
        Operator::Ne => actual != expected,
        Operator::Like => wildcard_matches(expected, actual),
        Operator::Contains => actual.contains(expected),
        Operator::StartsWith => actual.starts_with(expected),
        Operator::EndsWith => actual.ends_with(expected),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use chrono::NaiveDate;

    use crate::query::expression::{lowercase_query, GlobPattern};
    use crate::query::field::Field;
    use crate::query::size::SizeValue;

    struct MapGroups(HashMap<String, QueryAst>);

    impl GroupResolver for MapGroups {
        fn resolve_group(&self, group: &str) -> Option<QueryAst> {
            self.0.get(group).cloned()
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 29)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn like(pattern: &str) -> QueryNode {
        QueryNode::compare(
            Field::Name,
            Operator::Like,
            Value::Pattern(GlobPattern::literal(pattern)),
        )
    }

    fn size_gt(bytes: u64) -> QueryNode {
        QueryNode::compare(Field::Size, Operator::Gt, Value::Size(SizeValue::Bytes(bytes)))
    }

    fn eval(node: QueryNode, record: &FileRecord) -> Evaluation {
        let ast = QueryAst::new(lowercase_query(node), false);
        evaluate_query(&ast, record, now(), &NoGroups).expect("evaluate")
    }

    #[test]
    fn and_reports_every_leaf() {
        let record = FileRecord::file("/p/Photo.JPG", 20);
        let result = eval(
            QueryNode::logical(LogicalOp::And, vec![like("*.jpg"), size_gt(10)]),
            &record,
        );
        assert!(result.matched);
        assert_eq!(result.conditions.len(), 2);
    }

    #[test]
    fn or_keeps_only_the_matching_branch() {
        let record = FileRecord::file("/p/a.txt", 1);
        let result = eval(
            QueryNode::logical(LogicalOp::Or, vec![like("*.pdf"), like("*.txt")]),
            &record,
        );
        assert!(result.matched);
        assert_eq!(result.conditions, vec!["name LIKE \"*.txt\"".to_string()]);
    }

    #[test]
    fn xor_requires_exactly_one() {
        let record = FileRecord::file("/p/a.txt", 100);
        let both = eval(
            QueryNode::logical(LogicalOp::Xor, vec![like("*.txt"), size_gt(10)]),
            &record,
        );
        assert!(!both.matched);
        assert!(both.conditions.is_empty());

        let one = eval(
            QueryNode::logical(LogicalOp::Xor, vec![like("*.txt"), size_gt(1000)]),
            &record,
        );
        assert!(one.matched);
    }

    #[test]
    fn not_records_the_negated_term() {
        let record = FileRecord::file("/p/a.txt", 1);
        let result = eval(QueryNode::not(like("*.pdf")), &record);
        assert!(result.matched);
        assert_eq!(result.conditions, vec!["NOT name LIKE \"*.pdf\"".to_string()]);
    }

    #[test]
    fn size_never_matches_directories() {
        let record = FileRecord::directory("/p/big");
        assert!(!eval(size_gt(0), &record).matched);
        assert!(!eval(QueryNode::not(size_gt(0)), &record).conditions.is_empty());
    }

    #[test]
    fn missing_optional_field_only_satisfies_not_equal() {
        let record = FileRecord::file("/p/a.bin", 1);
        let eq = QueryNode::compare(Field::Checksum, Operator::Eq, Value::Text("ab".into()));
        let ne = QueryNode::compare(Field::Checksum, Operator::Ne, Value::Text("ab".into()));
        assert!(!eval(eq, &record).matched);
        assert!(eval(ne, &record).matched);
    }

    #[test]
    fn groups_resolve_and_detect_cycles() {
        let mut groups = HashMap::new();
        groups.insert(
            "docs".to_string(),
            QueryAst::new(like("*.pdf"), false),
        );
        groups.insert(
            "loop".to_string(),
            QueryAst::new(QueryNode::group("loop"), false),
        );
        let groups = MapGroups(groups);
        let record = FileRecord::file("/p/a.pdf", 1);

        let ast = QueryAst::new(QueryNode::group("docs"), false);
        let result = evaluate_query(&ast, &record, now(), &groups).unwrap();
        assert!(result.matched);
        assert_eq!(result.conditions, vec!["@docs".to_string()]);

        let ast = QueryAst::new(QueryNode::group("loop"), false);
        match evaluate_query(&ast, &record, now(), &groups) {
            Err(MatchEvaluationError::GroupCycle { group }) => assert_eq!(group, "loop"),
            other => panic!("expected cycle, got {other:?}"),
        }

        let ast = QueryAst::new(QueryNode::group("missing"), false);
        assert!(matches!(
            evaluate_query(&ast, &record, now(), &groups),
            Err(MatchEvaluationError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn content_is_read_only_after_cheaper_terms_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"Meeting notes: INVOICE attached").unwrap();

        let content = QueryNode::compare(
            Field::Content,
            Operator::Contains,
            Value::Text("Invoice".into()),
        );
        let record = FileRecord::file(&path, 31);
        assert!(eval(content.clone(), &record).matched);

        // The missing file would fail to read, but the name check fails first.
        let missing = FileRecord::file(dir.path().join("gone.txt"), 1);
        let guarded = QueryNode::logical(LogicalOp::And, vec![like("*.pdf"), content.clone()]);
        assert!(!eval(guarded, &missing).matched);

        let ast = QueryAst::new(lowercase_query(content), false);
        assert!(matches!(
            evaluate_query(&ast, &missing, now(), &NoGroups),
            Err(MatchEvaluationError::ContentRead { .. })
        ));
    }

    #[test]
    fn content_search_ignores_case_beyond_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gruss.txt");
        std::fs::write(&path, "Grüße ÜBER alles").unwrap();
        let record = FileRecord::file(&path, 18);

        for needle in ["ÜBER", "über", "BER"] {
            let content = QueryNode::compare(
                Field::Content,
                Operator::Contains,
                Value::Text(needle.into()),
            );
            assert!(eval(content, &record).matched, "{needle}");
        }
    }
}
