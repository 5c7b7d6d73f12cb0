//! Glob translation into `LIKE` comparisons.

use crate::token::TokenSpan;

use super::expression::{FieldComparison, GlobPattern, GlobTerm, Value};
use super::field::{Field, Operator};

/// Translates the glob `text`, found at byte `offset` of the resolved
/// expression, into a `LIKE` comparison.
///
/// Globs containing `/` match the full path; relative ones get an implicit
/// leading `*/` so they match at any depth.
pub fn translate_glob(text: &str, offset: usize, spans: &[TokenSpan]) -> FieldComparison {
    let pattern = GlobPattern::from_resolved(text, offset, spans);
    if text.contains('/') {
        let pattern = if text.starts_with('/') || text.starts_with('*') {
            pattern
        } else {
            pattern.with_prefix("*/")
        };
        return FieldComparison {
            field: Field::Path,
            operator: Operator::Like,
            value: Value::Pattern(pattern),
        };
    }
    FieldComparison {
        field: Field::Name,
        operator: Operator::Like,
        value: Value::Pattern(pattern),
    }
}

pub fn glob_term(text: &str, offset: usize, spans: &[TokenSpan]) -> GlobTerm {
    GlobTerm {
        raw_glob: text.to_string(),
        comparison: translate_glob(text, offset, spans),
    }
}
