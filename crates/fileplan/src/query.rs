//! Pattern query language: parsing, compilation, and per-record evaluation.
//!
//! This module provides:
//! - Input classification (simple glob, token glob, shorthand, advanced query)
//! - Tokenization and recursive-descent parsing of advanced queries
//! - The typed, immutable query tree and its canonical rendering
//! - Complexity scoring and performance warnings
//! - Query optimization (flattening, reordering by cost)
//! - Evaluation against `FileRecord` snapshots, including content search

mod classify;
mod content;
mod context;
mod date;
mod evaluate;
mod expression;
mod field;
mod glob;
mod optimizer;
mod parser;
mod path;
mod score;
mod shorthand;
mod size;
mod text_match;

pub use classify::{
    classify, InputForm, IntelligentParser, ParsedQuery, ParserOptions, PatternComplexity,
};
pub use content::{file_content_contains, file_content_matches_regex};
pub use date::{DateSpec, Period};
pub use evaluate::{evaluate_query, Evaluation, GroupResolver, NoGroups};
pub use expression::{
    lowercase_query, FieldComparison, GlobPattern, GlobPiece, GlobTerm, GroupReference,
    LogicalNode, LogicalOp, QueryAst, QueryId, QueryNode, RegexValue, Value,
};
pub use field::{Field, FieldType, Operator};
pub use glob::translate_glob;
pub use optimizer::optimize_query;
pub use parser::QueryParser;
pub(crate) use shorthand::is_group_name;
pub use path::{extension_of_name, normalize_extension, normalize_path_for_compare, path_string};
pub use score::{QueryStats, ValidationIssue, ValidationIssueKind};
pub use size::{SizeKeyword, SizeValue};
pub use text_match::{has_wildcards, wildcard_matches};
