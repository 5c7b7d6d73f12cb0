//! Query AST nodes and values.
//!
//! A compiled [`QueryAst`] is immutable and shared through an `Arc`; every
//! rewrite (optimization, lowercasing) builds a new tree. The canonical
//! `Display` rendering of a tree is hashed into its [`QueryId`], which is the
//! identity the result cache keys on.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::cache::{fnv1a_update, FNV_OFFSET_BASIS};
use crate::token::{DynamicToken, TokenSpan};

use super::date::DateSpec;
use super::field::{Field, Operator};
use super::size::SizeValue;

/// One piece of a glob whose text may depend on the match-time clock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GlobPiece {
    Literal(String),
    Dynamic(DynamicToken),
}

/// A `*`/`?` wildcard pattern, possibly containing clock-dependent tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobPattern {
    pieces: Vec<GlobPiece>,
}

impl GlobPattern {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            pieces: vec![GlobPiece::Literal(text.into())],
        }
    }

    /// Builds a pattern from `text`, a slice of the resolved expression that
    /// starts at byte `offset`. Dynamic token expansions fully inside the
    /// slice become [`GlobPiece::Dynamic`].
    pub fn from_resolved(text: &str, offset: usize, spans: &[TokenSpan]) -> Self {
        let end = offset + text.len();
        let mut pieces = Vec::new();
        let mut cursor = 0usize;

        for span in spans {
            let Some(token) = span.token else {
                continue;
            };
            if span.start < offset + cursor || span.end > end {
                continue;
            }
            let local_start = span.start - offset;
            if local_start > cursor {
                pieces.push(GlobPiece::Literal(text[cursor..local_start].to_string()));
            }
            pieces.push(GlobPiece::Dynamic(token));
            cursor = span.end - offset;
        }
        if cursor < text.len() || pieces.is_empty() {
            pieces.push(GlobPiece::Literal(text[cursor..].to_string()));
        }

        Self { pieces }
    }

    pub fn pieces(&self) -> &[GlobPiece] {
        &self.pieces
    }

    pub fn is_dynamic(&self) -> bool {
        self.pieces
            .iter()
            .any(|piece| matches!(piece, GlobPiece::Dynamic(_)))
    }

    /// Renders the pattern for a match run.
    pub fn render(&self, now: &NaiveDateTime, lowercase: bool) -> Cow<'_, str> {
        if let [GlobPiece::Literal(text)] = self.pieces.as_slice() {
            return Cow::Borrowed(text.as_str());
        }
        let mut rendered = String::new();
        for piece in &self.pieces {
            match piece {
                GlobPiece::Literal(text) => rendered.push_str(text),
                GlobPiece::Dynamic(token) => {
                    let value = token.render(now);
                    if lowercase {
                        rendered.push_str(&value.to_lowercase());
                    } else {
                        rendered.push_str(&value);
                    }
                }
            }
        }
        Cow::Owned(rendered)
    }

    /// Pattern text with dynamic pieces written as `${TOKEN}`.
    pub fn source(&self) -> String {
        let mut source = String::new();
        for piece in &self.pieces {
            match piece {
                GlobPiece::Literal(text) => source.push_str(text),
                GlobPiece::Dynamic(token) => {
                    source.push_str("${");
                    source.push_str(token.name());
                    source.push('}');
                }
            }
        }
        source
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        match self.pieces.first_mut() {
            Some(GlobPiece::Literal(text)) => text.insert_str(0, prefix),
            _ => self.pieces.insert(0, GlobPiece::Literal(prefix.to_string())),
        }
        self
    }

    fn to_lowercase(&self) -> Self {
        Self {
            pieces: self
                .pieces
                .iter()
                .map(|piece| match piece {
                    GlobPiece::Literal(text) => GlobPiece::Literal(text.to_lowercase()),
                    GlobPiece::Dynamic(token) => GlobPiece::Dynamic(*token),
                })
                .collect(),
        }
    }
}

/// A regex compiled at parse time. Compares by source text.
#[derive(Debug, Clone)]
pub struct RegexValue(Regex);

impl RegexValue {
    pub fn new(source: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        RegexBuilder::new(source)
            .case_insensitive(case_insensitive)
            .build()
            .map(Self)
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for RegexValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for RegexValue {}

/// Right-hand side of a [`FieldComparison`], typed by its field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Pattern(GlobPattern),
    Regex(RegexValue),
    Size(SizeValue),
    Date(DateSpec),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write_quoted(f, text),
            Self::Pattern(pattern) => write_quoted(f, &pattern.source()),
            Self::Regex(regex) => write_quoted(f, regex.as_str()),
            Self::Size(size) => write!(f, "{size}"),
            Self::Date(date) => write!(f, "{date}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{ch}")?;
    }
    f.write_str("\"")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldComparison {
    pub field: Field,
    pub operator: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
    Not,
    Xor,
}

impl LogicalOp {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Xor => "XOR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalNode {
    pub op: LogicalOp,
    pub children: Vec<QueryNode>,
}

/// A bare glob word inside an advanced query, kept with its translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobTerm {
    pub raw_glob: String,
    pub comparison: FieldComparison,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReference {
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Comparison(FieldComparison),
    Logical(LogicalNode),
    Glob(GlobTerm),
    Group(GroupReference),
}

impl QueryNode {
    pub fn compare(field: Field, operator: Operator, value: Value) -> Self {
        Self::Comparison(FieldComparison {
            field,
            operator,
            value,
        })
    }

    pub fn logical(op: LogicalOp, children: Vec<QueryNode>) -> Self {
        Self::Logical(LogicalNode { op, children })
    }

    pub fn not(child: QueryNode) -> Self {
        Self::logical(LogicalOp::Not, vec![child])
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        Self::Group(GroupReference {
            group_id: group_id.into(),
        })
    }

    /// Visits every node, parents before children.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a QueryNode)) {
        visit(self);
        if let Self::Logical(node) = self {
            for child in &node.children {
                child.walk(visit);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        let mut count = 0usize;
        self.walk(&mut |_| count += 1);
        count
    }

    /// The comparison a leaf evaluates, if it is one.
    pub fn leaf_comparison(&self) -> Option<&FieldComparison> {
        match self {
            Self::Comparison(comparison) => Some(comparison),
            Self::Glob(glob) => Some(&glob.comparison),
            Self::Logical(_) | Self::Group(_) => None,
        }
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison(comparison) => write!(
                f,
                "{} {} {}",
                comparison.field, comparison.operator, comparison.value
            ),
            Self::Glob(glob) => write_quoted(f, &glob.raw_glob),
            Self::Group(group) => write!(f, "@{}", group.group_id),
            Self::Logical(node) if node.op == LogicalOp::Not => match node.children.first() {
                Some(child) => write!(f, "NOT {child}"),
                None => f.write_str("NOT ()"),
            },
            Self::Logical(node) => {
                f.write_str("(")?;
                for (index, child) in node.children.iter().enumerate() {
                    if index > 0 {
                        write!(f, " {} ", node.op.keyword())?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Cache identity of a compiled tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(u64);

impl QueryId {
    pub fn of(root: &QueryNode, case_sensitive: bool) -> Self {
        let mut hash = FNV_OFFSET_BASIS;
        fnv1a_update(&mut hash, root.to_string().as_bytes());
        fnv1a_update(&mut hash, &[0xff, u8::from(case_sensitive)]);
        Self(hash)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A compiled, immutable query tree.
#[derive(Debug, Clone)]
pub struct QueryAst {
    root: Arc<QueryNode>,
    id: QueryId,
    case_sensitive: bool,
    time_dependent: bool,
    has_groups: bool,
}

impl QueryAst {
    pub fn new(root: QueryNode, case_sensitive: bool) -> Self {
        let id = QueryId::of(&root, case_sensitive);
        let mut time_dependent = false;
        let mut has_groups = false;
        root.walk(&mut |node| match node {
            QueryNode::Group(_) => has_groups = true,
            other => {
                if let Some(comparison) = other.leaf_comparison() {
                    time_dependent |= match &comparison.value {
                        Value::Pattern(pattern) => pattern.is_dynamic(),
                        Value::Date(date) => date.is_relative(),
                        _ => false,
                    };
                }
            }
        });
        Self {
            root: Arc::new(root),
            id,
            case_sensitive,
            time_dependent,
            has_groups,
        }
    }

    pub fn root(&self) -> &QueryNode {
        &self.root
    }

    pub fn shared_root(&self) -> Arc<QueryNode> {
        Arc::clone(&self.root)
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// True when results depend on the match-time clock.
    pub fn is_time_dependent(&self) -> bool {
        self.time_dependent
    }

    /// True when the tree references pattern groups.
    pub fn has_group_references(&self) -> bool {
        self.has_groups
    }

    /// True when both handles share one tree instance.
    pub fn same_instance(&self, other: &QueryAst) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }
}

impl PartialEq for QueryAst {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.root == other.root
    }
}

impl fmt::Display for QueryAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

/// Lowercases every textual operand for case-insensitive matching.
pub fn lowercase_query(node: QueryNode) -> QueryNode {
    match node {
        QueryNode::Comparison(comparison) => {
            QueryNode::Comparison(lowercase_comparison(comparison))
        }
        QueryNode::Glob(glob) => QueryNode::Glob(GlobTerm {
            raw_glob: glob.raw_glob,
            comparison: lowercase_comparison(glob.comparison),
        }),
        QueryNode::Logical(node) => QueryNode::Logical(LogicalNode {
            op: node.op,
            children: node.children.into_iter().map(lowercase_query).collect(),
        }),
        QueryNode::Group(group) => QueryNode::Group(group),
    }
}

fn lowercase_comparison(comparison: FieldComparison) -> FieldComparison {
    let value = match comparison.value {
        Value::Text(text) => Value::Text(text.to_lowercase()),
        Value::Pattern(pattern) => Value::Pattern(pattern.to_lowercase()),
        Value::Regex(regex) => match RegexValue::new(regex.as_str(), true) {
            Ok(insensitive) => Value::Regex(insensitive),
            Err(_) => Value::Regex(regex),
        },
        other => other,
    };
    FieldComparison { value, ..comparison }
}
