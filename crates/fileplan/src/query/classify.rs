//! Input classification and the parse pipeline.
//!
//! An expression is resolved for tokens, classified (advanced query,
//! shorthand, enhanced glob, simple glob; first match wins), parsed into a
//! tree, scored, lowercased for case-insensitive matching, optimized, and
//! wrapped in an immutable [`QueryAst`].

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::token::{ResolvedExpression, TokenContext, TokenResolver};

use super::expression::{lowercase_query, QueryAst, QueryNode};
use super::field::{Field, Operator};
use super::glob::translate_glob;
use super::optimizer::optimize_query;
use super::parser::QueryParser;
use super::score::{validation_issues, QueryStats, ValidationIssue};
use super::shorthand::{is_shorthand, parse_shorthand, split_words};

/// Syntactic form of a user expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputForm {
    SimpleGlob,
    EnhancedGlob,
    Shorthand,
    AdvancedQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternComplexity {
    Simple,
    Enhanced,
    Advanced,
    Composite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    pub case_sensitive: bool,
    pub max_query_nodes: usize,
    pub performance_warning_score: u8,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            max_query_nodes: 256,
            performance_warning_score: 8,
        }
    }
}

/// A successfully parsed expression.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub expression: String,
    pub resolved: ResolvedExpression,
    pub form: InputForm,
    pub complexity: PatternComplexity,
    pub score: u8,
    pub issues: Vec<ValidationIssue>,
    pub ast: QueryAst,
}

impl ParsedQuery {
    pub fn has_warnings(&self) -> bool {
        !self.issues.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct IntelligentParser {
    options: ParserOptions,
    tokens: TokenResolver,
}

impl IntelligentParser {
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            tokens: TokenResolver::new(),
        }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Resolves tokens in `expression` against `context` and parses the
    /// result. Error offsets refer to `expression`.
    pub fn parse(
        &self,
        expression: &str,
        context: &TokenContext,
    ) -> Result<ParsedQuery, ParseError> {
        let resolved = self.tokens.resolve(expression, context)?;
        self.parse_resolved(expression, resolved)
    }

    pub fn parse_resolved(
        &self,
        expression: &str,
        resolved: ResolvedExpression,
    ) -> Result<ParsedQuery, ParseError> {
        let text = resolved.text.as_str();
        if text.trim().is_empty() {
            return Err(ParseError::syntax("empty expression", 0));
        }

        let form = classify(text, resolved.has_tokens());
        let root = match form {
            InputForm::AdvancedQuery => QueryParser::parse(text, &resolved.spans),
            InputForm::Shorthand => parse_shorthand(text),
            InputForm::SimpleGlob | InputForm::EnhancedGlob => {
                let trimmed = text.trim();
                let offset = text.len() - text.trim_start().len();
                Ok(QueryNode::Comparison(translate_glob(
                    trimmed,
                    offset,
                    &resolved.spans,
                )))
            }
        }
        .map_err(|error| remap_position(error, &resolved))?;

        let stats = QueryStats::of(&root);
        let score = stats.score();
        let issues = validation_issues(
            &stats,
            score,
            self.options.performance_warning_score,
            self.options.max_query_nodes,
        );
        let complexity = if stats.group_refs > 0 {
            PatternComplexity::Composite
        } else {
            match form {
                InputForm::AdvancedQuery => PatternComplexity::Advanced,
                InputForm::EnhancedGlob | InputForm::Shorthand => PatternComplexity::Enhanced,
                InputForm::SimpleGlob => PatternComplexity::Simple,
            }
        };

        let case_sensitive = self.options.case_sensitive;
        let root = if case_sensitive {
            root
        } else {
            lowercase_query(root)
        };
        let ast = QueryAst::new(optimize_query(root), case_sensitive);

        Ok(ParsedQuery {
            expression: expression.to_string(),
            resolved,
            form,
            complexity,
            score,
            issues,
            ast,
        })
    }
}

/// Classifies resolved text; the first matching form wins.
pub fn classify(text: &str, has_tokens: bool) -> InputForm {
    if looks_advanced(text) {
        InputForm::AdvancedQuery
    } else if is_shorthand(text) {
        InputForm::Shorthand
    } else if has_tokens {
        InputForm::EnhancedGlob
    } else {
        InputForm::SimpleGlob
    }
}

fn looks_advanced(text: &str) -> bool {
    let has_keyword = split_words(text).into_iter().any(|(_, word)| {
        let word = word.trim_matches(|ch| ch == '(' || ch == ')');
        let word = word.trim_start_matches('!');
        word == "|"
            || ["and", "or", "not", "xor"]
                .iter()
                .any(|keyword| word.eq_ignore_ascii_case(keyword))
    });
    has_keyword || has_field_operator(text)
}

/// True when a known field name at a word start is followed by `:`, a
/// comparison symbol, or an operator keyword.
fn has_field_operator(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut index = 0usize;
    while index < bytes.len() {
        let at_word_start = index == 0 || {
            let previous = bytes[index - 1];
            previous.is_ascii_whitespace() || previous == b'(' || previous == b'!'
        };
        let first = bytes[index];
        if !at_word_start || !(first.is_ascii_alphabetic() || first == b'_') {
            index += 1;
            continue;
        }

        let end = text[index..]
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .map(|offset| index + offset)
            .unwrap_or(text.len());
        if Field::lookup(&text[index..end]).is_some() && operator_follows(&text[end..]) {
            return true;
        }
        index = end.max(index + 1);
    }
    false
}

fn operator_follows(rest: &str) -> bool {
    if rest.starts_with(':') {
        return true;
    }
    let trimmed = rest.trim_start();
    if trimmed.starts_with(['=', '<', '>']) || trimmed.starts_with("!=") {
        return true;
    }
    if trimmed.len() == rest.len() {
        return false;
    }
    let keyword = trimmed.split_whitespace().next().unwrap_or_default();
    Operator::from_keyword(keyword).is_some()
}

fn remap_position(error: ParseError, resolved: &ResolvedExpression) -> ParseError {
    match error {
        ParseError::Syntax { message, position } => ParseError::Syntax {
            message,
            position: resolved.source_offset(position),
        },
        ParseError::UnknownField { field, position } => ParseError::UnknownField {
            field,
            position: resolved.source_offset(position),
        },
        ParseError::TypeMismatch {
            field,
            operator,
            position,
        } => ParseError::TypeMismatch {
            field,
            operator,
            position: resolved.source_offset(position),
        },
        token @ ParseError::Token(_) => token,
    }
}
