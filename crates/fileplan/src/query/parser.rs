//! Advanced query parser and tokenizer.
//!
//! Precedence, loosest first: `XOR`, `OR` (`|`), `AND` (or juxtaposition),
//! `NOT` (`!`). Every error carries the byte offset of the offending token in
//! the text handed to [`QueryParser::parse`].

use crate::error::ParseError;
use crate::token::TokenSpan;

use super::date::DateSpec;
use super::expression::{GlobPattern, LogicalOp, QueryNode, RegexValue, Value};
use super::field::{Field, FieldType, Operator};
use super::glob::glob_term;
use super::path::{normalize_extension, normalize_path_for_compare};
use super::shorthand::{infer_comparison, parse_group_word};
use super::size::SizeValue;
use super::text_match::has_wildcards;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct QueryToken {
    kind: QueryTokenKind,
    position: usize,
    /// Offset of the token text in the input when the text is verbatim.
    content_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryTokenKind {
    Word(String),
    Phrase(String),
    Symbol(String),
    LParen,
    RParen,
    Pipe,
    Bang,
    And,
    Or,
    Not,
    Xor,
}

impl QueryTokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Word(word) => format!("'{word}'"),
            Self::Phrase(phrase) => format!("\"{phrase}\""),
            Self::Symbol(symbol) => format!("operator '{symbol}'"),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Pipe => "'|'".to_string(),
            Self::Bang => "'!'".to_string(),
            Self::And => "AND".to_string(),
            Self::Or => "OR".to_string(),
            Self::Not => "NOT".to_string(),
            Self::Xor => "XOR".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Query parser
// ---------------------------------------------------------------------------

pub struct QueryParser<'a> {
    tokens: Vec<QueryToken>,
    index: usize,
    spans: &'a [TokenSpan],
    input_len: usize,
}

impl<'a> QueryParser<'a> {
    /// Parses `input`. `spans` are the token expansions of the resolved
    /// expression `input` was taken from.
    pub fn parse(input: &str, spans: &'a [TokenSpan]) -> Result<QueryNode, ParseError> {
        let tokens = tokenize_query_input(input)?;
        if tokens.is_empty() {
            return Err(ParseError::syntax("empty expression", 0));
        }

        let mut parser = Self {
            tokens,
            index: 0,
            spans,
            input_len: input.len(),
        };
        let node = parser.parse_xor_expression()?;
        if let Some(token) = parser.peek() {
            return Err(ParseError::syntax(
                format!("unexpected {}", token.kind.describe()),
                token.position,
            ));
        }
        Ok(node)
    }

    fn parse_xor_expression(&mut self) -> Result<QueryNode, ParseError> {
        let mut parts = vec![self.parse_or_expression()?];
        while self.consume(&QueryTokenKind::Xor) {
            parts.push(self.parse_or_expression()?);
        }
        Ok(collapse(LogicalOp::Xor, parts))
    }

    fn parse_or_expression(&mut self) -> Result<QueryNode, ParseError> {
        let mut parts = vec![self.parse_and_expression()?];
        while self.consume(&QueryTokenKind::Or) || self.consume(&QueryTokenKind::Pipe) {
            parts.push(self.parse_and_expression()?);
        }
        Ok(collapse(LogicalOp::Or, parts))
    }

    fn parse_and_expression(&mut self) -> Result<QueryNode, ParseError> {
        let mut parts = vec![self.parse_not_expression()?];
        loop {
            if self.consume(&QueryTokenKind::And) || self.next_starts_operand() {
                parts.push(self.parse_not_expression()?);
                continue;
            }
            break;
        }
        Ok(collapse(LogicalOp::And, parts))
    }

    fn parse_not_expression(&mut self) -> Result<QueryNode, ParseError> {
        if self.consume(&QueryTokenKind::Not) || self.consume(&QueryTokenKind::Bang) {
            return Ok(QueryNode::not(self.parse_not_expression()?));
        }
        self.parse_primary_expression()
    }

    fn parse_primary_expression(&mut self) -> Result<QueryNode, ParseError> {
        let token = self.next().ok_or_else(|| {
            ParseError::syntax(
                "expected a term but reached end of expression",
                self.input_len,
            )
        })?;

        match &token.kind {
            QueryTokenKind::LParen => {
                let node = self.parse_xor_expression()?;
                if self.consume(&QueryTokenKind::RParen) {
                    return Ok(node);
                }
                let position = self
                    .peek()
                    .map(|token| token.position)
                    .unwrap_or(self.input_len);
                Err(ParseError::syntax("missing closing ')'", position))
            }
            QueryTokenKind::Phrase(phrase) => {
                let spans = if token.content_offset.is_some() {
                    self.spans
                } else {
                    &[]
                };
                let offset = token.content_offset.unwrap_or_default();
                Ok(QueryNode::Glob(glob_term(phrase, offset, spans)))
            }
            QueryTokenKind::Word(word) => self.parse_word(word, &token),
            QueryTokenKind::Symbol(symbol) => self.parse_bare_comparison(symbol, token.position),
            other => Err(ParseError::syntax(
                format!("expected a term, found {}", other.describe()),
                token.position,
            )),
        }
    }

    fn parse_word(&mut self, word: &str, token: &QueryToken) -> Result<QueryNode, ParseError> {
        if word.starts_with('@') {
            return parse_group_word(word, token.position);
        }

        if is_identifier(word) {
            if let Some(next) = self.peek() {
                let operator = match &next.kind {
                    QueryTokenKind::Symbol(symbol) => Some(OperatorToken::Symbol(symbol.clone())),
                    QueryTokenKind::Word(keyword) => {
                        Operator::from_keyword(keyword).map(OperatorToken::Keyword)
                    }
                    _ => None,
                };
                if let Some(operator) = operator {
                    let operator_position = next.position;
                    return self.parse_comparison(word, token.position, operator, operator_position);
                }
            }
        }

        if let Some(split) = word.find(':') {
            if let Some(field) = Field::lookup(&word[..split]) {
                let value_offset = token.content_offset.map(|offset| offset + split + 1);
                return self.parse_field_argument(
                    field,
                    &word[split + 1..],
                    token.position + split + 1,
                    value_offset,
                );
            }
        }

        let spans = if token.content_offset.is_some() {
            self.spans
        } else {
            &[]
        };
        Ok(QueryNode::Glob(glob_term(
            word,
            token.content_offset.unwrap_or_default(),
            spans,
        )))
    }

    fn parse_comparison(
        &mut self,
        field_name: &str,
        field_position: usize,
        operator: OperatorToken,
        operator_position: usize,
    ) -> Result<QueryNode, ParseError> {
        let field = Field::lookup(field_name).ok_or_else(|| ParseError::UnknownField {
            field: field_name.to_string(),
            position: field_position,
        })?;
        let operator = match operator {
            OperatorToken::Keyword(operator) => operator,
            OperatorToken::Symbol(symbol) => Operator::from_symbol(&symbol).ok_or_else(|| {
                ParseError::syntax(format!("invalid operator '{symbol}'"), operator_position)
            })?,
        };
        self.index += 1;
        check_operator(field, operator, operator_position)?;

        let value = self.next().ok_or_else(|| {
            ParseError::syntax(
                format!("expected a value after '{}'", operator.symbol()),
                self.input_len,
            )
        })?;
        let text = match &value.kind {
            QueryTokenKind::Word(text) | QueryTokenKind::Phrase(text) => text.clone(),
            other => {
                return Err(ParseError::syntax(
                    format!("expected a value, found {}", other.describe()),
                    value.position,
                ))
            }
        };
        self.build_comparison(field, operator, &text, value.position, value.content_offset)
    }

    /// `field:value`, where the value may start with a comparison symbol.
    fn parse_field_argument(
        &mut self,
        field: Field,
        argument: &str,
        position: usize,
        content_offset: Option<usize>,
    ) -> Result<QueryNode, ParseError> {
        let (symbol_len, explicit) = leading_symbol(argument);
        let value = &argument[symbol_len..];
        let value_position = position + symbol_len;
        if value.is_empty() {
            return Err(ParseError::syntax(
                format!("{}: requires a value", field.name()),
                value_position,
            ));
        }

        let operator = match explicit {
            Some(operator) => operator,
            None => match field.field_type() {
                FieldType::Text if has_wildcards(value) => Operator::Like,
                FieldType::Content => Operator::Contains,
                _ => Operator::Eq,
            },
        };
        check_operator(field, operator, position)?;

        if field == Field::Extension && operator == Operator::Eq && value.contains(';') {
            let extensions = value
                .split(';')
                .filter_map(normalize_extension)
                .map(|extension| QueryNode::compare(field, operator, Value::Text(extension)))
                .collect::<Vec<_>>();
            if extensions.is_empty() {
                return Err(ParseError::syntax(
                    "ext: requires non-empty extensions",
                    value_position,
                ));
            }
            return Ok(collapse(LogicalOp::Or, extensions));
        }

        self.build_comparison(
            field,
            operator,
            value,
            value_position,
            content_offset.map(|offset| offset + symbol_len),
        )
    }

    /// `> 10MB` with no field: the field is inferred from the literal.
    fn parse_bare_comparison(
        &mut self,
        symbol: &str,
        position: usize,
    ) -> Result<QueryNode, ParseError> {
        let operator = Operator::from_symbol(symbol)
            .filter(|operator| {
                matches!(
                    operator,
                    Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
                )
            })
            .ok_or_else(|| ParseError::syntax(format!("invalid operator '{symbol}'"), position))?;
        let value = self.next().ok_or_else(|| {
            ParseError::syntax(
                format!("expected a value after '{symbol}'"),
                self.input_len,
            )
        })?;
        match &value.kind {
            QueryTokenKind::Word(text) => infer_comparison(operator, text, value.position),
            other => Err(ParseError::syntax(
                format!("expected a value, found {}", other.describe()),
                value.position,
            )),
        }
    }

    fn build_comparison(
        &self,
        field: Field,
        operator: Operator,
        text: &str,
        position: usize,
        content_offset: Option<usize>,
    ) -> Result<QueryNode, ParseError> {
        let value = match field.field_type() {
            FieldType::Text => self.text_value(field, operator, text, position, content_offset)?,
            FieldType::Integer => {
                let size = SizeValue::parse(text).map_err(|message| {
                    ParseError::syntax(format!("invalid size literal: {message}"), position)
                })?;
                if size.is_keyword() && !matches!(operator, Operator::Eq | Operator::Ne) {
                    return Err(ParseError::syntax(
                        "size keywords cannot be used with comparison operators",
                        position,
                    ));
                }
                Value::Size(size)
            }
            FieldType::DateTime => Value::Date(DateSpec::parse(text).ok_or_else(|| {
                ParseError::syntax(format!("invalid date literal {text:?}"), position)
            })?),
            FieldType::Boolean => Value::Bool(parse_bool(text).ok_or_else(|| {
                ParseError::syntax(format!("invalid boolean literal {text:?}"), position)
            })?),
            FieldType::Content => match operator {
                Operator::Matches => Value::Regex(compile_regex(text, position)?),
                _ if text.is_empty() => {
                    return Err(ParseError::syntax("content: requires a search value", position))
                }
                _ => Value::Text(text.to_string()),
            },
        };
        Ok(QueryNode::compare(field, operator, value))
    }

    fn text_value(
        &self,
        field: Field,
        operator: Operator,
        text: &str,
        position: usize,
        content_offset: Option<usize>,
    ) -> Result<Value, ParseError> {
        if operator == Operator::Matches {
            return compile_regex(text, position).map(Value::Regex);
        }

        let normalized = match field {
            Field::Extension => text.trim_start_matches('.').to_ascii_lowercase(),
            Field::Path | Field::Parent => normalize_path_for_compare(text),
            _ => text.to_string(),
        };
        if normalized.is_empty() {
            return Err(ParseError::syntax(
                format!("{}: requires a value", field.name()),
                position,
            ));
        }

        let verbatim = content_offset.filter(|_| normalized == text);
        let pattern = match verbatim {
            Some(offset) => GlobPattern::from_resolved(text, offset, self.spans),
            None => GlobPattern::literal(normalized.clone()),
        };
        Ok(match operator {
            Operator::Like => Value::Pattern(pattern),
            Operator::Eq | Operator::Ne if pattern.is_dynamic() => Value::Pattern(pattern),
            _ => Value::Text(normalized),
        })
    }

    fn next_starts_operand(&self) -> bool {
        matches!(
            self.peek().map(|token| &token.kind),
            Some(
                QueryTokenKind::Word(_)
                    | QueryTokenKind::Phrase(_)
                    | QueryTokenKind::Symbol(_)
                    | QueryTokenKind::LParen
                    | QueryTokenKind::Bang
                    | QueryTokenKind::Not
            )
        )
    }

    fn consume(&mut self, kind: &QueryTokenKind) -> bool {
        if matches!(self.peek(), Some(token) if &token.kind == kind) {
            self.index += 1;
            return true;
        }
        false
    }

    fn peek(&self) -> Option<&QueryToken> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<QueryToken> {
        let token = self.tokens.get(self.index).cloned()?;
        self.index += 1;
        Some(token)
    }
}

enum OperatorToken {
    Symbol(String),
    Keyword(Operator),
}

fn collapse(op: LogicalOp, mut parts: Vec<QueryNode>) -> QueryNode {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        QueryNode::logical(op, parts)
    }
}

fn check_operator(field: Field, operator: Operator, position: usize) -> Result<(), ParseError> {
    if operator.supports(field.field_type()) {
        Ok(())
    } else {
        Err(ParseError::TypeMismatch {
            field: field.name().to_string(),
            operator: operator.symbol().to_string(),
            position,
        })
    }
}

fn compile_regex(source: &str, position: usize) -> Result<RegexValue, ParseError> {
    RegexValue::new(source, false)
        .map_err(|error| ParseError::syntax(format!("invalid regex: {error}"), position))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(ch) if ch.is_ascii_alphabetic() || ch == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Length and operator of a comparison symbol at the start of `raw`.
fn leading_symbol(raw: &str) -> (usize, Option<Operator>) {
    for symbol in ["<=", ">=", "!=", "==", "<", ">", "="] {
        if raw.starts_with(symbol) {
            return (symbol.len(), Operator::from_symbol(symbol));
        }
    }
    (0, None)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn is_operator_char(ch: char) -> bool {
    matches!(ch, '<' | '>' | '=' | '!')
}

fn tokenize_query_input(input: &str) -> Result<Vec<QueryToken>, ParseError> {
    let mut tokens = Vec::new();
    let mut cursor = 0usize;

    while let Some(ch) = input[cursor..].chars().next() {
        if ch.is_whitespace() {
            cursor += ch.len_utf8();
            continue;
        }

        let position = cursor;
        let simple = match ch {
            '(' => Some(QueryTokenKind::LParen),
            ')' => Some(QueryTokenKind::RParen),
            '|' => Some(QueryTokenKind::Pipe),
            _ => None,
        };
        if let Some(kind) = simple {
            tokens.push(QueryToken {
                kind,
                position,
                content_offset: None,
            });
            cursor += 1;
            continue;
        }

        if ch == '"' {
            let (phrase, next_cursor, verbatim) = consume_quoted_phrase(input, cursor)?;
            tokens.push(QueryToken {
                kind: QueryTokenKind::Phrase(phrase),
                position,
                content_offset: verbatim.then_some(position + 1),
            });
            cursor = next_cursor;
            continue;
        }

        if is_operator_char(ch) {
            let end = input[cursor..]
                .char_indices()
                .find(|(_, next)| !is_operator_char(*next))
                .map(|(index, _)| cursor + index)
                .unwrap_or(input.len());
            let run = &input[cursor..end];
            let kind = if run == "!" {
                QueryTokenKind::Bang
            } else {
                QueryTokenKind::Symbol(run.to_string())
            };
            tokens.push(QueryToken {
                kind,
                position,
                content_offset: None,
            });
            cursor = end;
            continue;
        }

        let (word, next_cursor, verbatim) = consume_word(input, cursor)?;
        let kind = if word.eq_ignore_ascii_case("and") {
            QueryTokenKind::And
        } else if word.eq_ignore_ascii_case("or") {
            QueryTokenKind::Or
        } else if word.eq_ignore_ascii_case("not") {
            QueryTokenKind::Not
        } else if word.eq_ignore_ascii_case("xor") {
            QueryTokenKind::Xor
        } else {
            QueryTokenKind::Word(word)
        };
        tokens.push(QueryToken {
            kind,
            position,
            content_offset: verbatim.then_some(position),
        });
        cursor = next_cursor;
    }

    Ok(tokens)
}

/// Reads a bare word. After a `field:` prefix, comparison symbols belong to
/// the word and a quoted value is folded into it.
fn consume_word(input: &str, start: usize) -> Result<(String, usize, bool), ParseError> {
    let mut word = String::new();
    let mut cursor = start;
    let mut seen_colon = false;
    let mut verbatim = true;

    while let Some(next) = input[cursor..].chars().next() {
        if next.is_whitespace() || matches!(next, '(' | ')' | '|') {
            break;
        }
        if !seen_colon && is_operator_char(next) {
            break;
        }
        if seen_colon && next == '"' && word.ends_with(':') {
            let (phrase, next_cursor, _) = consume_quoted_phrase(input, cursor)?;
            word.push_str(&phrase);
            cursor = next_cursor;
            verbatim = false;
            break;
        }
        if next == ':' {
            seen_colon = true;
        }
        word.push(next);
        cursor += next.len_utf8();
    }

    Ok((word, cursor, verbatim))
}

/// Returns the unescaped phrase, the offset after the closing quote, and
/// whether the phrase is byte-identical to its source.
fn consume_quoted_phrase(input: &str, start: usize) -> Result<(String, usize, bool), ParseError> {
    let mut cursor = start + 1;
    let mut phrase = String::new();
    let mut escaped = false;
    let mut verbatim = true;

    while let Some(ch) = input[cursor..].chars().next() {
        cursor += ch.len_utf8();

        if escaped {
            phrase.push(ch);
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            verbatim = false;
            continue;
        }
        if ch == '"' {
            return Ok((phrase, cursor, verbatim));
        }

        phrase.push(ch);
    }

    Err(ParseError::syntax("missing closing quote", start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expression::{FieldComparison, LogicalNode};

    fn parse(input: &str) -> QueryNode {
        QueryParser::parse(input, &[]).expect("parse")
    }

    fn parse_err(input: &str) -> ParseError {
        QueryParser::parse(input, &[]).expect_err("should fail")
    }

    fn children(node: &QueryNode, expected: LogicalOp) -> &[QueryNode] {
        match node {
            QueryNode::Logical(LogicalNode { op, children }) if *op == expected => children,
            other => panic!("expected {expected:?}, got {other}"),
        }
    }

    #[test]
    fn glob_and_size_comparison() {
        let node = parse("*.jpg AND size > 10MB");
        let parts = children(&node, LogicalOp::And);
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], QueryNode::Glob(glob) if glob.raw_glob == "*.jpg"));
        assert_eq!(
            parts[1],
            QueryNode::compare(
                Field::Size,
                Operator::Gt,
                Value::Size(SizeValue::Bytes(10 * 1024 * 1024))
            )
        );
    }

    #[test]
    fn precedence_not_and_or_xor() {
        // a XOR (b OR (c AND (NOT d)))
        let node = parse("a XOR b OR c AND NOT d");
        let xor = children(&node, LogicalOp::Xor);
        assert_eq!(xor.len(), 2);
        let or = children(&xor[1], LogicalOp::Or);
        let and = children(&or[1], LogicalOp::And);
        let not = children(&and[1], LogicalOp::Not);
        assert!(matches!(&not[0], QueryNode::Glob(glob) if glob.raw_glob == "d"));
    }

    #[test]
    fn parentheses_override_precedence() {
        let node = parse("(a OR b) AND c");
        let and = children(&node, LogicalOp::And);
        assert_eq!(children(&and[0], LogicalOp::Or).len(), 2);
    }

    #[test]
    fn juxtaposition_is_implicit_and() {
        let node = parse("report !draft | summary");
        let or = children(&node, LogicalOp::Or);
        let and = children(&or[0], LogicalOp::And);
        assert_eq!(and.len(), 2);
        children(&and[1], LogicalOp::Not);
    }

    #[test]
    fn keyword_operators() {
        let node = parse("name STARTSWITH \"IMG_\" and content CONTAINS invoice");
        let and = children(&node, LogicalOp::And);
        assert_eq!(
            and[0],
            QueryNode::compare(Field::Name, Operator::StartsWith, Value::Text("IMG_".into()))
        );
        assert_eq!(
            and[1],
            QueryNode::compare(Field::Content, Operator::Contains, Value::Text("invoice".into()))
        );
    }

    #[test]
    fn colon_arguments() {
        assert_eq!(
            parse("ext:.PDF"),
            QueryNode::compare(Field::Extension, Operator::Eq, Value::Text("pdf".into()))
        );
        assert_eq!(
            parse("size:>=1k"),
            QueryNode::compare(Field::Size, Operator::Gte, Value::Size(SizeValue::Bytes(1024)))
        );
        assert_eq!(
            parse("name:\"my report*\""),
            QueryNode::compare(
                Field::Name,
                Operator::Like,
                Value::Pattern(GlobPattern::literal("my report*"))
            )
        );
        let node = parse("ext:jpg;png");
        assert_eq!(children(&node, LogicalOp::Or).len(), 2);
    }

    #[test]
    fn bare_comparisons_infer_their_field() {
        let node = parse("*.log AND >1MB");
        let and = children(&node, LogicalOp::And);
        assert!(matches!(
            &and[1],
            QueryNode::Comparison(FieldComparison {
                field: Field::Size,
                operator: Operator::Gt,
                ..
            })
        ));
    }

    #[test]
    fn double_angle_is_a_syntax_error_at_its_offset() {
        let error = parse_err("size >> 10MB");
        assert!(matches!(error, ParseError::Syntax { position: 5, .. }));
    }

    #[test]
    fn unknown_field_reports_offset() {
        let error = parse_err("*.txt AND colour = red");
        assert_eq!(
            error,
            ParseError::UnknownField {
                field: "colour".to_string(),
                position: 10,
            }
        );
    }

    #[test]
    fn type_mismatch_reports_operator_offset() {
        let error = parse_err("size CONTAINS 5");
        assert_eq!(
            error,
            ParseError::TypeMismatch {
                field: "size".to_string(),
                operator: "CONTAINS".to_string(),
                position: 5,
            }
        );
        assert!(matches!(
            parse_err("name > 5"),
            ParseError::TypeMismatch { position: 5, .. }
        ));
    }

    #[test]
    fn malformed_literals_fail() {
        assert!(matches!(
            parse_err("size > lots"),
            ParseError::Syntax { position: 7, .. }
        ));
        assert!(matches!(
            parse_err("modified < someday"),
            ParseError::Syntax { position: 11, .. }
        ));
        assert!(matches!(
            parse_err("name MATCHES \"(\""),
            ParseError::Syntax { position: 13, .. }
        ));
        assert!(matches!(
            parse_err("size > large"),
            ParseError::Syntax { .. }
        ));
    }

    #[test]
    fn unbalanced_parentheses() {
        assert!(matches!(
            parse_err("(a OR b"),
            ParseError::Syntax { position: 7, .. }
        ));
        assert!(matches!(
            parse_err("a OR b)"),
            ParseError::Syntax { position: 6, .. }
        ));
        assert!(matches!(
            parse_err("a AND"),
            ParseError::Syntax { position: 5, .. }
        ));
    }

    #[test]
    fn unterminated_quote() {
        assert!(matches!(
            parse_err("name = \"abc"),
            ParseError::Syntax { position: 7, .. }
        ));
    }

    #[test]
    fn group_references() {
        let node = parse("@photos OR @videos");
        let or = children(&node, LogicalOp::Or);
        assert_eq!(or[0], QueryNode::group("photos"));
        assert_eq!(or[1], QueryNode::group("videos"));
    }
}
