//! Sigil shorthand: `@group`, `>10MB`, `<=today-7`, `.pdf;.docx`.

use crate::error::ParseError;

use super::date::DateSpec;
use super::expression::{LogicalOp, QueryNode, Value};
use super::field::{Field, Operator};
use super::path::normalize_extension;
use super::size::SizeValue;

/// Splits on whitespace, keeping byte offsets.
pub(crate) fn split_words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (index, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(begin) = start.take() {
                words.push((begin, &text[begin..index]));
            }
        } else if start.is_none() {
            start = Some(index);
        }
    }
    if let Some(begin) = start {
        words.push((begin, &text[begin..]));
    }
    words
}

/// True when every word is a well-formed shorthand part.
pub fn is_shorthand(text: &str) -> bool {
    let words = split_words(text);
    !words.is_empty() && words.iter().all(|(_, word)| is_shorthand_word(word))
}

fn is_shorthand_word(word: &str) -> bool {
    match word.as_bytes().first() {
        Some(b'@') | Some(b'>') | Some(b'<') => true,
        Some(b'.') => parse_extension_list(word).is_some(),
        _ => false,
    }
}

fn is_extension_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '+')
}

fn parse_extension_list(word: &str) -> Option<Vec<String>> {
    let mut extensions = Vec::new();
    for item in word.split(';') {
        if !item.starts_with('.') {
            return None;
        }
        let extension = normalize_extension(item)?;
        if !extension.chars().all(is_extension_char) {
            return None;
        }
        extensions.push(extension);
    }
    Some(extensions)
}

pub(crate) fn is_group_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.'))
}

/// Parses a group reference word (`@name`) found at `position`.
pub(crate) fn parse_group_word(word: &str, position: usize) -> Result<QueryNode, ParseError> {
    let name = &word[1..];
    if !is_group_name(name) {
        return Err(ParseError::syntax(
            format!("invalid group reference {word:?}"),
            position,
        ));
    }
    Ok(QueryNode::group(name))
}

/// Parses a shorthand expression. Parts are ANDed.
pub fn parse_shorthand(text: &str) -> Result<QueryNode, ParseError> {
    let words = split_words(text);
    if words.is_empty() {
        return Err(ParseError::syntax("empty expression", 0));
    }

    let mut parts = words
        .into_iter()
        .map(|(position, word)| parse_part(word, position))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        QueryNode::logical(LogicalOp::And, parts)
    })
}

fn parse_part(word: &str, position: usize) -> Result<QueryNode, ParseError> {
    match word.as_bytes().first() {
        Some(b'@') => parse_group_word(word, position),
        Some(b'>') | Some(b'<') => parse_comparison_part(word, position),
        Some(b'.') => {
            let extensions = parse_extension_list(word).ok_or_else(|| {
                ParseError::syntax(format!("invalid extension list {word:?}"), position)
            })?;
            let mut nodes = extensions
                .into_iter()
                .map(|extension| {
                    QueryNode::compare(Field::Extension, Operator::Eq, Value::Text(extension))
                })
                .collect::<Vec<_>>();
            Ok(if nodes.len() == 1 {
                nodes.remove(0)
            } else {
                QueryNode::logical(LogicalOp::Or, nodes)
            })
        }
        _ => Err(ParseError::syntax(
            format!("unexpected shorthand part {word:?}"),
            position,
        )),
    }
}

fn parse_comparison_part(word: &str, position: usize) -> Result<QueryNode, ParseError> {
    let (operator, symbol_len) = if word.starts_with(">=") {
        (Operator::Gte, 2)
    } else if word.starts_with("<=") {
        (Operator::Lte, 2)
    } else if word.starts_with('>') {
        (Operator::Gt, 1)
    } else {
        (Operator::Lt, 1)
    };
    let value_position = position + symbol_len;
    let raw = &word[symbol_len..];
    if raw.is_empty() {
        return Err(ParseError::syntax(
            format!("expected a value after '{}'", operator.symbol()),
            value_position,
        ));
    }
    if raw.starts_with(['<', '>', '=']) {
        return Err(ParseError::syntax(
            format!("invalid operator {:?}", &word[..symbol_len + 1]),
            position,
        ));
    }

    infer_comparison(operator, raw, value_position)
}

/// Builds `size <op> raw` when `raw` is a size literal, else
/// `modified <op> raw` when it is a date literal.
pub(crate) fn infer_comparison(
    operator: Operator,
    raw: &str,
    position: usize,
) -> Result<QueryNode, ParseError> {
    match SizeValue::parse(raw) {
        Ok(SizeValue::Keyword(_)) => {
            return Err(ParseError::syntax(
                "size keywords cannot be used with comparison operators",
                position,
            ))
        }
        Ok(size) => return Ok(QueryNode::compare(Field::Size, operator, Value::Size(size))),
        Err(_) => {}
    }
    if let Some(date) = DateSpec::parse(raw) {
        return Ok(QueryNode::compare(Field::Modified, operator, Value::Date(date)));
    }
    Err(ParseError::syntax(
        format!("expected a size or date literal, found {raw:?}"),
        position,
    ))
}
