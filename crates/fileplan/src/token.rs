//! Expansion of `$TOKEN` markers in raw expressions.
//!
//! Tokens are replaced by literal text before classification. Tokens whose
//! value depends on the clock are also reported as dynamic [`TokenSpan`]s so the
//! parser can keep them dynamic and re-render them against the `now` of each
//! match run.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::TokenResolutionError;

/// Values tokens resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenContext {
    pub now: NaiveDateTime,
    pub user: String,
    pub host: String,
    pub workdir: PathBuf,
}

impl TokenContext {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now,
            user: String::new(),
            host: String::new(),
            workdir: PathBuf::new(),
        }
    }

    /// Captures the current clock, user, host and working directory.
    pub fn capture() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        let host = hostname::get()
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default();
        let workdir = std::env::current_dir().unwrap_or_default();
        Self {
            now: Local::now().naive_local(),
            user,
            host,
            workdir,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }
}

/// A clock-dependent token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicToken {
    Date,
    Time,
    DateTime,
    Year,
    ShortYear,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Weekday,
}

impl DynamicToken {
    pub fn render(self, now: &NaiveDateTime) -> String {
        match self {
            Self::Date => now.format("%Y-%m-%d").to_string(),
            Self::Time => now.format("%H-%M-%S").to_string(),
            Self::DateTime => now.format("%Y-%m-%d_%H-%M-%S").to_string(),
            Self::Year => format!("{:04}", now.year()),
            Self::ShortYear => format!("{:02}", now.year().rem_euclid(100)),
            Self::Month => format!("{:02}", now.month()),
            Self::Day => format!("{:02}", now.day()),
            Self::Hour => format!("{:02}", now.hour()),
            Self::Minute => format!("{:02}", now.minute()),
            Self::Second => format!("{:02}", now.second()),
            Self::Weekday => now.format("%A").to_string(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime => "DATETIME",
            Self::Year => "YYYY",
            Self::ShortYear => "YY",
            Self::Month => "MM",
            Self::Day => "DD",
            Self::Hour => "HH",
            Self::Minute => "MIN",
            Self::Second => "SS",
            Self::Weekday => "WEEKDAY",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TokenKind {
    Dynamic(DynamicToken),
    User,
    Host,
    Workdir,
}

fn lookup_token(name: &str) -> Option<TokenKind> {
    let kind = match name.to_ascii_uppercase().as_str() {
        "DATE" => TokenKind::Dynamic(DynamicToken::Date),
        "TIME" => TokenKind::Dynamic(DynamicToken::Time),
        "DATETIME" => TokenKind::Dynamic(DynamicToken::DateTime),
        "YYYY" => TokenKind::Dynamic(DynamicToken::Year),
        "YY" => TokenKind::Dynamic(DynamicToken::ShortYear),
        "MM" => TokenKind::Dynamic(DynamicToken::Month),
        "DD" => TokenKind::Dynamic(DynamicToken::Day),
        "HH" => TokenKind::Dynamic(DynamicToken::Hour),
        "MIN" => TokenKind::Dynamic(DynamicToken::Minute),
        "SS" => TokenKind::Dynamic(DynamicToken::Second),
        "WEEKDAY" => TokenKind::Dynamic(DynamicToken::Weekday),
        "USER" => TokenKind::User,
        "HOSTNAME" | "HOST" => TokenKind::Host,
        "WORKDIR" | "CWD" => TokenKind::Workdir,
        _ => return None,
    };
    Some(kind)
}

/// One expanded token: its byte range in the resolved text and in the raw
/// expression. `token` is set for clock-dependent tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub token: Option<DynamicToken>,
    pub start: usize,
    pub end: usize,
    pub source_start: usize,
    pub source_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExpression {
    /// Expression with every token replaced by its literal value.
    pub text: String,
    pub spans: Vec<TokenSpan>,
}

impl ResolvedExpression {
    /// Wraps an expression that is known to contain no tokens.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
        }
    }

    pub fn has_tokens(&self) -> bool {
        !self.spans.is_empty()
    }

    pub fn dynamic_spans(&self) -> impl Iterator<Item = &TokenSpan> {
        self.spans.iter().filter(|span| span.token.is_some())
    }

    /// Maps a byte offset in the resolved text back to the raw expression.
    /// Offsets inside an expansion map to the start of its token.
    pub fn source_offset(&self, resolved: usize) -> usize {
        let mut delta = 0isize;
        for span in &self.spans {
            if resolved < span.start {
                break;
            }
            if resolved < span.end {
                return span.source_start;
            }
            delta = span.source_end as isize - span.end as isize;
        }
        (resolved as isize + delta).max(0) as usize
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokenResolver;

impl TokenResolver {
    pub fn new() -> Self {
        Self
    }

    /// Expands every token in `expression`. Fails on the first unknown or
    /// malformed token; on success no `$` remains in the output.
    pub fn resolve(
        &self,
        expression: &str,
        context: &TokenContext,
    ) -> Result<ResolvedExpression, TokenResolutionError> {
        let mut text = String::with_capacity(expression.len());
        let mut spans = Vec::new();
        let mut cursor = 0usize;

        while let Some(offset) = expression[cursor..].find('$') {
            let position = cursor + offset;
            text.push_str(&expression[cursor..position]);

            let (name, next_cursor) = read_token_name(expression, position)?;
            let kind = lookup_token(name).ok_or_else(|| TokenResolutionError::UnknownToken {
                token: name.to_string(),
                position,
            })?;

            let start = text.len();
            let token = match kind {
                TokenKind::Dynamic(token) => {
                    text.push_str(&token.render(&context.now));
                    Some(token)
                }
                TokenKind::User => {
                    text.push_str(&context.user);
                    None
                }
                TokenKind::Host => {
                    text.push_str(&context.host);
                    None
                }
                TokenKind::Workdir => {
                    text.push_str(&workdir_name(&context.workdir));
                    None
                }
            };
            spans.push(TokenSpan {
                token,
                start,
                end: text.len(),
                source_start: position,
                source_end: next_cursor,
            });
            cursor = next_cursor;
        }
        text.push_str(&expression[cursor..]);

        Ok(ResolvedExpression { text, spans })
    }
}

/// Reads the name after the `$` at `position`, returning it and the byte
/// offset just past the token.
fn read_token_name(
    expression: &str,
    position: usize,
) -> Result<(&str, usize), TokenResolutionError> {
    let rest = &expression[position + 1..];

    if let Some(braced) = rest.strip_prefix('{') {
        let close = braced
            .find('}')
            .ok_or_else(|| TokenResolutionError::MalformedToken {
                position,
                reason: "missing closing '}'".to_string(),
            })?;
        let name = braced[..close].trim();
        if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(TokenResolutionError::MalformedToken {
                position,
                reason: format!("invalid token name {name:?}"),
            });
        }
        return Ok((name, position + 2 + close + 1));
    }

    let length = rest
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_alphabetic())
        .map(|(index, _)| index)
        .unwrap_or(rest.len());
    if length == 0 {
        return Err(TokenResolutionError::MalformedToken {
            position,
            reason: "'$' must be followed by a token name".to_string(),
        });
    }
    Ok((&rest[..length], position + 1 + length))
}

fn workdir_name(workdir: &Path) -> String {
    workdir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
