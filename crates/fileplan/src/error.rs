use std::path::PathBuf;

use crate::conflict::{ConflictType, ResolutionStrategy};

/// A `$TOKEN` in a raw expression could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenResolutionError {
    #[error("unknown token ${token} at byte {position}")]
    UnknownToken { token: String, position: usize },

    #[error("malformed token at byte {position}: {reason}")]
    MalformedToken { position: usize, reason: String },
}

impl TokenResolutionError {
    pub fn position(&self) -> usize {
        match self {
            Self::UnknownToken { position, .. } | Self::MalformedToken { position, .. } => {
                *position
            }
        }
    }
}

/// An expression could not be compiled. No partial query is ever produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error at byte {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("unknown field '{field}' at byte {position}")]
    UnknownField { field: String, position: usize },

    #[error("operator '{operator}' cannot be applied to field '{field}' at byte {position}")]
    TypeMismatch {
        field: String,
        operator: String,
        position: usize,
    },

    #[error(transparent)]
    Token(#[from] TokenResolutionError),
}

impl ParseError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Byte offset of the offending token in the raw expression.
    pub fn position(&self) -> usize {
        match self {
            Self::Syntax { position, .. }
            | Self::UnknownField { position, .. }
            | Self::TypeMismatch { position, .. } => *position,
            Self::Token(error) => error.position(),
        }
    }
}

/// Raised for a single record during matching; the record is skipped.
#[derive(Debug, thiserror::Error)]
pub enum MatchEvaluationError {
    #[error("failed to read content of {path}: {source}")]
    ContentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown pattern group '@{group}'")]
    UnknownGroup { group: String },

    #[error("pattern group '@{group}' references itself")]
    GroupCycle { group: String },
}

/// Raised for a single conflict; the conflict is reported unresolved.
#[derive(
    Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize,
)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictResolutionError {
    #[error("{strategy} cannot resolve {conflict_type} conflicts: {reason}")]
    UnsupportedConflictType {
        strategy: ResolutionStrategy,
        conflict_type: ConflictType,
        reason: String,
    },

    #[error("no free destination for {} after {attempts} attempts", path.display())]
    ResolutionRetryExceeded { path: PathBuf, attempts: usize },

    #[error("{strategy} is not applicable: {reason}")]
    StrategyNotApplicable {
        strategy: ResolutionStrategy,
        reason: String,
    },

    #[error("prompt strategy requested but no prompt callback is configured")]
    PromptUnavailable,

    #[error("filesystem error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("resolution cancelled before any change was made")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for engine entry points.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("token error: {0}")]
    Token(#[from] TokenResolutionError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("conflict resolution error: {0}")]
    Resolution(#[from] ConflictResolutionError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
