//! Pattern parsing, matching, and destination conflict resolution.
//!
//! This crate provides:
//! - `$TOKEN` expansion and classification of globs, shorthand and queries
//! - A typed query tree with scoring, optimization and lazy evaluation
//! - Compiled-query and match-result caches keyed by workspace fingerprint
//! - Conflict detection over proposed operations and pluggable resolution

pub mod cache;
pub mod cancel;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod events;
pub mod groups;
pub mod matcher;
pub mod pattern;
pub mod query;
pub mod records;
pub mod token;
pub mod types;

// Re-export main types
pub use cache::{CacheManager, CacheSettings, ResultKey, WorkspaceFingerprint};
pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use conflict::{
    BatchResolution, Conflict, ConflictDetector, ConflictResolver, ConflictScope, ConflictType,
    OperationPlan, ProposedOperation, ResolutionResult, ResolutionSettings, ResolutionStrategy,
    ScopeFilter, Severity,
};
pub use engine::{PatternEngine, PatternEngineBuilder, QueryMatches};
pub use error::{
    ConfigError, ConflictResolutionError, EngineError, MatchEvaluationError, ParseError, Result,
    TokenResolutionError,
};
pub use events::{EngineEvent, EventSink, MemoryEventSink, NullEventSink, TracingEventSink};
pub use groups::GroupRegistry;
pub use matcher::{
    MatchContext, MatchOptions, MatchResult, MatchStream, MatchSummary, UnifiedMatcher,
};
pub use pattern::{Pattern, PatternDocument};
pub use query::{IntelligentParser, ParsedQuery, ParserOptions, PatternComplexity, QueryAst};
pub use records::{bounded_records, RecordSnapshot, RecordSource};
pub use token::{TokenContext, TokenResolver};
pub use types::{FileRecord, PatternId, RuleId, RulesetId};
