//! Structured engine events and the sinks that receive them.
//!
//! The engine never formats or routes logs itself. It hands [`EngineEvent`]s
//! to an injected [`EventSink`]; the default sink forwards them to `tracing`
//! with structured fields.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::conflict::{ConflictType, ResolutionStrategy, Severity};
use crate::query::PatternComplexity;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PatternParsed {
        expression: String,
        complexity: PatternComplexity,
        score: u8,
        warnings: usize,
    },
    MatchExecuted {
        pattern: String,
        duration: Duration,
        count: usize,
        scanned: usize,
        skipped: usize,
        cancelled: bool,
    },
    RecordSkipped {
        path: String,
        reason: String,
    },
    ConflictDetected {
        conflict_type: ConflictType,
        severity: Severity,
        target: String,
    },
    ConflictResolved {
        strategy: ResolutionStrategy,
        success: bool,
        conflict_id: String,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PatternParsed { .. } => "pattern_parsed",
            Self::MatchExecuted { .. } => "match_executed",
            Self::RecordSkipped { .. } => "record_skipped",
            Self::ConflictDetected { .. } => "conflict_detected",
            Self::ConflictResolved { .. } => "conflict_resolved",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EngineEvent);
}

pub type SharedEventSink = Arc<dyn EventSink>;

/// Forwards events to `tracing`; installing a subscriber is the host's job.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &EngineEvent) {
        match event {
            EngineEvent::PatternParsed {
                expression,
                complexity,
                score,
                warnings,
            } => {
                tracing::debug!(
                    event = event.name(),
                    expression = %expression,
                    complexity = ?complexity,
                    score,
                    warnings,
                    "pattern parsed"
                );
            }
            EngineEvent::MatchExecuted {
                pattern,
                duration,
                count,
                scanned,
                skipped,
                cancelled,
            } => {
                tracing::info!(
                    event = event.name(),
                    pattern = %pattern,
                    duration_ms = duration.as_millis() as u64,
                    count,
                    scanned,
                    skipped,
                    cancelled,
                    "match executed"
                );
            }
            EngineEvent::RecordSkipped { path, reason } => {
                tracing::warn!(
                    event = event.name(),
                    path = %path,
                    reason = %reason,
                    "record skipped"
                );
            }
            EngineEvent::ConflictDetected {
                conflict_type,
                severity,
                target,
            } => {
                tracing::info!(
                    event = event.name(),
                    conflict_type = %conflict_type,
                    severity = %severity,
                    target = %target,
                    "conflict detected"
                );
            }
            EngineEvent::ConflictResolved {
                strategy,
                success,
                conflict_id,
            } => {
                if *success {
                    tracing::info!(
                        event = event.name(),
                        strategy = %strategy,
                        success,
                        conflict_id = %conflict_id,
                        "conflict resolved"
                    );
                } else {
                    tracing::warn!(
                        event = event.name(),
                        strategy = %strategy,
                        success,
                        conflict_id = %conflict_id,
                        "conflict left unresolved"
                    );
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &EngineEvent) {}
}

/// Keeps every event in memory, mostly for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &EngineEvent) {
        self.events.lock().push(event.clone());
    }
}
