//! Lazy evaluation of compiled queries over record streams.

use std::borrow::Borrow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::cancel::{CancellationToken, CANCEL_CHECK_INTERVAL};
use crate::error::MatchEvaluationError;
use crate::events::{EngineEvent, SharedEventSink, TracingEventSink};
use crate::query::{evaluate_query, Evaluation, GroupResolver, NoGroups, QueryAst};
use crate::records::{RecordIter, RecordSource};
use crate::types::{FileRecord, PatternId};

/// Outcome for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub pattern_id: Option<PatternId>,
    pub file_path: PathBuf,
    pub matched: bool,
    /// Always 1.0 for a boolean match and 0.0 for a miss.
    pub confidence: f32,
    pub matched_conditions: Vec<String>,
    pub target_location: Option<PathBuf>,
    pub execution_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Yield non-matching records too (with `matched == false`).
    pub include_misses: bool,
    /// When set, `target_location` is `target_dir/<file name>`.
    pub target_dir: Option<PathBuf>,
    pub cancel_check_interval: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            include_misses: false,
            target_dir: None,
            cancel_check_interval: CANCEL_CHECK_INTERVAL,
        }
    }
}

/// Per-run inputs: the clock dynamic patterns render against, and the
/// token that stops the scan.
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub now: NaiveDateTime,
    pub cancel: CancellationToken,
}

impl MatchContext {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now,
            cancel: CancellationToken::noop(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchSummary {
    pub scanned: usize,
    pub matched: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub duration: Duration,
}

#[derive(Clone)]
pub struct UnifiedMatcher {
    groups: Arc<dyn GroupResolver>,
    events: SharedEventSink,
    options: MatchOptions,
}

impl UnifiedMatcher {
    pub fn new(groups: Arc<dyn GroupResolver>, events: SharedEventSink) -> Self {
        Self {
            groups,
            events,
            options: MatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Evaluates `query` against one record.
    pub fn evaluate_record(
        &self,
        query: &QueryAst,
        record: &FileRecord,
        now: NaiveDateTime,
    ) -> Result<Evaluation, MatchEvaluationError> {
        evaluate_query(query, record, now, self.groups.as_ref())
    }

    /// Starts a lazy scan. Nothing is read from `records` until the stream
    /// is pulled.
    pub fn evaluate<I>(
        &self,
        query: &QueryAst,
        records: I,
        context: MatchContext,
    ) -> MatchStream<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: Borrow<FileRecord>,
    {
        MatchStream {
            query: query.clone(),
            records: records.into_iter(),
            groups: Arc::clone(&self.groups),
            events: Arc::clone(&self.events),
            options: self.options.clone(),
            context,
            pattern_id: None,
            started: Instant::now(),
            summary: MatchSummary::default(),
            finished: false,
        }
    }

    /// Starts a scan over `source` that can be restarted from the beginning.
    pub fn evaluate_source(
        &self,
        query: &QueryAst,
        source: Arc<dyn RecordSource>,
        context: MatchContext,
    ) -> RestartableStream {
        let stream = self.evaluate(query, source.records(), context);
        RestartableStream {
            matcher: self.clone(),
            query: query.clone(),
            source,
            stream,
        }
    }
}

impl Default for UnifiedMatcher {
    fn default() -> Self {
        Self::new(Arc::new(NoGroups), Arc::new(TracingEventSink))
    }
}

/// Pull-based stream of [`MatchResult`]s.
///
/// Cancellation is checked every `cancel_check_interval` records; once
/// observed the stream ends and results already yielded stay valid. A
/// `match_executed` event is emitted exactly once, when the stream is
/// exhausted, cancelled, or dropped.
pub struct MatchStream<I> {
    query: QueryAst,
    records: I,
    groups: Arc<dyn GroupResolver>,
    events: SharedEventSink,
    options: MatchOptions,
    context: MatchContext,
    pattern_id: Option<PatternId>,
    started: Instant,
    summary: MatchSummary,
    finished: bool,
}

impl<I> MatchStream<I> {
    /// Tags every result with `pattern_id`.
    pub fn with_pattern_id(mut self, pattern_id: PatternId) -> Self {
        self.pattern_id = Some(pattern_id);
        self
    }

    pub fn summary(&self) -> MatchSummary {
        self.summary
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.summary.duration = self.started.elapsed();
        self.events.emit(&EngineEvent::MatchExecuted {
            pattern: self.query.to_string(),
            duration: self.summary.duration,
            count: self.summary.matched,
            scanned: self.summary.scanned,
            skipped: self.summary.skipped,
            cancelled: self.summary.cancelled,
        });
    }

    fn result_for(
        &self,
        record: &FileRecord,
        evaluation: Evaluation,
        elapsed: Duration,
    ) -> MatchResult {
        let target_location = match (&self.options.target_dir, evaluation.matched) {
            (Some(target_dir), true) => Some(target_dir.join(&record.name)),
            _ => None,
        };
        MatchResult {
            pattern_id: self.pattern_id.clone(),
            file_path: record.path.clone(),
            matched: evaluation.matched,
            confidence: if evaluation.matched { 1.0 } else { 0.0 },
            matched_conditions: evaluation.conditions,
            target_location,
            execution_time: elapsed,
        }
    }
}

impl<I> Iterator for MatchStream<I>
where
    I: Iterator,
    I::Item: Borrow<FileRecord>,
{
    type Item = MatchResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            let interval = self.options.cancel_check_interval;
            if self
                .context
                .cancel
                .is_cancelled_sparse(self.summary.scanned, interval)
                .is_none()
            {
                self.summary.cancelled = true;
                self.finish();
                return None;
            }
            let Some(item) = self.records.next() else {
                self.finish();
                return None;
            };

            let record: &FileRecord = item.borrow();
            self.summary.scanned += 1;
            let started = Instant::now();
            match evaluate_query(&self.query, record, self.context.now, self.groups.as_ref()) {
                Ok(evaluation) => {
                    if evaluation.matched {
                        self.summary.matched += 1;
                    } else if !self.options.include_misses {
                        continue;
                    }
                    return Some(self.result_for(record, evaluation, started.elapsed()));
                }
                Err(error) => {
                    self.summary.skipped += 1;
                    self.events.emit(&EngineEvent::RecordSkipped {
                        path: record.path.display().to_string(),
                        reason: error.to_string(),
                    });
                }
            }
        }
    }
}

impl<I> Drop for MatchStream<I> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// A match stream over a [`RecordSource`] that can start over.
pub struct RestartableStream {
    matcher: UnifiedMatcher,
    query: QueryAst,
    source: Arc<dyn RecordSource>,
    stream: MatchStream<RecordIter>,
}

impl RestartableStream {
    /// Ends the current pass and begins a new one over a fresh read of the
    /// source.
    pub fn restart(&mut self, context: MatchContext) {
        let pattern_id = self.stream.pattern_id.clone();
        let mut stream = self
            .matcher
            .evaluate(&self.query, self.source.records(), context);
        stream.pattern_id = pattern_id;
        self.stream = stream;
    }

    pub fn with_pattern_id(mut self, pattern_id: PatternId) -> Self {
        self.stream.pattern_id = Some(pattern_id);
        self
    }

    pub fn summary(&self) -> MatchSummary {
        self.stream.summary()
    }
}

impl Iterator for RestartableStream {
    type Item = MatchResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::NaiveDate;
    use parking_lot::Mutex;

    use crate::events::MemoryEventSink;
    use crate::query::IntelligentParser;
    use crate::records::RecordSnapshot;
    use crate::token::TokenContext;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 29)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn compile(expression: &str) -> QueryAst {
        IntelligentParser::default()
            .parse(expression, &TokenContext::new(now()))
            .expect("parse")
            .ast
    }

    fn matcher(events: Arc<MemoryEventSink>) -> UnifiedMatcher {
        UnifiedMatcher::new(Arc::new(NoGroups), events)
    }

    #[test]
    fn yields_only_matches_by_default() {
        let events = Arc::new(MemoryEventSink::new());
        let records = vec![FileRecord::file("/w/a.txt", 1), FileRecord::file("/w/a.md", 1)];
        let results = matcher(events.clone())
            .evaluate(&compile("*.txt"), &records, MatchContext::new(now()))
            .collect::<Vec<_>>();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, PathBuf::from("/w/a.txt"));
        assert_eq!(results[0].confidence, 1.0);
        assert_eq!(results[0].matched_conditions, vec!["name LIKE \"*.txt\"".to_string()]);
        assert_eq!(events.count("match_executed"), 1);
    }

    #[test]
    fn misses_and_targets_on_request() {
        let records = vec![FileRecord::file("/w/a.txt", 1), FileRecord::file("/w/a.md", 1)];
        let results = UnifiedMatcher::default()
            .with_options(MatchOptions {
                include_misses: true,
                target_dir: Some(PathBuf::from("/dest")),
                ..MatchOptions::default()
            })
            .evaluate(&compile("*.txt"), records, MatchContext::new(now()))
            .collect::<Vec<_>>();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].target_location, Some(PathBuf::from("/dest/a.txt")));
        assert!(!results[1].matched);
        assert_eq!(results[1].confidence, 0.0);
        assert_eq!(results[1].target_location, None);
    }

    #[test]
    fn records_are_pulled_lazily() {
        let pulled = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&pulled);
        let records = (0..100u64).map(move |index| {
            *counter.lock() += 1;
            FileRecord::file(format!("/w/{index}.txt"), index)
        });
        let mut stream = UnifiedMatcher::default().evaluate(
            &compile("*.txt"),
            records,
            MatchContext::new(now()),
        );
        assert_eq!(*pulled.lock(), 0);
        stream.next();
        stream.next();
        assert_eq!(*pulled.lock(), 2);
    }

    #[test]
    fn cancellation_ends_the_stream_between_batches() {
        let cancel = CancellationToken::new();
        let records = (0..100u64).map(|index| FileRecord::file(format!("/w/{index}.txt"), index));
        let mut stream = UnifiedMatcher::default()
            .with_options(MatchOptions {
                cancel_check_interval: 10,
                ..MatchOptions::default()
            })
            .evaluate(
                &compile("*.txt"),
                records,
                MatchContext::new(now()).with_cancel(cancel.clone()),
            );

        let first = stream.by_ref().take(5).collect::<Vec<_>>();
        cancel.cancel();
        let rest = stream.by_ref().collect::<Vec<_>>();
        assert_eq!(first.len(), 5);
        // The flag is next read at record 10.
        assert_eq!(rest.len(), 5);
        let summary = stream.summary();
        assert!(summary.cancelled);
        assert_eq!(summary.scanned, 10);
    }

    #[test]
    fn unreadable_records_are_skipped_and_counted() {
        let events = Arc::new(MemoryEventSink::new());
        let dir = tempfile::tempdir().unwrap();
        let readable = dir.path().join("ok.txt");
        std::fs::write(&readable, b"invoice").unwrap();
        let records = vec![
            FileRecord::file(dir.path().join("gone.txt"), 7),
            FileRecord::file(&readable, 7),
        ];
        let mut stream = matcher(events.clone()).evaluate(
            &compile("*.txt AND content CONTAINS invoice"),
            &records,
            MatchContext::new(now()),
        );
        let results = stream.by_ref().collect::<Vec<_>>();
        assert_eq!(results.len(), 1);
        assert_eq!(stream.summary().skipped, 1);
        assert_eq!(events.count("record_skipped"), 1);
    }

    #[test]
    fn groups_resolve_through_the_matcher() {
        struct Groups(HashMap<String, QueryAst>);
        impl GroupResolver for Groups {
            fn resolve_group(&self, group: &str) -> Option<QueryAst> {
                self.0.get(group).cloned()
            }
        }
        let groups = Groups(HashMap::from([("docs".to_string(), compile("*.pdf"))]));
        let matcher = UnifiedMatcher::new(Arc::new(groups), Arc::new(TracingEventSink));
        let records = vec![FileRecord::file("/w/a.pdf", 1), FileRecord::file("/w/a.txt", 1)];
        let results = matcher
            .evaluate(&compile("@docs"), &records, MatchContext::new(now()))
            .collect::<Vec<_>>();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_conditions, vec!["@docs".to_string()]);
    }

    #[test]
    fn restart_rereads_the_source() {
        let snapshot = RecordSnapshot::new(vec![
            FileRecord::file("/w/a.txt", 1),
            FileRecord::file("/w/b.txt", 1),
        ]);
        let mut stream = UnifiedMatcher::default().evaluate_source(
            &compile("*.txt"),
            Arc::new(snapshot),
            MatchContext::new(now()),
        );
        assert_eq!(stream.by_ref().count(), 2);
        stream.restart(MatchContext::new(now()));
        assert_eq!(stream.by_ref().count(), 2);
    }

    #[test]
    fn dynamic_patterns_follow_the_match_clock() {
        let query = compile("backup_$DATE.zip");
        let records = vec![
            FileRecord::file("/w/backup_2025-06-29.zip", 1),
            FileRecord::file("/w/backup_2025-07-01.zip", 1),
        ];
        let later = NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let results = UnifiedMatcher::default()
            .evaluate(&query, &records, MatchContext::new(later))
            .collect::<Vec<_>>();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, PathBuf::from("/w/backup_2025-07-01.zip"));
    }
}
