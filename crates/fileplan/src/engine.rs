//! The public entry point tying parsing, matching, caching and conflict
//! handling together.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use rayon::prelude::*;

use crate::cache::{
    fnv1a_update, CacheManager, CachedResults, ResultKey, WorkspaceFingerprint, FNV_OFFSET_BASIS,
};
use crate::cancel::CancellationToken;
use crate::conflict::{
    BatchResolution, Conflict, ConflictDetector, ConflictResolver, ConflictStrategy,
    OperationPlan, PromptCallback, ProposedOperation, ResolutionResult, ResolutionStrategy,
    ScopeFilter, StdTargetFs, TargetFs,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, SharedEventSink, TracingEventSink};
use crate::groups::GroupRegistry;
use crate::matcher::{
    MatchContext, MatchOptions, MatchResult, MatchStream, MatchSummary, UnifiedMatcher,
};
use crate::pattern::{Pattern, PatternDocument};
use crate::query::{GroupResolver, IntelligentParser, ParsedQuery, QueryAst, QueryId, QueryNode};
use crate::records::RecordSnapshot;
use crate::token::TokenContext;
use crate::types::{FileRecord, PatternId};

/// Where token values and the match clock come from.
#[derive(Debug, Clone)]
enum Clock {
    /// Captured fresh for every call.
    Live,
    Fixed(TokenContext),
}

/// Results of one query from [`PatternEngine::match_many`].
#[derive(Debug, Clone)]
pub struct QueryMatches {
    pub query: QueryId,
    pub results: Vec<MatchResult>,
    pub summary: MatchSummary,
}

pub struct PatternEngine {
    config: EngineConfig,
    parser: IntelligentParser,
    clock: Clock,
    cache: CacheManager,
    groups: Arc<GroupRegistry>,
    matcher: UnifiedMatcher,
    resolver: ConflictResolver,
    pool: Option<rayon::ThreadPool>,
    events: SharedEventSink,
}

impl fmt::Debug for PatternEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternEngine")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("cache", &self.cache)
            .field("groups", &self.groups.names())
            .finish_non_exhaustive()
    }
}

impl PatternEngine {
    pub fn builder() -> PatternEngineBuilder {
        PatternEngineBuilder::default()
    }

    /// Engine with default configuration, live clock and tracing events.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    pub fn matcher(&self) -> &UnifiedMatcher {
        &self.matcher
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub fn token_context(&self) -> TokenContext {
        match &self.clock {
            Clock::Live => TokenContext::capture(),
            Clock::Fixed(context) => context.clone(),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        match &self.clock {
            Clock::Live => Local::now().naive_local(),
            Clock::Fixed(context) => context.now,
        }
    }

    /// Compiles `expression`, or returns the cached compilation. Clock
    /// tokens stay dynamic in the compiled tree, so a cached entry is valid
    /// for any match-time clock. User, host and working-directory tokens are
    /// resolved here, so their values are part of the cache key.
    pub fn parse_pattern(&self, expression: &str) -> Result<Arc<ParsedQuery>> {
        let context = self.token_context();
        let key = compiled_key(expression, &context);
        let parsed = self.cache.get_or_compile(&key, || {
            let parsed = self.parser.parse(expression, &context)?;
            self.events.emit(&EngineEvent::PatternParsed {
                expression: parsed.expression.clone(),
                complexity: parsed.complexity,
                score: parsed.score,
                warnings: parsed.issues.len(),
            });
            Ok(parsed)
        })?;
        Ok(parsed)
    }

    /// Builds a storable [`Pattern`]. Parse failures produce an invalid
    /// pattern instead of an error; references to undefined groups become
    /// warnings.
    pub fn parse_and_validate(&self, name: &str, expression: &str) -> Pattern {
        let parsed = self.parse_pattern(expression).map_err(|error| match error {
            EngineError::Parse(error) => error,
            other => crate::error::ParseError::syntax(other.to_string(), 0),
        });
        let mut pattern = Pattern::from_parsed(
            PatternId::generate(),
            name,
            expression.to_string(),
            parsed.map(|parsed| ParsedQuery::clone(&parsed)),
        );
        if let Some(query) = &pattern.compiled_query {
            for group in undefined_groups(query.root(), &self.groups) {
                pattern
                    .warnings
                    .push(format!("pattern group '@{group}' is not defined"));
            }
        }
        pattern
    }

    /// Defines or replaces a group and drops cached results that depended on
    /// group definitions.
    pub fn define_group(&self, name: &str, expression: &str) -> Result<()> {
        let parsed = self.parse_pattern(expression)?;
        self.groups.define(name, expression, parsed.ast.clone())?;
        self.cache.invalidate_grouped();
        Ok(())
    }

    /// Defines the document's groups, then compiles its patterns.
    pub fn load_patterns(&self, document: &PatternDocument) -> Result<Vec<Pattern>> {
        for group in &document.groups {
            self.define_group(&group.name, &group.expression)?;
        }
        Ok(document.compile(&self.parser, &self.token_context()))
    }

    /// Lazily matches `query` against `records`.
    pub fn match_files<I>(
        &self,
        query: &QueryAst,
        records: I,
        cancel: CancellationToken,
    ) -> MatchStream<I::IntoIter>
    where
        I: IntoIterator,
        I::Item: Borrow<FileRecord>,
    {
        self.matcher
            .evaluate(query, records, MatchContext::new(self.now()).with_cancel(cancel))
    }

    /// [`match_files`](Self::match_files) for a stored pattern; results carry
    /// its id.
    pub fn match_pattern<I>(
        &self,
        pattern: &Pattern,
        records: I,
        cancel: CancellationToken,
    ) -> Result<MatchStream<I::IntoIter>>
    where
        I: IntoIterator,
        I::Item: Borrow<FileRecord>,
    {
        let query = pattern.compiled_query.as_ref().ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "pattern '{}' is invalid: {}",
                pattern.name,
                pattern.validation_errors.join("; ")
            ))
        })?;
        Ok(self
            .match_files(query, records, cancel)
            .with_pattern_id(pattern.id.clone()))
    }

    /// Matches a whole snapshot through the result cache. Returns `None`
    /// when cancelled; a cancelled run is never cached.
    pub fn match_snapshot(
        &self,
        query: &QueryAst,
        snapshot: &RecordSnapshot,
        fingerprint: WorkspaceFingerprint,
        cancel: &CancellationToken,
    ) -> Option<CachedResults> {
        let now = self.now();
        let mut key = ResultKey::new(query, fingerprint)
            .with_variant(options_variant(self.matcher.options()));
        if query.is_time_dependent() {
            key = key.with_clock(now);
        }
        if query.has_group_references() {
            key = key.with_group_generation(self.groups.generation());
        }

        self.cache.get_or_evaluate(key, || {
            let context = MatchContext::new(now).with_cancel(cancel.clone());
            let mut stream = self.matcher.evaluate(query, snapshot.as_slice(), context);
            let results: Vec<MatchResult> = stream.by_ref().collect();
            if stream.summary().cancelled {
                None
            } else {
                Some(results)
            }
        })
    }

    /// Evaluates independent queries in parallel over one shared snapshot.
    pub fn match_many(
        &self,
        queries: &[QueryAst],
        snapshot: &RecordSnapshot,
        cancel: &CancellationToken,
    ) -> Vec<QueryMatches> {
        let now = self.now();
        let run = || {
            queries
                .par_iter()
                .map(|query| {
                    let context = MatchContext::new(now).with_cancel(cancel.clone());
                    let mut stream = self.matcher.evaluate(query, snapshot.as_slice(), context);
                    let results: Vec<MatchResult> = stream.by_ref().collect();
                    QueryMatches {
                        query: query.id(),
                        results,
                        summary: stream.summary(),
                    }
                })
                .collect()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Detects conflicts across all `operations`.
    pub fn detect_conflicts(&self, operations: &[ProposedOperation]) -> Vec<Conflict> {
        self.resolver
            .detector()
            .detect_operations(operations, &ScopeFilter::All)
    }

    pub fn detect_conflicts_in(&self, plan: &OperationPlan, scope: &ScopeFilter) -> Vec<Conflict> {
        self.resolver.detector().detect(plan, scope)
    }

    pub fn resolve_conflict(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
        plan: &OperationPlan,
        cancel: &CancellationToken,
    ) -> ResolutionResult {
        self.resolver.resolve(conflict, strategy, plan, cancel)
    }

    /// Resolves every conflict with its suggested strategy.
    pub fn resolve_batch(
        &self,
        conflicts: &[Conflict],
        plan: &mut OperationPlan,
        cancel: &CancellationToken,
    ) -> BatchResolution {
        self.resolver
            .resolve_batch(conflicts, plan, |conflict| conflict.suggested_strategy, cancel)
    }

    pub fn resolve_batch_with<F>(
        &self,
        conflicts: &[Conflict],
        plan: &mut OperationPlan,
        selector: F,
        cancel: &CancellationToken,
    ) -> BatchResolution
    where
        F: Fn(&Conflict) -> Option<ResolutionStrategy>,
    {
        self.resolver.resolve_batch(conflicts, plan, selector, cancel)
    }

    pub fn get_resolution_options(
        &self,
        conflict: &Conflict,
        plan: &OperationPlan,
    ) -> Vec<ResolutionStrategy> {
        self.resolver.get_resolution_options(conflict, plan)
    }

    /// Drops cached results computed against `fingerprint`.
    pub fn invalidate_workspace(&self, fingerprint: WorkspaceFingerprint) {
        self.cache.invalidate(fingerprint);
    }
}

/// Expressions without tokens are keyed by their text alone.
fn compiled_key(expression: &str, context: &TokenContext) -> String {
    if !expression.contains('$') {
        return expression.to_string();
    }
    format!(
        "{expression}\0{}\0{}\0{}",
        context.user,
        context.host,
        context.workdir.display()
    )
}

fn options_variant(options: &MatchOptions) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    fnv1a_update(&mut hash, &[u8::from(options.include_misses)]);
    if let Some(target_dir) = &options.target_dir {
        fnv1a_update(&mut hash, target_dir.to_string_lossy().as_bytes());
    }
    hash
}

fn undefined_groups(root: &QueryNode, groups: &GroupRegistry) -> Vec<String> {
    let mut missing = Vec::new();
    root.walk(&mut |node| {
        if let QueryNode::Group(reference) = node {
            if groups.resolve_group(&reference.group_id).is_none()
                && !missing.contains(&reference.group_id)
            {
                missing.push(reference.group_id.clone());
            }
        }
    });
    missing
}

pub struct PatternEngineBuilder {
    config: EngineConfig,
    clock: Clock,
    events: Option<SharedEventSink>,
    target_fs: Option<Arc<dyn TargetFs>>,
    prompt: Option<PromptCallback>,
    strategies: Vec<Arc<dyn ConflictStrategy>>,
}

impl Default for PatternEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: Clock::Live,
            events: None,
            target_fs: None,
            prompt: None,
            strategies: Vec::new(),
        }
    }
}

impl PatternEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Pins token values and the match clock, mostly for tests and replays.
    pub fn token_context(mut self, context: TokenContext) -> Self {
        self.clock = Clock::Fixed(context);
        self
    }

    pub fn events(mut self, events: SharedEventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn target_fs(mut self, target_fs: Arc<dyn TargetFs>) -> Self {
        self.target_fs = Some(target_fs);
        self
    }

    pub fn prompt(mut self, prompt: PromptCallback) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Adds a strategy, replacing the built-in of the same kind.
    pub fn strategy(mut self, strategy: Arc<dyn ConflictStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn build(self) -> Result<PatternEngine> {
        self.config.validate()?;

        let events = self
            .events
            .unwrap_or_else(|| Arc::new(TracingEventSink) as SharedEventSink);
        let target_fs = self
            .target_fs
            .unwrap_or_else(|| Arc::new(StdTargetFs) as Arc<dyn TargetFs>);
        let groups = Arc::new(GroupRegistry::new());
        let matcher = UnifiedMatcher::new(
            Arc::clone(&groups) as Arc<dyn GroupResolver>,
            Arc::clone(&events),
        )
        .with_options(self.config.matching.clone());

        let detector = ConflictDetector::new(
            target_fs,
            self.config.policies.clone(),
            Arc::clone(&events),
        );
        let mut resolver = ConflictResolver::new(
            detector,
            self.config.resolution.clone(),
            Arc::clone(&events),
        );
        if let Some(prompt) = self.prompt {
            resolver = resolver.with_prompt(prompt);
        }
        for strategy in self.strategies {
            resolver = resolver.with_strategy(strategy);
        }

        let pool = if self.config.worker_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.worker_threads)
                .thread_name(|index| format!("fileplan-match-{index}"))
                .build()
                .map_err(|error| {
                    EngineError::Internal(format!("failed to build match pool: {error}"))
                })?;
            Some(pool)
        } else {
            None
        };

        tracing::debug!(
            worker_threads = self.config.worker_threads,
            case_sensitive = self.config.parser.case_sensitive,
            "pattern engine ready"
        );

        Ok(PatternEngine {
            parser: IntelligentParser::new(self.config.parser),
            cache: CacheManager::new(self.config.cache),
            clock: self.clock,
            config: self.config,
            groups,
            matcher,
            resolver,
            pool,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::events::MemoryEventSink;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn engine(sink: Arc<MemoryEventSink>) -> PatternEngine {
        PatternEngine::builder()
            .token_context(TokenContext::new(now()))
            .events(sink)
            .build()
            .unwrap()
    }

    fn records() -> Vec<FileRecord> {
        vec![
            FileRecord::file("/w/a.txt", 10),
            FileRecord::file("/w/b.jpg", 20 * 1024 * 1024),
            FileRecord::file("/w/c.jpg", 1024),
        ]
    }

    #[test]
    fn workdir_tokens_recompile_when_the_directory_changes() {
        let mut engine = engine(Arc::new(MemoryEventSink::new()));
        let in_dir = |workdir: &str| Clock::Fixed(TokenContext::new(now()).with_workdir(workdir));

        engine.clock = in_dir("/home/alice/alpha");
        let alpha = engine.parse_pattern("${WORKDIR}_*.txt").unwrap();
        let plain = engine.parse_pattern("*.txt").unwrap();
        assert_eq!(alpha.resolved.text, "alpha_*.txt");

        engine.clock = in_dir("/srv/beta");
        let beta = engine.parse_pattern("${WORKDIR}_*.txt").unwrap();
        assert_eq!(beta.resolved.text, "beta_*.txt");
        assert!(Arc::ptr_eq(&plain, &engine.parse_pattern("*.txt").unwrap()));

        engine.clock = in_dir("/home/alice/alpha");
        let again = engine.parse_pattern("${WORKDIR}_*.txt").unwrap();
        assert!(Arc::ptr_eq(&alpha, &again));
    }

    #[test]
    fn compilations_are_cached_and_reported_once() {
        let sink = Arc::new(MemoryEventSink::new());
        let engine = engine(sink.clone());
        let first = engine.parse_pattern("*.jpg AND size > 10MB").unwrap();
        let second = engine.parse_pattern("*.jpg AND size > 10MB").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sink.count("pattern_parsed"), 1);
    }

    #[test]
    fn parse_errors_surface_as_engine_errors() {
        let engine = engine(Arc::new(MemoryEventSink::new()));
        let error = engine.parse_pattern("size >> 10MB").unwrap_err();
        assert!(matches!(error, EngineError::Parse(ref parse) if parse.position() == 5));
    }

    #[test]
    fn match_files_streams_matches() {
        let sink = Arc::new(MemoryEventSink::new());
        let engine = engine(sink.clone());
        let parsed = engine.parse_pattern("*.jpg AND size > 10MB").unwrap();
        let paths: Vec<_> = engine
            .match_files(&parsed.ast, records(), CancellationToken::noop())
            .map(|result| result.file_path)
            .collect();
        assert_eq!(paths, vec![std::path::PathBuf::from("/w/b.jpg")]);
        assert_eq!(sink.count("match_executed"), 1);
    }

    #[test]
    fn invalid_patterns_cannot_be_matched() {
        let engine = engine(Arc::new(MemoryEventSink::new()));
        let pattern = engine.parse_and_validate("broken", "size >> 10MB");
        assert!(!pattern.is_valid);
        assert!(matches!(
            engine.match_pattern(&pattern, records(), CancellationToken::noop()),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn undefined_groups_become_warnings() {
        let engine = engine(Arc::new(MemoryEventSink::new()));
        let pattern = engine.parse_and_validate("grouped", "@photos AND size > 1MB");
        assert!(pattern.is_valid);
        assert_eq!(pattern.warnings.len(), 1);

        engine.define_group("photos", "*.jpg").unwrap();
        let pattern = engine.parse_and_validate("grouped", "@photos AND size > 1MB");
        assert!(pattern.warnings.is_empty());

        let results: Vec<_> = engine
            .match_pattern(&pattern, records(), CancellationToken::noop())
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pattern_id.as_ref(), Some(&pattern.id));
    }

    #[test]
    fn snapshot_results_are_served_from_cache() {
        let engine = engine(Arc::new(MemoryEventSink::new()));
        let snapshot = RecordSnapshot::new(records());
        let fingerprint = WorkspaceFingerprint::of_records(snapshot.as_slice());
        let parsed = engine.parse_pattern("*.jpg").unwrap();
        let cancel = CancellationToken::noop();

        let first = engine
            .match_snapshot(&parsed.ast, &snapshot, fingerprint, &cancel)
            .unwrap();
        let second = engine
            .match_snapshot(&parsed.ast, &snapshot, fingerprint, &cancel)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);

        engine.invalidate_workspace(fingerprint);
        let third = engine
            .match_snapshot(&parsed.ast, &snapshot, fingerprint, &cancel)
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        let paths = |results: &CachedResults| {
            results
                .iter()
                .map(|result| result.file_path.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(paths(&first), paths(&third));
    }

    #[test]
    fn cancelled_snapshot_runs_are_not_cached() {
        let engine = engine(Arc::new(MemoryEventSink::new()));
        let snapshot = RecordSnapshot::new(records());
        let fingerprint = WorkspaceFingerprint::of_records(snapshot.as_slice());
        let parsed = engine.parse_pattern("*.jpg").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(engine
            .match_snapshot(&parsed.ast, &snapshot, fingerprint, &cancel)
            .is_none());
        assert!(engine
            .match_snapshot(&parsed.ast, &snapshot, fingerprint, &CancellationToken::noop())
            .is_some());
    }

    #[test]
    fn match_many_keeps_query_order() {
        let config = EngineConfig {
            worker_threads: 2,
            ..EngineConfig::default()
        };
        let engine = PatternEngine::builder()
            .config(config)
            .token_context(TokenContext::new(now()))
            .events(Arc::new(MemoryEventSink::new()))
            .build()
            .unwrap();
        let queries: Vec<QueryAst> = ["*.txt", "*.jpg", "size > 10MB"]
            .iter()
            .map(|expression| engine.parse_pattern(expression).unwrap().ast.clone())
            .collect();
        let snapshot = RecordSnapshot::new(records());

        let matches = engine.match_many(&queries, &snapshot, &CancellationToken::noop());
        let counts: Vec<usize> = matches.iter().map(|entry| entry.results.len()).collect();
        assert_eq!(counts, vec![1, 2, 1]);
        assert_eq!(matches[1].query, queries[1].id());
    }

    #[test]
    fn invalid_config_fails_the_build() {
        let mut config = EngineConfig::default();
        config.resolution.max_rename_attempts = 0;
        assert!(matches!(
            PatternEngine::builder().config(config).build(),
            Err(EngineError::Config(_))
        ));
    }
}
