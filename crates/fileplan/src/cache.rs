//! Compiled-query and match-result caches.
//!
//! Two moka tiers: compiled queries keyed by expression text (bounded, LRU),
//! and match results keyed by query identity plus workspace fingerprint
//! (bounded, time-to-live). Values are immutable `Arc`s, so a hit is
//! indistinguishable from recomputing.

use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::matcher::MatchResult;
use crate::query::{ParsedQuery, QueryAst, QueryId, QueryNode};
use crate::types::{local_naive, FileRecord};

pub(crate) const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;

pub(crate) fn fnv1a_update(hash: &mut u64, bytes: &[u8]) {
    const FNV_PRIME: u64 = 0x100000001b3;
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(FNV_PRIME);
    }
}

/// Identity of a workspace state. Any change to the hashed metadata yields a
/// different fingerprint, which makes every cached result for the old state
/// unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceFingerprint(u64);

impl WorkspaceFingerprint {
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Hashes path, size, modification time and kind of every record, in
    /// iteration order.
    pub fn of_records<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Self {
        let mut hash = FNV_OFFSET_BASIS;
        for record in records {
            fnv1a_update(&mut hash, record.path.to_string_lossy().as_bytes());
            fnv1a_update(&mut hash, &[0xff]);
            fnv1a_update(&mut hash, &record.size.to_le_bytes());
            fnv1a_update(&mut hash, &timestamp_bytes(record.modified));
            fnv1a_update(&mut hash, &[u8::from(record.is_dir), 0xfe]);
        }
        Self(hash)
    }

    /// Hashes a directory and its direct children, sorted by name.
    pub fn of_directory(root: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(root)?;
        let mut hash = FNV_OFFSET_BASIS;
        fnv1a_update(&mut hash, root.to_string_lossy().as_bytes());
        fnv1a_update(
            &mut hash,
            &timestamp_bytes(metadata.modified().ok().map(local_naive)),
        );

        let mut children = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            children.push((
                entry.file_name().to_string_lossy().into_owned(),
                metadata.len(),
                metadata.modified().ok().map(local_naive),
                metadata.is_dir(),
            ));
        }
        children.sort_by(|left, right| left.0.cmp(&right.0));

        for (name, size, modified, is_dir) in children {
            fnv1a_update(&mut hash, name.as_bytes());
            fnv1a_update(&mut hash, &[0xff]);
            fnv1a_update(&mut hash, &size.to_le_bytes());
            fnv1a_update(&mut hash, &timestamp_bytes(modified));
            fnv1a_update(&mut hash, &[u8::from(is_dir), 0xfe]);
        }
        Ok(Self(hash))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkspaceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn timestamp_bytes(timestamp: Option<NaiveDateTime>) -> [u8; 8] {
    timestamp
        .map(|value| value.and_utc().timestamp_micros())
        .unwrap_or(i64::MIN)
        .to_le_bytes()
}

/// Key of the result tier.
///
/// `clock` is set for time-dependent queries, `group_generation` for
/// queries that reference groups, and `variant` distinguishes match options.
/// Hashing uses the query id; equality also compares the trees, so two
/// queries whose ids collide never share results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultKey {
    pub query: QueryId,
    tree: Arc<QueryNode>,
    case_sensitive: bool,
    pub fingerprint: WorkspaceFingerprint,
    pub clock: Option<NaiveDateTime>,
    pub group_generation: Option<u64>,
    pub variant: u64,
}

impl Hash for ResultKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.query.hash(state);
        self.fingerprint.hash(state);
        self.clock.hash(state);
        self.group_generation.hash(state);
        self.variant.hash(state);
    }
}

impl ResultKey {
    pub fn new(query: &QueryAst, fingerprint: WorkspaceFingerprint) -> Self {
        Self {
            query: query.id(),
            tree: query.shared_root(),
            case_sensitive: query.case_sensitive(),
            fingerprint,
            clock: None,
            group_generation: None,
            variant: 0,
        }
    }

    pub fn with_clock(mut self, clock: NaiveDateTime) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_group_generation(mut self, generation: u64) -> Self {
        self.group_generation = Some(generation);
        self
    }

    pub fn with_variant(mut self, variant: u64) -> Self {
        self.variant = variant;
        self
    }
}

pub type CachedResults = Arc<Vec<MatchResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub compiled_capacity: u64,
    pub result_capacity: u64,
    pub result_ttl_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            compiled_capacity: 512,
            result_capacity: 128,
            result_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub compiled_entries: u64,
    pub result_entries: u64,
}

#[derive(Clone)]
pub struct CacheManager {
    compiled: Cache<String, Arc<ParsedQuery>>,
    results: Cache<ResultKey, CachedResults>,
}

impl CacheManager {
    pub fn new(settings: CacheSettings) -> Self {
        let compiled = Cache::builder()
            .max_capacity(settings.compiled_capacity.max(1))
            .eviction_policy(EvictionPolicy::lru())
            .build();
        let results = Cache::builder()
            .max_capacity(settings.result_capacity.max(1))
            .time_to_live(Duration::from_secs(settings.result_ttl_seconds.max(1)))
            .support_invalidation_closures()
            .build();
        Self { compiled, results }
    }

    pub fn get_compiled(&self, expression: &str) -> Option<Arc<ParsedQuery>> {
        self.compiled.get(expression)
    }

    pub fn put_compiled(&self, expression: &str, parsed: Arc<ParsedQuery>) {
        self.compiled.insert(expression.to_string(), parsed);
    }

    /// Returns the cached compilation of `expression`, compiling it once on a
    /// miss. Concurrent misses for the same expression share one compile;
    /// failures are not cached.
    pub fn get_or_compile(
        &self,
        expression: &str,
        compile: impl FnOnce() -> Result<ParsedQuery, ParseError>,
    ) -> Result<Arc<ParsedQuery>, ParseError> {
        self.compiled
            .try_get_with(expression.to_string(), || compile().map(Arc::new))
            .map_err(|error| (*error).clone())
    }

    pub fn get_match_result(&self, key: &ResultKey) -> Option<CachedResults> {
        self.results.get(key)
    }

    pub fn put_match_result(&self, key: ResultKey, results: CachedResults) {
        self.results.insert(key, results);
    }

    /// Returns cached results for `key`, evaluating once on a miss. An
    /// evaluation returning `None` (cancelled) is not cached.
    pub fn get_or_evaluate(
        &self,
        key: ResultKey,
        evaluate: impl FnOnce() -> Option<Vec<MatchResult>>,
    ) -> Option<CachedResults> {
        self.results
            .optionally_get_with(key, || evaluate().map(Arc::new))
    }

    /// Drops every result computed against `fingerprint`.
    pub fn invalidate(&self, fingerprint: WorkspaceFingerprint) {
        let outcome = self
            .results
            .invalidate_entries_if(move |key, _| key.fingerprint == fingerprint);
        if let Err(error) = outcome {
            tracing::warn!(
                fingerprint = %fingerprint,
                "predicate invalidation unavailable, clearing result cache: {}",
                error
            );
            self.results.invalidate_all();
        }
    }

    /// Drops results of every query that references pattern groups.
    pub fn invalidate_grouped(&self) {
        let outcome = self
            .results
            .invalidate_entries_if(|key, _| key.group_generation.is_some());
        if outcome.is_err() {
            self.results.invalidate_all();
        }
    }

    pub fn clear(&self) {
        self.compiled.invalidate_all();
        self.results.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        self.compiled.run_pending_tasks();
        self.results.run_pending_tasks();
        CacheStats {
            compiled_entries: self.compiled.entry_count(),
            result_entries: self.results.entry_count(),
        }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("compiled_entries", &self.compiled.entry_count())
            .field("result_entries", &self.results.entry_count())
            .finish()
    }
}
