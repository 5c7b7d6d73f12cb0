//! Strategy dispatch, single and batch resolution.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::error::ConflictResolutionError;
use crate::events::{EngineEvent, NullEventSink, SharedEventSink};

use super::detector::{ConflictDetector, ScopeFilter};
use super::strategy::{
    BackupStrategy, ConflictStrategy, MergeStrategy, OverwriteStrategy, PromptStrategy,
    RenameStrategy, ResolutionContext, SkipStrategy,
};
use super::{Conflict, OperationPlan, ResolutionStrategy, Severity};

/// Asked to pick a concrete strategy when `Prompt` is applied.
pub type PromptCallback = Arc<dyn Fn(&Conflict) -> ResolutionStrategy + Send + Sync>;

/// What a successful resolution does to its plan entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum PlanDecision {
    Drop,
    Redirect(PathBuf),
    Overwrite,
    Merge,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionSettings {
    pub allow_overwrite: bool,
    /// Strategies that touch disk only describe what they would do.
    pub dry_run: bool,
    pub max_rename_attempts: usize,
    pub backup_suffix: String,
    /// Stop a batch after a critical conflict fails to resolve.
    pub abort_on_critical_failure: bool,
    pub mergeable_extensions: Vec<String>,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            allow_overwrite: false,
            dry_run: false,
            max_rename_attempts: 100,
            backup_suffix: ".bak".to_string(),
            abort_on_critical_failure: true,
            mergeable_extensions: ["txt", "md", "log", "csv", "tsv", "json", "yaml", "yml"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Audit record for one resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub conflict_id: Uuid,
    pub operation_index: usize,
    pub success: bool,
    pub strategy_used: ResolutionStrategy,
    pub actions_taken: Vec<String>,
    pub final_path: Option<PathBuf>,
    pub error: Option<ConflictResolutionError>,
    pub decision: PlanDecision,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResolution {
    pub results: Vec<ResolutionResult>,
    pub unresolved: Vec<Conflict>,
    /// Conflicts that an earlier resolution in the same batch already
    /// removed.
    pub superseded: Vec<Uuid>,
    pub aborted: bool,
    pub cancelled: bool,
}

impl BatchResolution {
    pub fn resolved_count(&self) -> usize {
        self.results.iter().filter(|result| result.success).count()
    }
}

/// Strategies by kind. Registering a kind again replaces the earlier one.
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn ConflictStrategy>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|strategy| strategy.kind()))
            .finish()
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SkipStrategy));
        registry.register(Arc::new(OverwriteStrategy));
        registry.register(Arc::new(RenameStrategy));
        registry.register(Arc::new(BackupStrategy));
        registry.register(Arc::new(PromptStrategy));
        registry.register(Arc::new(MergeStrategy));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn ConflictStrategy>) {
        let kind = strategy.kind();
        self.strategies.retain(|existing| existing.kind() != kind);
        self.strategies.push(strategy);
    }

    pub fn get(&self, kind: ResolutionStrategy) -> Option<&dyn ConflictStrategy> {
        self.strategies
            .iter()
            .find(|strategy| strategy.kind() == kind)
            .map(|strategy| strategy.as_ref())
    }

    pub fn kinds(&self) -> Vec<ResolutionStrategy> {
        self.strategies.iter().map(|strategy| strategy.kind()).collect()
    }
}

pub struct ConflictResolver {
    strategies: StrategyRegistry,
    detector: ConflictDetector,
    settings: ResolutionSettings,
    prompt: Option<PromptCallback>,
    events: SharedEventSink,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(
            ConflictDetector::default(),
            ResolutionSettings::default(),
            Arc::new(NullEventSink),
        )
    }
}

impl fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("strategies", &self.strategies)
            .field("settings", &self.settings)
            .field("prompt", &self.prompt.is_some())
            .finish_non_exhaustive()
    }
}

impl ConflictResolver {
    pub fn new(
        detector: ConflictDetector,
        settings: ResolutionSettings,
        events: SharedEventSink,
    ) -> Self {
        Self {
            strategies: StrategyRegistry::builtin(),
            detector,
            settings,
            prompt: None,
            events,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptCallback) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ConflictStrategy>) -> Self {
        self.strategies.register(strategy);
        self
    }

    pub fn settings(&self) -> &ResolutionSettings {
        &self.settings
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    fn context<'a>(
        &'a self,
        plan: &'a OperationPlan,
        cancel: &'a CancellationToken,
    ) -> ResolutionContext<'a> {
        ResolutionContext {
            plan,
            target_fs: self.detector.target_fs().as_ref(),
            detector: &self.detector,
            settings: &self.settings,
            strategies: &self.strategies,
            prompt: self.prompt.as_ref(),
            cancel,
        }
    }

    /// Applies `strategy` to one conflict. Never panics and never returns an
    /// error: failures are recorded in the result.
    pub fn resolve(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
        plan: &OperationPlan,
        cancel: &CancellationToken,
    ) -> ResolutionResult {
        let context = self.context(plan, cancel);
        let outcome = match self.strategies.get(strategy) {
            Some(handler) => handler.apply(conflict, &context),
            None => Err(ConflictResolutionError::StrategyNotApplicable {
                strategy,
                reason: "no such strategy is registered".to_string(),
            }),
        };

        let result = match outcome {
            Ok(outcome) => ResolutionResult {
                conflict_id: conflict.id,
                operation_index: conflict.operation_index,
                success: true,
                strategy_used: outcome.strategy,
                actions_taken: outcome.actions,
                final_path: outcome.final_path,
                error: None,
                decision: outcome.decision,
            },
            Err(error) => ResolutionResult {
                conflict_id: conflict.id,
                operation_index: conflict.operation_index,
                success: false,
                strategy_used: strategy,
                actions_taken: Vec::new(),
                final_path: None,
                error: Some(error),
                decision: PlanDecision::Unchanged,
            },
        };

        self.events.emit(&EngineEvent::ConflictResolved {
            strategy: result.strategy_used,
            success: result.success,
            conflict_id: conflict.id.to_string(),
        });
        result
    }

    /// Strategies applicable to `conflict`, the suggested one first.
    pub fn get_resolution_options(
        &self,
        conflict: &Conflict,
        plan: &OperationPlan,
    ) -> Vec<ResolutionStrategy> {
        let cancel = CancellationToken::noop();
        let context = self.context(plan, &cancel);
        let mut options: Vec<ResolutionStrategy> = ResolutionStrategy::ALL
            .into_iter()
            .filter(|kind| {
                self.strategies
                    .get(*kind)
                    .is_some_and(|strategy| strategy.can_handle(conflict, &context))
            })
            .collect();
        if let Some(suggested) = conflict.suggested_strategy {
            if let Some(position) = options.iter().position(|kind| *kind == suggested) {
                let suggested = options.remove(position);
                options.insert(0, suggested);
            }
        }
        options
    }

    /// Resolves `conflicts` most severe first, folding every successful
    /// decision into `plan` before the next conflict is looked at.
    ///
    /// `selector` picks the strategy per conflict; `None` leaves it
    /// unresolved. A conflict whose operation was dropped or no longer
    /// conflicts by the time it comes up is reported as superseded.
    pub fn resolve_batch<F>(
        &self,
        conflicts: &[Conflict],
        plan: &mut OperationPlan,
        selector: F,
        cancel: &CancellationToken,
    ) -> BatchResolution
    where
        F: Fn(&Conflict) -> Option<ResolutionStrategy>,
    {
        let mut ordered: Vec<&Conflict> = conflicts.iter().collect();
        ordered.sort_by(|a, b| b.severity.cmp(&a.severity));

        let mut batch = BatchResolution::default();
        for conflict in ordered {
            if batch.aborted || batch.cancelled {
                batch.unresolved.push(conflict.clone());
                continue;
            }
            if cancel.cancelled() {
                batch.cancelled = true;
                batch.unresolved.push(conflict.clone());
                continue;
            }
            let Some(current) = self.refresh(conflict, plan) else {
                batch.superseded.push(conflict.id);
                continue;
            };
            let Some(strategy) = selector(conflict) else {
                batch.unresolved.push(conflict.clone());
                continue;
            };

            let result = self.resolve(&current, strategy, plan, cancel);
            plan.apply(&result);
            if !result.success {
                batch.unresolved.push(conflict.clone());
                if conflict.severity == Severity::Critical
                    && self.settings.abort_on_critical_failure
                {
                    tracing::warn!(
                        conflict_id = %conflict.id,
                        target = %conflict.target_path.display(),
                        "critical conflict unresolved, aborting batch"
                    );
                    batch.aborted = true;
                }
            }
            batch.results.push(result);
        }
        batch
    }

    // The conflict as it stands in the current plan, keeping its identity.
    fn refresh(&self, conflict: &Conflict, plan: &OperationPlan) -> Option<Conflict> {
        if plan.is_dropped(conflict.operation_index) {
            return None;
        }
        self.detector
            .detect_quiet(plan, &ScopeFilter::All)
            .into_iter()
            .find(|current| {
                current.operation_index == conflict.operation_index
                    && current.conflict_type == conflict.conflict_type
            })
            .map(|current| Conflict {
                id: conflict.id,
                ..current
            })
    }
}
