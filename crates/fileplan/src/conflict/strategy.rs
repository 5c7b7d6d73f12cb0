//! Pluggable resolution strategies.
//!
//! A strategy inspects one conflict against the current plan and returns a
//! [`StrategyOutcome`]. Only [`BackupStrategy`] touches disk; everything else
//! is a pure plan decision.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::error::ConflictResolutionError;
use crate::query::extension_of_name;

use super::detector::{ConflictDetector, ScopeFilter};
use super::resolver::{PlanDecision, PromptCallback, ResolutionSettings, StrategyRegistry};
use super::target::{EntryKind, TargetFs};
use super::{Conflict, ConflictType, OperationPlan, ResolutionStrategy, Severity};

/// Everything a strategy may consult while resolving one conflict.
pub struct ResolutionContext<'a> {
    pub plan: &'a OperationPlan,
    pub target_fs: &'a dyn TargetFs,
    pub detector: &'a ConflictDetector,
    pub settings: &'a ResolutionSettings,
    pub strategies: &'a StrategyRegistry,
    pub prompt: Option<&'a PromptCallback>,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOutcome {
    /// The strategy that actually produced the decision; differs from the
    /// requested one only for prompts.
    pub strategy: ResolutionStrategy,
    pub decision: PlanDecision,
    pub actions: Vec<String>,
    pub final_path: Option<PathBuf>,
}

pub trait ConflictStrategy: Send + Sync {
    fn kind(&self) -> ResolutionStrategy;

    fn can_handle(&self, conflict: &Conflict, context: &ResolutionContext<'_>) -> bool;

    fn apply(
        &self,
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<StrategyOutcome, ConflictResolutionError>;
}

/// Drops the conflicting operation. Always applicable and side-effect free.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipStrategy;

impl ConflictStrategy for SkipStrategy {
    fn kind(&self) -> ResolutionStrategy {
        ResolutionStrategy::Skip
    }

    fn can_handle(&self, _conflict: &Conflict, _context: &ResolutionContext<'_>) -> bool {
        true
    }

    fn apply(
        &self,
        conflict: &Conflict,
        _context: &ResolutionContext<'_>,
    ) -> Result<StrategyOutcome, ConflictResolutionError> {
        Ok(StrategyOutcome {
            strategy: ResolutionStrategy::Skip,
            decision: PlanDecision::Drop,
            actions: vec![format!(
                "skipped {} -> {}",
                conflict.source_path.display(),
                conflict.target_path.display()
            )],
            final_path: None,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OverwriteStrategy;

impl OverwriteStrategy {
    fn check(
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<(), ConflictResolutionError> {
        if conflict.conflict_type != ConflictType::PathCollision {
            return Err(ConflictResolutionError::UnsupportedConflictType {
                strategy: ResolutionStrategy::Overwrite,
                conflict_type: conflict.conflict_type,
                reason: "only path collisions can be overwritten".to_string(),
            });
        }
        if !context.settings.allow_overwrite {
            return Err(ConflictResolutionError::StrategyNotApplicable {
                strategy: ResolutionStrategy::Overwrite,
                reason: "overwriting is disabled".to_string(),
            });
        }
        if conflict.severity > Severity::High {
            return Err(ConflictResolutionError::StrategyNotApplicable {
                strategy: ResolutionStrategy::Overwrite,
                reason: format!("{} conflicts are never overwritten", conflict.severity),
            });
        }
        Ok(())
    }
}

impl ConflictStrategy for OverwriteStrategy {
    fn kind(&self) -> ResolutionStrategy {
        ResolutionStrategy::Overwrite
    }

    fn can_handle(&self, conflict: &Conflict, context: &ResolutionContext<'_>) -> bool {
        Self::check(conflict, context).is_ok()
    }

    fn apply(
        &self,
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<StrategyOutcome, ConflictResolutionError> {
        Self::check(conflict, context)?;
        Ok(StrategyOutcome {
            strategy: ResolutionStrategy::Overwrite,
            decision: PlanDecision::Overwrite,
            actions: vec![format!("overwrite {}", conflict.target_path.display())],
            final_path: Some(conflict.target_path.clone()),
        })
    }
}

/// Redirects the operation to `stem_N.ext`, the first counter that is free
/// on disk, unclaimed in the plan, and conflict-free on re-detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameStrategy;

impl ConflictStrategy for RenameStrategy {
    fn kind(&self) -> ResolutionStrategy {
        ResolutionStrategy::Rename
    }

    fn can_handle(&self, conflict: &Conflict, _context: &ResolutionContext<'_>) -> bool {
        conflict.conflict_type == ConflictType::PathCollision
    }

    fn apply(
        &self,
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<StrategyOutcome, ConflictResolutionError> {
        if !self.can_handle(conflict, context) {
            return Err(ConflictResolutionError::UnsupportedConflictType {
                strategy: ResolutionStrategy::Rename,
                conflict_type: conflict.conflict_type,
                reason: "renaming only separates operations sharing a target".to_string(),
            });
        }

        let index = conflict.operation_index;
        let attempts = context.settings.max_rename_attempts;
        for counter in 1..=attempts {
            let candidate = numbered_path(&conflict.target_path, counter);
            if context.target_fs.entry_kind(&candidate).exists()
                || context.plan.claims(&candidate, index)
            {
                continue;
            }
            let tentative = context.plan.with_target(index, &candidate);
            let still_conflicting = context
                .detector
                .detect_quiet(&tentative, &ScopeFilter::All)
                .iter()
                .any(|other| match other.conflict_type {
                    ConflictType::PathCollision => {
                        other.operation_index == index
                            || other.related_operations.contains(&index)
                    }
                    ConflictType::PermissionConflict => other.operation_index == index,
                    ConflictType::RuleCollision | ConflictType::PatternOverlap => false,
                });
            if still_conflicting {
                continue;
            }
            return Ok(StrategyOutcome {
                strategy: ResolutionStrategy::Rename,
                decision: PlanDecision::Redirect(candidate.clone()),
                actions: vec![format!(
                    "renamed {} to {}",
                    conflict.target_path.display(),
                    candidate.display()
                )],
                final_path: Some(candidate),
            });
        }

        Err(ConflictResolutionError::ResolutionRetryExceeded {
            path: conflict.target_path.clone(),
            attempts,
        })
    }
}

/// Moves the existing target aside, then proceeds as an overwrite.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackupStrategy;

impl BackupStrategy {
    fn check(
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<(), ConflictResolutionError> {
        if conflict.conflict_type != ConflictType::PathCollision {
            return Err(ConflictResolutionError::UnsupportedConflictType {
                strategy: ResolutionStrategy::Backup,
                conflict_type: conflict.conflict_type,
                reason: "only path collisions have a target to back up".to_string(),
            });
        }
        // The write that follows the backup is an overwrite.
        if conflict.severity > Severity::High {
            return Err(ConflictResolutionError::StrategyNotApplicable {
                strategy: ResolutionStrategy::Backup,
                reason: format!("{} conflicts are never overwritten", conflict.severity),
            });
        }
        if !context.target_fs.entry_kind(&conflict.target_path).exists() {
            return Err(ConflictResolutionError::StrategyNotApplicable {
                strategy: ResolutionStrategy::Backup,
                reason: format!("{} does not exist yet", conflict.target_path.display()),
            });
        }
        Ok(())
    }

    fn backup_path(
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<PathBuf, ConflictResolutionError> {
        let target = &conflict.target_path;
        let attempts = context.settings.max_rename_attempts.max(1);
        for counter in 0..attempts {
            let mut name = target
                .file_name()
                .map(OsString::from)
                .unwrap_or_default();
            name.push(&context.settings.backup_suffix);
            if counter > 0 {
                name.push(format!(".{counter}"));
            }
            let candidate = target.with_file_name(name);
            if !context.target_fs.entry_kind(&candidate).exists()
                && !context.plan.claims(&candidate, usize::MAX)
            {
                return Ok(candidate);
            }
        }
        Err(ConflictResolutionError::ResolutionRetryExceeded {
            path: target.clone(),
            attempts,
        })
    }
}

impl ConflictStrategy for BackupStrategy {
    fn kind(&self) -> ResolutionStrategy {
        ResolutionStrategy::Backup
    }

    fn can_handle(&self, conflict: &Conflict, context: &ResolutionContext<'_>) -> bool {
        Self::check(conflict, context).is_ok()
    }

    fn apply(
        &self,
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<StrategyOutcome, ConflictResolutionError> {
        Self::check(conflict, context)?;
        context
            .cancel
            .is_cancelled()
            .ok_or(ConflictResolutionError::Cancelled)?;

        let backup = Self::backup_path(conflict, context)?;
        let mut actions = Vec::with_capacity(2);
        if context.settings.dry_run {
            actions.push(format!(
                "would back up {} to {}",
                conflict.target_path.display(),
                backup.display()
            ));
        } else {
            context
                .target_fs
                .rename(&conflict.target_path, &backup)
                .map_err(|error| ConflictResolutionError::Io {
                    path: conflict.target_path.clone(),
                    message: error.to_string(),
                })?;
            tracing::debug!(
                target_path = %conflict.target_path.display(),
                backup = %backup.display(),
                "existing target backed up"
            );
            actions.push(format!(
                "backed up {} to {}",
                conflict.target_path.display(),
                backup.display()
            ));
        }
        actions.push(format!("overwrite {}", conflict.target_path.display()));

        Ok(StrategyOutcome {
            strategy: ResolutionStrategy::Backup,
            decision: PlanDecision::Overwrite,
            actions,
            final_path: Some(conflict.target_path.clone()),
        })
    }
}

/// Merges directories into directories and text files into text files.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeStrategy;

impl MergeStrategy {
    fn check(
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<(), ConflictResolutionError> {
        let unsupported = |reason: String| ConflictResolutionError::UnsupportedConflictType {
            strategy: ResolutionStrategy::Merge,
            conflict_type: conflict.conflict_type,
            reason,
        };
        if conflict.conflict_type != ConflictType::PathCollision {
            return Err(unsupported(
                "only operations sharing a target can be merged".to_string(),
            ));
        }
        let incoming_is_dir = context
            .plan
            .get(conflict.operation_index)
            .is_some_and(|operation| operation.source_is_dir);
        let existing_is_dir = match context.target_fs.entry_kind(&conflict.target_path) {
            EntryKind::Directory => true,
            EntryKind::File => false,
            EntryKind::Missing => conflict
                .related_operations
                .first()
                .and_then(|index| context.plan.get(*index))
                .is_some_and(|operation| operation.source_is_dir),
        };

        match (incoming_is_dir, existing_is_dir) {
            (true, true) => Ok(()),
            (false, false) => {
                let mergeable = |path: &Path| {
                    path.file_name()
                        .and_then(|name| extension_of_name(&name.to_string_lossy()))
                        .is_some_and(|extension| {
                            context
                                .settings
                                .mergeable_extensions
                                .iter()
                                .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
                        })
                };
                if mergeable(&conflict.source_path) && mergeable(&conflict.target_path) {
                    Ok(())
                } else {
                    Err(unsupported("only text files can be merged".to_string()))
                }
            }
            _ => Err(unsupported(
                "a directory cannot be merged with a file".to_string(),
            )),
        }
    }
}

impl ConflictStrategy for MergeStrategy {
    fn kind(&self) -> ResolutionStrategy {
        ResolutionStrategy::Merge
    }

    fn can_handle(&self, conflict: &Conflict, context: &ResolutionContext<'_>) -> bool {
        Self::check(conflict, context).is_ok()
    }

    fn apply(
        &self,
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<StrategyOutcome, ConflictResolutionError> {
        Self::check(conflict, context)?;
        Ok(StrategyOutcome {
            strategy: ResolutionStrategy::Merge,
            decision: PlanDecision::Merge,
            actions: vec![format!(
                "merge {} into {}",
                conflict.source_path.display(),
                conflict.target_path.display()
            )],
            final_path: Some(conflict.target_path.clone()),
        })
    }
}

/// Defers to the configured prompt callback, then applies whatever concrete
/// strategy it picks.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptStrategy;

impl ConflictStrategy for PromptStrategy {
    fn kind(&self) -> ResolutionStrategy {
        ResolutionStrategy::Prompt
    }

    fn can_handle(&self, _conflict: &Conflict, context: &ResolutionContext<'_>) -> bool {
        context.prompt.is_some()
    }

    fn apply(
        &self,
        conflict: &Conflict,
        context: &ResolutionContext<'_>,
    ) -> Result<StrategyOutcome, ConflictResolutionError> {
        let prompt = context
            .prompt
            .ok_or(ConflictResolutionError::PromptUnavailable)?;
        let chosen = (**prompt)(conflict);
        if chosen == ResolutionStrategy::Prompt {
            return Err(ConflictResolutionError::StrategyNotApplicable {
                strategy: ResolutionStrategy::Prompt,
                reason: "the prompt answered with another prompt".to_string(),
            });
        }
        let strategy = context.strategies.get(chosen).ok_or_else(|| {
            ConflictResolutionError::StrategyNotApplicable {
                strategy: chosen,
                reason: "no such strategy is registered".to_string(),
            }
        })?;
        let mut outcome = strategy.apply(conflict, context)?;
        outcome
            .actions
            .insert(0, format!("prompt chose {chosen}"));
        Ok(outcome)
    }
}

/// `dir/stem_N.ext`, or `dir/name_N` when there is no extension.
pub(crate) fn numbered_path(path: &Path, counter: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(extension) => format!("{stem}_{counter}.{}", extension.to_string_lossy()),
        None => format!("{stem}_{counter}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_paths_keep_the_extension() {
        assert_eq!(
            numbered_path(Path::new("/dest/report.pdf"), 1),
            PathBuf::from("/dest/report_1.pdf")
        );
        assert_eq!(
            numbered_path(Path::new("/dest/archive.tar.gz"), 2),
            PathBuf::from("/dest/archive.tar_2.gz")
        );
        assert_eq!(
            numbered_path(Path::new("/dest/Makefile"), 3),
            PathBuf::from("/dest/Makefile_3")
        );
    }
}
