//! Per-file merge orchestration.
//!
//! Composes the differ, classifier, auto merger, and resolver into the full
//! pipeline: classify the snapshots' changes into conflict regions, apply
//! everything non-conflicting through the splicer, then route each region
//! to its deterministic strategy or to the model-assisted path. The engine
//! holds no mutable state; distinct files can be merged in parallel by the
//! caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::automerge::AutoMerger;
use crate::classifier::ConflictClassifier;
use crate::differ::SemanticDiffer;
use crate::language::ParserRegistry;
use crate::resolver::AiResolver;
use crate::splicer::{apply_single_task_changes, combine_non_conflicting_changes};
use crate::types::{ConflictRegion, MergeContext, MergeResult, TaskSnapshot};

/// Everything the orchestration layer needs to know about one file's merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMergeReport {
    pub file_path: String,
    /// The final content, with every resolved region applied.
    pub merged_content: String,
    pub conflicts: Vec<ConflictRegion>,
    pub region_results: Vec<MergeResult>,
    /// False when any region failed; the caller decides whether to fall
    /// back to manual conflict markers.
    pub all_resolved: bool,
}

/// The full merge pipeline for one repository's files.
pub struct MergeEngine {
    differ: SemanticDiffer,
    classifier: ConflictClassifier,
    auto_merger: AutoMerger,
    resolver: AiResolver,
}

impl MergeEngine {
    /// Engine with the model-assisted path disabled.
    pub fn new(registry: Arc<ParserRegistry>) -> Self {
        Self::with_resolver(registry, AiResolver::disabled())
    }

    pub fn with_resolver(registry: Arc<ParserRegistry>, resolver: AiResolver) -> Self {
        Self {
            differ: SemanticDiffer::new(registry),
            classifier: ConflictClassifier::new(),
            auto_merger: AutoMerger::new(),
            resolver,
        }
    }

    pub fn differ(&self) -> &SemanticDiffer {
        &self.differ
    }

    /// Merge every task's changes to one file into a single content.
    pub fn merge_file(
        &self,
        file_path: &str,
        baseline: &str,
        snapshots: &[TaskSnapshot],
    ) -> FileMergeReport {
        let conflicts = self.classifier.classify(file_path, snapshots);
        tracing::info!(
            file = file_path,
            tasks = snapshots.len(),
            conflicts = conflicts.len(),
            "merging file"
        );

        if conflicts.is_empty() {
            let merged_content = match snapshots {
                [single] => apply_single_task_changes(baseline, single, file_path),
                many => combine_non_conflicting_changes(baseline, many, file_path),
            };
            return FileMergeReport {
                file_path: file_path.to_string(),
                merged_content,
                conflicts,
                region_results: Vec::new(),
                all_resolved: true,
            };
        }

        // Changes outside every conflict region apply directly through the
        // splicer before any region is resolved.
        let conflict_locations: Vec<&str> =
            conflicts.iter().map(|c| c.location.as_str()).collect();
        let calm_snapshots: Vec<TaskSnapshot> = snapshots
            .iter()
            .map(|s| TaskSnapshot {
                task_id: s.task_id.clone(),
                task_intent: s.task_intent.clone(),
                started_at: s.started_at,
                semantic_changes: s
                    .semantic_changes
                    .iter()
                    .filter(|c| !conflict_locations.contains(&c.location.as_str()))
                    .cloned()
                    .collect(),
            })
            .collect();
        let mut content = combine_non_conflicting_changes(baseline, &calm_snapshots, file_path);

        let mut region_results = Vec::new();
        let mut all_resolved = true;
        for conflict in &conflicts {
            let region_snapshots = snapshots_for_region(snapshots, conflict);
            let result = if conflict.can_auto_merge {
                let context = MergeContext {
                    file_path: file_path.to_string(),
                    baseline_content: content.clone(),
                    task_snapshots: region_snapshots,
                    conflict: conflict.clone(),
                };
                self.auto_merger.merge(&context, conflict.merge_strategy)
            } else {
                self.resolver
                    .resolve_conflict(conflict, &content, &region_snapshots)
            };

            match &result.merged_content {
                Some(merged) if result.is_success() => content = merged.clone(),
                _ => {
                    all_resolved = false;
                    tracing::warn!(
                        file = file_path,
                        location = %conflict.location,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "conflict region left unresolved"
                    );
                }
            }
            region_results.push(result);
        }

        FileMergeReport {
            file_path: file_path.to_string(),
            merged_content: content,
            conflicts,
            region_results,
            all_resolved,
        }
    }
}

/// Restrict snapshots to the tasks and changes of one region, keeping task
/// encounter order.
fn snapshots_for_region(snapshots: &[TaskSnapshot], conflict: &ConflictRegion) -> Vec<TaskSnapshot> {
    snapshots
        .iter()
        .filter(|s| conflict.tasks_involved.contains(&s.task_id))
        .map(|s| TaskSnapshot {
            task_id: s.task_id.clone(),
            task_intent: s.task_intent.clone(),
            started_at: s.started_at,
            semantic_changes: s
                .semantic_changes
                .iter()
                .filter(|c| c.location == conflict.location)
                .cloned()
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ModelCall, ResolveError};
    use crate::types::{ChangeType, MergeDecision, SemanticChange};
    use chrono::{TimeZone, Utc};

    fn snapshot(id: &str, changes: Vec<SemanticChange>) -> TaskSnapshot {
        TaskSnapshot {
            task_id: id.into(),
            task_intent: format!("task {id}"),
            started_at: Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap(),
            semantic_changes: changes,
        }
    }

    fn change(
        ct: ChangeType,
        target: &str,
        location: &str,
        before: Option<&str>,
        after: Option<&str>,
    ) -> SemanticChange {
        SemanticChange {
            change_type: ct,
            target: target.into(),
            location: location.into(),
            line_start: 1,
            line_end: 1,
            content_before: before.map(String::from),
            content_after: after.map(String::from),
        }
    }

    fn engine() -> MergeEngine {
        MergeEngine::new(Arc::new(ParserRegistry::empty()))
    }

    #[test]
    fn test_non_conflicting_tasks_combined_directly() {
        let baseline = "import os\nimport sys\n\nVALUE = 1\n";
        let snapshots = vec![
            snapshot(
                "task-001",
                vec![change(
                    ChangeType::RemoveImport,
                    "sys",
                    "file_top",
                    Some("import sys"),
                    None,
                )],
            ),
            snapshot(
                "task-002",
                vec![change(
                    ChangeType::AddVariable,
                    "NEW_VALUE",
                    "file_bottom",
                    None,
                    Some("NEW_VALUE = 2"),
                )],
            ),
        ];
        let report = engine().merge_file("app.py", baseline, &snapshots);
        assert!(report.all_resolved);
        assert!(report.conflicts.is_empty());
        assert!(!report.merged_content.contains("import sys"));
        assert!(report.merged_content.contains("NEW_VALUE = 2"));
    }

    #[test]
    fn test_import_conflict_auto_merged() {
        let baseline = "import os\n\nprint('hi')\n";
        let snapshots = vec![
            snapshot(
                "task-001",
                vec![change(ChangeType::AddImport, "json", "file_top", None, Some("import json"))],
            ),
            snapshot(
                "task-002",
                vec![change(ChangeType::AddImport, "re", "file_top", None, Some("import re"))],
            ),
        ];
        let report = engine().merge_file("app.py", baseline, &snapshots);
        assert!(report.all_resolved);
        assert_eq!(report.region_results.len(), 1);
        assert_eq!(
            report.region_results[0].decision,
            MergeDecision::AutoMerged
        );
        assert!(report.merged_content.contains("import json"));
        assert!(report.merged_content.contains("import re"));
    }

    #[test]
    fn test_high_severity_without_model_fails_region() {
        let baseline = "def f():\n    return 1\n";
        let before = "def f():\n    return 1";
        let snapshots = vec![
            snapshot(
                "task-001",
                vec![change(
                    ChangeType::ModifyFunction,
                    "f",
                    "function:f",
                    Some(before),
                    Some("def f():\n    return 2"),
                )],
            ),
            snapshot(
                "task-002",
                vec![change(
                    ChangeType::ModifyFunction,
                    "f",
                    "function:f",
                    Some(before),
                    Some("def f():\n    return 3"),
                )],
            ),
        ];
        let report = engine().merge_file("app.py", baseline, &snapshots);
        assert!(!report.all_resolved);
        assert_eq!(report.region_results[0].decision, MergeDecision::Failed);
        // Baseline untouched when the only region failed.
        assert_eq!(report.merged_content, baseline);
    }

    #[test]
    fn test_high_severity_routed_to_model() {
        struct TakeSecond;
        impl ModelCall for TakeSecond {
            fn complete(&self, _s: &str, _u: &str) -> Result<String, ResolveError> {
                Ok("```python\ndef f():\n    return 3\n```".into())
            }
        }
        let engine = MergeEngine::with_resolver(
            Arc::new(ParserRegistry::empty()),
            AiResolver::new(Box::new(TakeSecond)),
        );
        let baseline = "def f():\n    return 1\n";
        let before = "def f():\n    return 1";
        let snapshots = vec![
            snapshot(
                "task-001",
                vec![change(
                    ChangeType::ModifyFunction,
                    "f",
                    "function:f",
                    Some(before),
                    Some("def f():\n    return 2"),
                )],
            ),
            snapshot(
                "task-002",
                vec![change(
                    ChangeType::ModifyFunction,
                    "f",
                    "function:f",
                    Some(before),
                    Some("def f():\n    return 3"),
                )],
            ),
        ];
        let report = engine.merge_file("app.py", baseline, &snapshots);
        assert!(report.all_resolved);
        assert_eq!(report.region_results[0].decision, MergeDecision::AiMerged);
        assert!(report.merged_content.contains("return 3"));
    }
}
