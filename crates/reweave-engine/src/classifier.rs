//! Conflict classification.
//!
//! Groups every task's changes by the location they touch; a location with
//! two or more tasks is a candidate conflict region. Each region gets a
//! severity and a merge strategy from a priority-ordered table keyed on the
//! change types present. A region with no matching strategy at high
//! severity escalates to the model-assisted path.

use std::collections::BTreeMap;

use crate::types::{
    ChangeType, ConflictRegion, ConflictSeverity, MergeStrategy, SemanticChange, TaskSnapshot,
};

/// Classifies overlapping task edits into conflict regions.
#[derive(Debug, Default)]
pub struct ConflictClassifier;

impl ConflictClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Produce the conflict regions for one file given every task's
    /// snapshot. Locations touched by a single task are not conflicts.
    pub fn classify(&self, file_path: &str, snapshots: &[TaskSnapshot]) -> Vec<ConflictRegion> {
        let mut by_location: BTreeMap<String, Vec<(&TaskSnapshot, &SemanticChange)>> =
            BTreeMap::new();
        for snapshot in snapshots {
            for change in &snapshot.semantic_changes {
                by_location
                    .entry(change.location.clone())
                    .or_default()
                    .push((snapshot, change));
            }
        }

        let mut regions = Vec::new();
        for (location, entries) in &by_location {
            let mut tasks_involved: Vec<String> = Vec::new();
            for (snapshot, _) in entries {
                if !tasks_involved.contains(&snapshot.task_id) {
                    tasks_involved.push(snapshot.task_id.clone());
                }
            }
            if tasks_involved.len() < 2 {
                continue;
            }

            let change_types: Vec<ChangeType> =
                entries.iter().map(|(_, c)| c.change_type).collect();
            let severity = severity_of(entries);
            let strategy = assign_strategy(&change_types, severity);
            let can_auto_merge = strategy != MergeStrategy::AiRequired;

            tracing::debug!(
                file = file_path,
                location = %location,
                tasks = tasks_involved.len(),
                severity = ?severity,
                strategy = %strategy,
                "conflict region classified"
            );

            regions.push(ConflictRegion {
                file_path: file_path.to_string(),
                location: location.clone(),
                tasks_involved,
                change_types,
                severity,
                can_auto_merge,
                merge_strategy: strategy,
            });
        }
        regions
    }
}

/// Severity policy:
/// High when two tasks rewrite the same before-span, or one removes what
/// another modifies; Medium when the same named region is modified by
/// several tasks without span overlap; Low for disjoint additive changes.
fn severity_of(entries: &[(&TaskSnapshot, &SemanticChange)]) -> ConflictSeverity {
    for (i, (snap_a, a)) in entries.iter().enumerate() {
        for (snap_b, b) in entries.iter().skip(i + 1) {
            if snap_a.task_id == snap_b.task_id {
                continue;
            }
            if a.is_modification() && b.is_modification() && spans_overlap(a, b) {
                return ConflictSeverity::High;
            }
            let removal_races_modification = (a.is_removal() && b.is_modification())
                || (b.is_removal() && a.is_modification());
            if removal_races_modification && (a.target == b.target || spans_overlap(a, b)) {
                return ConflictSeverity::High;
            }
        }
    }

    let mut modifying_tasks: Vec<&str> = Vec::new();
    for (snapshot, change) in entries {
        if change.is_modification() && !modifying_tasks.contains(&snapshot.task_id.as_str()) {
            modifying_tasks.push(snapshot.task_id.as_str());
        }
    }
    if modifying_tasks.len() >= 2 {
        return ConflictSeverity::Medium;
    }

    ConflictSeverity::Low
}

fn spans_overlap(a: &SemanticChange, b: &SemanticChange) -> bool {
    match (a.content_before.as_deref(), b.content_before.as_deref()) {
        (Some(a), Some(b)) => a == b || a.contains(b) || b.contains(a),
        _ => false,
    }
}

/// Priority-ordered strategy table over the multiset of change types at the
/// location.
fn assign_strategy(change_types: &[ChangeType], severity: ConflictSeverity) -> MergeStrategy {
    let all = |pred: fn(&ChangeType) -> bool| change_types.iter().all(pred);
    let has = |ct: ChangeType| change_types.contains(&ct);

    if all(|ct| matches!(ct, ChangeType::AddImport | ChangeType::RemoveImport)) {
        return MergeStrategy::CombineImports;
    }
    if has(ChangeType::AddHookCall)
        && has(ChangeType::WrapJsx)
        && all(|ct| matches!(ct, ChangeType::AddHookCall | ChangeType::WrapJsx))
    {
        return MergeStrategy::HooksThenWrap;
    }
    if all(|ct| matches!(ct, ChangeType::AddHookCall)) {
        return MergeStrategy::HooksFirst;
    }
    if all(|ct| matches!(ct, ChangeType::AddMethod)) {
        return MergeStrategy::AppendMethods;
    }
    if all(|ct| matches!(ct, ChangeType::AddFunction)) {
        return MergeStrategy::AppendFunctions;
    }
    if all(|ct| matches!(ct, ChangeType::ModifyJsxProps)) {
        return MergeStrategy::CombineProps;
    }
    if all(|ct| {
        matches!(
            ct,
            ChangeType::AddVariable | ChangeType::AddConstant | ChangeType::AddJsxElement
        )
    }) {
        return MergeStrategy::AppendStatements;
    }
    if all(|ct| ct.is_additive()) {
        return MergeStrategy::OrderByDependency;
    }
    if severity < ConflictSeverity::High
        && all(|ct| {
            matches!(
                ct,
                ChangeType::ModifyFunction | ChangeType::ModifyClass | ChangeType::ModifyJsxProps
            )
        })
    {
        return MergeStrategy::OrderByTime;
    }

    MergeStrategy::AiRequired
}
