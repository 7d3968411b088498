//! Core types for the merge engine.
//!
//! The engine models a file as a map of named structural elements (imports,
//! functions, classes, methods, variables) and an agent task's edits as an
//! ordered list of typed semantic changes against a shared baseline. All
//! downstream stages — conflict classification, deterministic auto-merge,
//! model-assisted resolution — speak these types and nothing else.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of structural element extracted from a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Import,
    ImportFrom,
    Function,
    Method,
    Class,
    Variable,
    Interface,
    TypeAlias,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Import => "import",
            ElementKind::ImportFrom => "import_from",
            ElementKind::Function => "function",
            ElementKind::Method => "method",
            ElementKind::Class => "class",
            ElementKind::Variable => "variable",
            ElementKind::Interface => "interface",
            ElementKind::TypeAlias => "type",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named structural unit of a file.
///
/// Keyed `"{kind}:{name}"` within a file; the extraction map enforces key
/// uniqueness per pass. Method names are qualified as `Parent.child`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedElement {
    pub kind: ElementKind,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Verbatim source text of the element.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl ExtractedElement {
    /// The map key for this element within one extraction pass.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}

/// Closed taxonomy of detected structural deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    AddImport,
    RemoveImport,
    AddFunction,
    RemoveFunction,
    ModifyFunction,
    AddMethod,
    ModifyClass,
    AddVariable,
    AddConstant,
    AddHookCall,
    WrapJsx,
    AddJsxElement,
    ModifyJsxProps,
}

impl ChangeType {
    /// Change types that only ever add code, never touch existing spans.
    pub fn is_additive(&self) -> bool {
        matches!(
            self,
            ChangeType::AddImport
                | ChangeType::AddFunction
                | ChangeType::AddMethod
                | ChangeType::AddVariable
                | ChangeType::AddConstant
                | ChangeType::AddHookCall
                | ChangeType::AddJsxElement
        )
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeType::AddImport => "add_import",
            ChangeType::RemoveImport => "remove_import",
            ChangeType::AddFunction => "add_function",
            ChangeType::RemoveFunction => "remove_function",
            ChangeType::ModifyFunction => "modify_function",
            ChangeType::AddMethod => "add_method",
            ChangeType::ModifyClass => "modify_class",
            ChangeType::AddVariable => "add_variable",
            ChangeType::AddConstant => "add_constant",
            ChangeType::AddHookCall => "add_hook_call",
            ChangeType::WrapJsx => "wrap_jsx",
            ChangeType::AddJsxElement => "add_jsx_element",
            ChangeType::ModifyJsxProps => "modify_jsx_props",
        };
        f.write_str(s)
    }
}

/// One detected structural delta against the baseline.
///
/// The verb is encoded in the content fields: only `content_before` is a
/// removal, only `content_after` is an addition, both is a modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticChange {
    pub change_type: ChangeType,
    /// Element name, possibly qualified as `Parent.child`.
    pub target: String,
    /// Where to re-locate the element later: `function:Name`, `class:Name`,
    /// `file_top`, or `file_bottom`.
    pub location: String,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_after: Option<String>,
}

impl SemanticChange {
    pub fn is_addition(&self) -> bool {
        self.content_after.is_some() && self.content_before.is_none()
    }

    pub fn is_removal(&self) -> bool {
        self.content_before.is_some() && self.content_after.is_none()
    }

    pub fn is_modification(&self) -> bool {
        self.content_before.is_some() && self.content_after.is_some()
    }

    /// Whether this change only adds code (by type and by verb).
    pub fn is_additive(&self) -> bool {
        self.change_type.is_additive() && !self.is_removal()
    }

    pub fn lines_touched(&self) -> usize {
        self.line_end.saturating_sub(self.line_start) + 1
    }
}

/// Per-file result of semantic differencing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file_path: String,
    pub changes: Vec<SemanticChange>,
    pub functions_added: Vec<String>,
    pub functions_modified: Vec<String>,
    pub imports_added: Vec<String>,
    pub imports_removed: Vec<String>,
    pub classes_modified: Vec<String>,
    pub total_lines_changed: usize,
}

impl FileAnalysis {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    /// Record a change, updating the derived summary sets.
    pub fn push(&mut self, change: SemanticChange) {
        match change.change_type {
            ChangeType::ModifyFunction | ChangeType::AddHookCall => {
                push_unique(&mut self.functions_modified, &change.target);
            }
            ChangeType::AddFunction => {
                push_unique(&mut self.functions_added, &change.target);
            }
            ChangeType::AddImport => {
                push_unique(&mut self.imports_added, &change.target);
            }
            ChangeType::RemoveImport => {
                push_unique(&mut self.imports_removed, &change.target);
            }
            ChangeType::ModifyClass | ChangeType::AddMethod => {
                let class = change.target.split('.').next().unwrap_or(&change.target);
                push_unique(&mut self.classes_modified, class);
            }
            _ => {}
        }
        self.total_lines_changed += change.lines_touched();
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn push_unique(set: &mut Vec<String>, value: &str) {
    if !set.iter().any(|v| v == value) {
        set.push(value.to_string());
    }
}

/// One task's recorded contribution to a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    /// Free-text description of what the task set out to do.
    pub task_intent: String,
    /// Used to order changes chronologically where a strategy requires it.
    pub started_at: DateTime<Utc>,
    pub semantic_changes: Vec<SemanticChange>,
}

/// How risky a conflict region is.
/// Ordered Low < Medium < High so that derived Ord works correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    /// Disjoint, purely additive changes.
    Low,
    /// Same named region modified, but the textual spans do not overlap.
    Medium,
    /// Overlapping spans, or a removal racing a modification.
    High,
}

/// Deterministic merge strategies, plus the escalation sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    CombineImports,
    HooksFirst,
    HooksThenWrap,
    AppendFunctions,
    AppendMethods,
    CombineProps,
    OrderByDependency,
    OrderByTime,
    AppendStatements,
    /// No deterministic strategy applies; escalate to the model call.
    AiRequired,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeStrategy::CombineImports => "combine_imports",
            MergeStrategy::HooksFirst => "hooks_first",
            MergeStrategy::HooksThenWrap => "hooks_then_wrap",
            MergeStrategy::AppendFunctions => "append_functions",
            MergeStrategy::AppendMethods => "append_methods",
            MergeStrategy::CombineProps => "combine_props",
            MergeStrategy::OrderByDependency => "order_by_dependency",
            MergeStrategy::OrderByTime => "order_by_time",
            MergeStrategy::AppendStatements => "append_statements",
            MergeStrategy::AiRequired => "ai_required",
        };
        f.write_str(s)
    }
}

/// A location where two or more tasks' changes interact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRegion {
    pub file_path: String,
    pub location: String,
    pub tasks_involved: Vec<String>,
    pub change_types: Vec<ChangeType>,
    pub severity: ConflictSeverity,
    pub can_auto_merge: bool,
    pub merge_strategy: MergeStrategy,
}

/// Outcome category of merging one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    AutoMerged,
    AiMerged,
    Failed,
}

/// Outcome of merging one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub decision: MergeDecision,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,
    #[serde(default)]
    pub conflicts_resolved: Vec<ConflictRegion>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MergeResult {
    pub fn failed(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            decision: MergeDecision::Failed,
            file_path: file_path.into(),
            merged_content: None,
            conflicts_resolved: Vec::new(),
            explanation: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.decision, MergeDecision::Failed)
    }
}

/// Everything a strategy handler needs to resolve one conflict region.
#[derive(Debug, Clone)]
pub struct MergeContext {
    pub file_path: String,
    pub baseline_content: String,
    pub task_snapshots: Vec<TaskSnapshot>,
    pub conflict: ConflictRegion,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(ct: ChangeType, before: Option<&str>, after: Option<&str>) -> SemanticChange {
        SemanticChange {
            change_type: ct,
            target: "x".into(),
            location: "file_top".into(),
            line_start: 1,
            line_end: 1,
            content_before: before.map(String::from),
            content_after: after.map(String::from),
        }
    }

    #[test]
    fn test_change_verb_encoding() {
        assert!(change(ChangeType::AddImport, None, Some("import os")).is_addition());
        assert!(change(ChangeType::RemoveImport, Some("import os"), None).is_removal());
        assert!(change(ChangeType::ModifyFunction, Some("a"), Some("b")).is_modification());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ConflictSeverity::Low < ConflictSeverity::Medium);
        assert!(ConflictSeverity::Medium < ConflictSeverity::High);
    }

    #[test]
    fn test_analysis_summary_sets() {
        let mut analysis = FileAnalysis::new("app.tsx");
        let mut add_fn = change(ChangeType::AddFunction, None, Some("function f() {}"));
        add_fn.target = "f".into();
        let mut add_method = change(ChangeType::AddMethod, None, Some("m() {}"));
        add_method.target = "Widget.m".into();
        analysis.push(add_fn);
        analysis.push(add_method);

        assert_eq!(analysis.functions_added, vec!["f"]);
        assert_eq!(analysis.classes_modified, vec!["Widget"]);
        assert_eq!(analysis.total_lines_changed, 2);
    }

    #[test]
    fn test_element_key() {
        let elem = ExtractedElement {
            kind: ElementKind::Method,
            name: "Greeter.greet".into(),
            start_line: 2,
            end_line: 4,
            content: "def greet(self): ...".into(),
            parent: Some("Greeter".into()),
        };
        assert_eq!(elem.key(), "method:Greeter.greet");
    }
}
