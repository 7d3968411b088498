//! Model-assisted conflict resolution.
//!
//! For regions no deterministic strategy can merge, the resolver builds a
//! minimal-context prompt — the conflicting region's extracted content plus
//! each task's relevant changes, never the whole file — invokes the injected
//! model call, extracts the fenced code block from the response, and splices
//! it back over the region.
//!
//! The model call is a capability: when none is configured the resolver
//! degrades to reporting failure instead of raising, and a model error or a
//! response without a code block produces a failed result with the raw
//! response preserved for diagnostics. Nothing escapes this boundary.

use std::sync::OnceLock;

use regex::Regex;

use crate::splicer::{apply_ai_merge, extract_location_content, find_location_span};
use crate::types::{
    ConflictRegion, MergeDecision, MergeResult, SemanticChange, TaskSnapshot,
};

/// Injected model capability: `(system_prompt, user_prompt) -> response`.
pub trait ModelCall: Send + Sync {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ResolveError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no model call configured")]
    Disabled,
    #[error("model call failed: {0}")]
    Model(String),
}

/// Fixed system prompt for merge resolution.
pub const SYSTEM_PROMPT: &str = "\
You are a merge resolution assistant. Several autonomous tasks edited the \
same region of one source file, starting from a shared baseline. Combine \
their intents into a single coherent version of that region.

Rules:
- Preserve every task's intended change unless two changes are mutually \
exclusive; in that case prefer the more recent task and say so.
- Do not rewrite code outside the given region.
- Keep the original formatting conventions of the region.
- Reply with exactly one fenced code block containing the fully merged \
region, and nothing else.";

/// Minimal per-conflict prompt context: the region, not the file.
#[derive(Debug, Clone)]
pub struct ConflictContext {
    pub file_path: String,
    pub location: String,
    pub region_content: String,
    pub tasks: Vec<TaskChanges>,
}

#[derive(Debug, Clone)]
pub struct TaskChanges {
    pub task_id: String,
    pub task_intent: String,
    pub changes: Vec<SemanticChange>,
}

impl ConflictContext {
    /// Assemble the context for one region: its current content plus each
    /// involved task's changes at that location.
    pub fn build(
        conflict: &ConflictRegion,
        baseline_content: &str,
        snapshots: &[TaskSnapshot],
    ) -> Self {
        let region_content = extract_location_content(baseline_content, &conflict.location);
        let tasks = snapshots
            .iter()
            .filter(|s| conflict.tasks_involved.contains(&s.task_id))
            .map(|s| TaskChanges {
                task_id: s.task_id.clone(),
                task_intent: s.task_intent.clone(),
                changes: s
                    .semantic_changes
                    .iter()
                    .filter(|c| c.location == conflict.location)
                    .cloned()
                    .collect(),
            })
            .collect();
        Self {
            file_path: conflict.file_path.clone(),
            location: conflict.location.clone(),
            region_content,
            tasks,
        }
    }

    /// Render the user prompt.
    pub fn render(&self) -> String {
        let mut prompt = format!(
            "File: {}\nRegion: {}\n\nCurrent region content:\n```\n{}\n```\n",
            self.file_path, self.location, self.region_content
        );
        for task in &self.tasks {
            prompt.push_str(&format!(
                "\nTask {} — {}\n",
                task.task_id, task.task_intent
            ));
            for change in &task.changes {
                prompt.push_str(&format!("- {} on `{}`\n", change.change_type, change.target));
                if let Some(before) = &change.content_before {
                    prompt.push_str(&format!("  before:\n```\n{before}\n```\n"));
                }
                if let Some(after) = &change.content_after {
                    prompt.push_str(&format!("  after:\n```\n{after}\n```\n"));
                }
            }
        }
        prompt.push_str("\nReturn the merged region as one fenced code block.");
        prompt
    }
}

/// Resolves conflicts through the injected model call.
pub struct AiResolver {
    model: Option<Box<dyn ModelCall>>,
}

impl AiResolver {
    pub fn new(model: Box<dyn ModelCall>) -> Self {
        Self { model: Some(model) }
    }

    /// A resolver with no model call: every resolution reports failure.
    pub fn disabled() -> Self {
        Self { model: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    /// Resolve one conflict region. Always returns a result; never panics
    /// and never propagates a model error.
    pub fn resolve_conflict(
        &self,
        conflict: &ConflictRegion,
        baseline_content: &str,
        snapshots: &[TaskSnapshot],
    ) -> MergeResult {
        let Some(model) = &self.model else {
            tracing::warn!(
                file = %conflict.file_path,
                location = %conflict.location,
                "AI resolution requested but no model call is configured"
            );
            return MergeResult::failed(&conflict.file_path, ResolveError::Disabled.to_string());
        };

        let context = ConflictContext::build(conflict, baseline_content, snapshots);
        let user_prompt = context.render();

        let response = match model.complete(SYSTEM_PROMPT, &user_prompt) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    file = %conflict.file_path,
                    location = %conflict.location,
                    error = %e,
                    "model call failed"
                );
                return MergeResult::failed(&conflict.file_path, e.to_string());
            }
        };

        let Some(merged_region) = extract_code_block(&response) else {
            return MergeResult::failed(
                &conflict.file_path,
                format!("no code block in model response: {response}"),
            );
        };

        // When the location resolves to a span the merged region is spliced
        // over it; when it does not, the whole file was the region shown to
        // the model, so its output replaces the file.
        let merged = if find_location_span(baseline_content, &conflict.location).is_some() {
            apply_ai_merge(baseline_content, &conflict.location, Some(&merged_region))
        } else {
            merged_region.clone()
        };
        MergeResult {
            decision: MergeDecision::AiMerged,
            file_path: conflict.file_path.clone(),
            merged_content: Some(merged),
            conflicts_resolved: vec![conflict.clone()],
            explanation: format!(
                "Model-resolved {} involving {} tasks",
                conflict.location,
                conflict.tasks_involved.len()
            ),
            error: None,
        }
    }
}

/// First fenced code block of a response, language tag optional.
pub fn extract_code_block(response: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\n(.*?)```").expect("code block pattern")
    });
    re.captures(response)
        .map(|caps| caps[1].trim_end_matches('\n').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeType, ConflictSeverity, MergeStrategy};
    use chrono::{TimeZone, Utc};

    struct FixedModel(&'static str);

    impl ModelCall for FixedModel {
        fn complete(&self, _system: &str, _user: &str) -> Result<String, ResolveError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingModel;

    impl ModelCall for FailingModel {
        fn complete(&self, _system: &str, _user: &str) -> Result<String, ResolveError> {
            Err(ResolveError::Model("connection refused".into()))
        }
    }

    fn conflict() -> ConflictRegion {
        ConflictRegion {
            file_path: "app.py".into(),
            location: "function:main".into(),
            tasks_involved: vec!["task-001".into()],
            change_types: vec![ChangeType::ModifyFunction],
            severity: ConflictSeverity::High,
            can_auto_merge: false,
            merge_strategy: MergeStrategy::AiRequired,
        }
    }

    fn snapshots() -> Vec<TaskSnapshot> {
        vec![TaskSnapshot {
            task_id: "task-001".into(),
            task_intent: "Add logging".into(),
            started_at: Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap(),
            semantic_changes: vec![],
        }]
    }

    #[test]
    fn test_resolved_region_spliced_back() {
        let resolver = AiResolver::new(Box::new(FixedModel(
            "```python\ndef main():\n    print('merged')\n```",
        )));
        let baseline = "def main():\n    pass\n";
        let result = resolver.resolve_conflict(&conflict(), baseline, &snapshots());
        assert_eq!(result.decision, MergeDecision::AiMerged);
        assert!(result.merged_content.unwrap().contains("print('merged')"));
    }

    #[test]
    fn test_disabled_resolver_reports_failure() {
        let resolver = AiResolver::disabled();
        let result = resolver.resolve_conflict(&conflict(), "def main(): pass\n", &snapshots());
        assert_eq!(result.decision, MergeDecision::Failed);
        assert!(result.error.unwrap().contains("no model call configured"));
    }

    #[test]
    fn test_model_error_preserved() {
        let resolver = AiResolver::new(Box::new(FailingModel));
        let result = resolver.resolve_conflict(&conflict(), "def main(): pass\n", &snapshots());
        assert_eq!(result.decision, MergeDecision::Failed);
        assert!(result.error.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_response_without_code_block_preserved() {
        let resolver = AiResolver::new(Box::new(FixedModel("cannot merge, sorry")));
        let result = resolver.resolve_conflict(&conflict(), "def main(): pass\n", &snapshots());
        assert_eq!(result.decision, MergeDecision::Failed);
        assert!(result.error.unwrap().contains("cannot merge, sorry"));
    }

    #[test]
    fn test_extract_code_block_variants() {
        assert_eq!(
            extract_code_block("```js\nconst a = 1;\n```").as_deref(),
            Some("const a = 1;")
        );
        assert_eq!(
            extract_code_block("prose\n```\nx\n```\nmore").as_deref(),
            Some("x")
        );
        assert_eq!(extract_code_block("no block here"), None);
    }

    #[test]
    fn test_context_is_region_scoped() {
        let baseline = "def main():\n    pass\n\ndef other():\n    pass\n";
        let context = ConflictContext::build(&conflict(), baseline, &snapshots());
        // Python functions have no brace-delimited span, so the region falls
        // back to the whole file; the prompt still names the location.
        assert_eq!(context.location, "function:main");
        let prompt = context.render();
        assert!(prompt.contains("Task task-001"));
        assert!(prompt.contains("Add logging"));
    }
}
