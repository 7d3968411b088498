//! Deterministic merge strategies.
//!
//! Each strategy combines several tasks' changes into one merged region
//! without model assistance. Dispatch is an exhaustive match over the closed
//! strategy enum; a handler error is caught at the dispatch boundary and
//! converted into a failed `MergeResult` — this component never propagates
//! to its caller.
//!
//! The hook, JSX, and class insertion transforms are regex-driven and
//! deliberately heuristic; their behavior is pinned by the tests below and
//! changing it changes observable merge outcomes.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::splicer::{detect_line_ending, replace_once, split_universal};
use crate::types::{
    ChangeType, MergeContext, MergeDecision, MergeResult, MergeStrategy, SemanticChange,
    TaskSnapshot,
};

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Performs deterministic merges without model assistance.
#[derive(Debug, Default)]
pub struct AutoMerger;

impl AutoMerger {
    pub fn new() -> Self {
        Self
    }

    /// Whether a strategy has a deterministic handler.
    pub fn can_handle(&self, strategy: MergeStrategy) -> bool {
        !matches!(strategy, MergeStrategy::AiRequired)
    }

    /// Perform a merge using the specified strategy. Never panics and never
    /// returns an error: failures come back as `MergeDecision::Failed`.
    pub fn merge(&self, context: &MergeContext, strategy: MergeStrategy) -> MergeResult {
        let outcome = match strategy {
            MergeStrategy::CombineImports => combine_imports(context),
            MergeStrategy::HooksFirst => hooks_first(context),
            MergeStrategy::HooksThenWrap => hooks_then_wrap(context),
            MergeStrategy::AppendFunctions => append_functions(context),
            MergeStrategy::AppendMethods => append_methods(context),
            MergeStrategy::CombineProps => combine_props(context),
            MergeStrategy::OrderByDependency => order_by_dependency(context),
            MergeStrategy::OrderByTime => order_by_time(context),
            MergeStrategy::AppendStatements => append_statements(context),
            MergeStrategy::AiRequired => {
                return MergeResult::failed(
                    &context.file_path,
                    format!("No handler for strategy: {strategy}"),
                );
            }
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(
                    file = %context.file_path,
                    strategy = %strategy,
                    error = %e,
                    "auto-merge failed"
                );
                MergeResult::failed(&context.file_path, format!("Auto-merge failed: {e}"))
            }
        }
    }
}

fn merged(context: &MergeContext, content: String, explanation: String) -> MergeResult {
    MergeResult {
        decision: MergeDecision::AutoMerged,
        file_path: context.file_path.clone(),
        merged_content: Some(content),
        conflicts_resolved: vec![context.conflict.clone()],
        explanation,
        error: None,
    }
}

fn all_changes(context: &MergeContext) -> impl Iterator<Item = &SemanticChange> {
    context
        .task_snapshots
        .iter()
        .flat_map(|s| s.semantic_changes.iter())
}

// ── combine_imports ──────────────────────────────────────────

fn combine_imports(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let eol = detect_line_ending(&context.baseline_content);
    let lines = split_universal(&context.baseline_content);
    let file_path = context.file_path.as_str();

    let mut imports_to_add: Vec<String> = Vec::new();
    let mut imports_to_remove: Vec<String> = Vec::new();
    for change in all_changes(context) {
        match change.change_type {
            ChangeType::AddImport => {
                if let Some(after) = &change.content_after {
                    imports_to_add.push(after.trim().to_string());
                }
            }
            ChangeType::RemoveImport => {
                if let Some(before) = &change.content_before {
                    imports_to_remove.push(before.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let import_end = find_import_section_end(&lines, file_path);
    let existing: Vec<String> = lines[..import_end]
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| is_import_line(l, file_path))
        .collect();

    let mut new_imports: Vec<String> = Vec::new();
    for imp in &imports_to_add {
        if !existing.contains(imp)
            && !imports_to_remove.contains(imp)
            && !new_imports.contains(imp)
        {
            new_imports.push(imp.clone());
        }
    }

    let mut result_lines: Vec<String> = lines
        .into_iter()
        .filter(|l| !imports_to_remove.contains(&l.trim().to_string()))
        .collect();

    if !new_imports.is_empty() {
        let insert_pos = find_import_section_end(&result_lines, file_path);
        for imp in new_imports.iter().rev() {
            result_lines.insert(insert_pos, imp.clone());
        }
    }

    let explanation = format!(
        "Combined {} imports from {} tasks",
        new_imports.len(),
        context.task_snapshots.len()
    );
    Ok(merged(context, result_lines.join(eol), explanation))
}

/// End of the leading import section: the line after the last import before
/// the first real statement.
fn find_import_section_end(lines: &[String], file_path: &str) -> usize {
    let mut last_import = 0;
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if is_import_line(stripped, file_path) {
            last_import = i + 1;
        } else if !stripped.is_empty()
            && !stripped.starts_with('#')
            && !stripped.starts_with("//")
        {
            if last_import > 0 {
                break;
            }
        }
    }
    last_import
}

fn is_import_line(line: &str, file_path: &str) -> bool {
    match crate::language::ext_of(file_path).as_str() {
        "py" => line.starts_with("import ") || line.starts_with("from "),
        "js" | "jsx" | "ts" | "tsx" => {
            line.starts_with("import ") || line.starts_with("export ")
        }
        _ => false,
    }
}

// ── hooks_first / hooks_then_wrap ────────────────────────────

fn hooks_first(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let mut content = context.baseline_content.clone();

    let hooks: Vec<String> = all_changes(context)
        .filter(|c| c.change_type == ChangeType::AddHookCall)
        .filter_map(extract_hook_call)
        .collect();

    if let Some(func_name) = context.conflict.location.strip_prefix("function:") {
        content = insert_hooks_into_function(&content, func_name, &hooks)?;
    }

    let explanation = format!("Added {} hooks to function start", hooks.len());
    Ok(merged(context, content, explanation))
}

fn hooks_then_wrap(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let mut content = context.baseline_content.clone();

    let mut hooks: Vec<String> = Vec::new();
    let mut wraps: Vec<(String, String)> = Vec::new();
    for change in all_changes(context) {
        match change.change_type {
            ChangeType::AddHookCall => {
                if let Some(hook) = extract_hook_call(change) {
                    hooks.push(hook);
                }
            }
            ChangeType::WrapJsx => {
                if let Some(wrapper) = extract_jsx_wrapper(change) {
                    wraps.push(wrapper);
                }
            }
            _ => {}
        }
    }

    if let Some(func_name) = context.conflict.location.strip_prefix("function:") {
        if !hooks.is_empty() {
            content = insert_hooks_into_function(&content, func_name, &hooks)?;
        }
        for (wrapper_name, wrapper_props) in &wraps {
            content = wrap_function_return(&content, wrapper_name, wrapper_props)?;
        }
    }

    let explanation = format!(
        "Added {} hooks and {} JSX wrappers",
        hooks.len(),
        wraps.len()
    );
    Ok(merged(context, content, explanation))
}

/// Pull the `use<Name>(...)` expression out of a hook change, keeping a
/// `const {..} =` binding when present.
fn extract_hook_call(change: &SemanticChange) -> Option<String> {
    static BOUND: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();
    let after = change.content_after.as_deref()?;

    let bound = BOUND.get_or_init(|| {
        Regex::new(r"(?:const\s+(?:\{[^}]+\}|\[[^\]]+\]|\w+)\s*=\s*)?use\w+\([^)]*\);?")
            .expect("bound hook pattern")
    });
    if let Some(m) = bound.find(after) {
        return Some(m.as_str().to_string());
    }
    let bare = BARE.get_or_init(|| Regex::new(r"use\w+\([^)]*\);?").expect("bare hook pattern"));
    bare.find(after).map(|m| m.as_str().to_string())
}

/// Wrapper element name and props from a JSX wrap change.
fn extract_jsx_wrapper(change: &SemanticChange) -> Option<(String, String)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let after = change.content_after.as_deref()?;
    let re = PATTERN.get_or_init(|| Regex::new(r"<(\w+)([^>]*)>").expect("jsx wrapper pattern"));
    re.captures(after)
        .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
}

/// Insert hook calls right after the opening brace of the named function.
/// Matches the three declaration shapes: named function, arrow assigned to
/// const/let/var, function expression assigned to const/let/var.
fn insert_hooks_into_function(
    content: &str,
    func_name: &str,
    hooks: &[String],
) -> Result<String, StrategyError> {
    if hooks.is_empty() {
        return Ok(content.to_string());
    }
    let escaped = regex::escape(func_name);
    let patterns = [
        format!(r"function\s+{escaped}\s*\([^)]*\)\s*\{{"),
        format!(r"(?:const|let|var)\s+{escaped}\s*=\s*(?:async\s+)?(?:\([^)]*\)|[^=]+?)\s*=>\s*\{{"),
        format!(r"(?:const|let|var)\s+{escaped}\s*=\s*function\s*\([^)]*\)\s*\{{"),
    ];

    for pattern in &patterns {
        let re = Regex::new(pattern)?;
        if let Some(m) = re.find(content) {
            let insert_pos = m.end();
            let hook_text = format!("\n  {}", hooks.join("\n  "));
            let mut updated = String::with_capacity(content.len() + hook_text.len());
            updated.push_str(&content[..insert_pos]);
            updated.push_str(&hook_text);
            updated.push_str(&content[insert_pos..]);
            return Ok(updated);
        }
    }
    Ok(content.to_string())
}

/// Wrap the first `return (<JSX` expression in a new element. The closing
/// tag is not synthesized; regions that need it escalate to the model path.
fn wrap_function_return(
    content: &str,
    wrapper_name: &str,
    wrapper_props: &str,
) -> Result<String, StrategyError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r"(return\s*\(\s*)(<[^>]+>)").expect("return jsx pattern"));

    let props = if wrapper_props.is_empty() {
        String::new()
    } else {
        format!(" {wrapper_props}")
    };
    let updated = re.replace(content, |caps: &regex::Captures<'_>| {
        format!(
            "{}<{}{}>\n      {}",
            &caps[1], wrapper_name, props, &caps[2]
        )
    });
    Ok(updated.into_owned())
}

// ── append_functions / append_methods ────────────────────────

fn append_functions(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let eol = detect_line_ending(&context.baseline_content);

    let new_functions: Vec<String> = all_changes(context)
        .filter(|c| c.change_type == ChangeType::AddFunction)
        .filter_map(|c| c.content_after.clone())
        .collect();

    let mut content = context.baseline_content.clone();
    match find_function_insert_position(&content) {
        Some(pos) => {
            let mut lines = split_universal(&content);
            let mut insert_pos = pos;
            for func in &new_functions {
                lines.insert(insert_pos, String::new());
                lines.insert(insert_pos + 1, func.clone());
                insert_pos += 2 + func.matches('\n').count();
            }
            content = lines.join(eol);
        }
        None => {
            for func in &new_functions {
                content.push_str(eol);
                content.push_str(eol);
                content.push_str(func);
            }
        }
    }

    let explanation = format!("Appended {} new functions", new_functions.len());
    Ok(merged(context, content, explanation))
}

/// Line index of a trailing `module.exports` / `export default` statement.
fn find_function_insert_position(content: &str) -> Option<usize> {
    let lines = split_universal(content);
    for (i, line) in lines.iter().enumerate().rev() {
        let stripped = line.trim();
        if stripped.starts_with("module.exports") || stripped.starts_with("export default") {
            return Some(i);
        }
    }
    None
}

fn append_methods(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let mut new_methods: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for change in all_changes(context) {
        if change.change_type != ChangeType::AddMethod {
            continue;
        }
        let Some(after) = &change.content_after else {
            continue;
        };
        if let Some((class_name, _)) = change.target.split_once('.') {
            new_methods
                .entry(class_name.to_string())
                .or_default()
                .push(after.clone());
        }
    }

    let mut content = context.baseline_content.clone();
    for (class_name, methods) in &new_methods {
        content = insert_methods_into_class(&content, class_name, methods)?;
    }

    let total: usize = new_methods.values().map(Vec::len).sum();
    let explanation = format!("Added {} methods to {} classes", total, new_methods.len());
    Ok(merged(context, content, explanation))
}

/// Insert methods before the closing brace of a class, located by
/// brace-depth counting.
fn insert_methods_into_class(
    content: &str,
    class_name: &str,
    methods: &[String],
) -> Result<String, StrategyError> {
    let re = Regex::new(&format!(
        r"class\s+{}\s*(?:extends\s+\w+)?\s*\{{",
        regex::escape(class_name)
    ))?;
    let Some(m) = re.find(content) else {
        return Ok(content.to_string());
    };

    let start = m.end();
    let mut depth = 1usize;
    let bytes = content.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && depth > 0 {
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => depth -= 1,
            _ => {}
        }
        pos += 1;
    }
    if depth != 0 {
        return Ok(content.to_string());
    }

    let insert_pos = pos - 1;
    let method_text = format!("\n\n  {}", methods.join("\n\n  "));
    let mut updated = String::with_capacity(content.len() + method_text.len());
    updated.push_str(&content[..insert_pos]);
    updated.push_str(&method_text);
    updated.push_str(&content[insert_pos..]);
    Ok(updated)
}

// ── combine_props ────────────────────────────────────────────

/// Best effort: the most recent task's final region content wins. Not a
/// true prop-object merge.
fn combine_props(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let mut content = context.baseline_content.clone();

    if let Some(last_change) = context
        .task_snapshots
        .last()
        .and_then(|s| s.semantic_changes.last())
    {
        if let Some(after) = &last_change.content_after {
            if let Some(before) = &last_change.content_before {
                if content.contains(before.as_str()) {
                    content = replace_once(&content, before, after);
                }
            }
        }
    }

    let explanation = format!(
        "Combined props from {} tasks (last writer wins)",
        context.task_snapshots.len()
    );
    Ok(merged(context, content, explanation))
}

// ── order_by_dependency / order_by_time ──────────────────────

fn dependency_priority(change_type: ChangeType) -> u8 {
    match change_type {
        ChangeType::AddImport => 0,
        ChangeType::AddHookCall => 1,
        ChangeType::AddVariable | ChangeType::AddConstant => 2,
        ChangeType::WrapJsx => 3,
        ChangeType::AddJsxElement => 4,
        ChangeType::ModifyFunction | ChangeType::ModifyJsxProps => 5,
        _ => 10,
    }
}

fn order_by_dependency(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let mut ordered: Vec<&SemanticChange> = all_changes(context).collect();
    ordered.sort_by_key(|c| dependency_priority(c.change_type));

    let mut content = context.baseline_content.clone();
    for change in &ordered {
        if change.content_after.is_none() {
            continue;
        }
        let func_name = change
            .target
            .rsplit('.')
            .next()
            .unwrap_or(&change.target)
            .to_string();
        match change.change_type {
            ChangeType::AddHookCall => {
                if let Some(hook) = extract_hook_call(change) {
                    content = insert_hooks_into_function(&content, &func_name, &[hook])?;
                }
            }
            ChangeType::WrapJsx => {
                if let Some((wrapper_name, wrapper_props)) = extract_jsx_wrapper(change) {
                    content = wrap_function_return(&content, &wrapper_name, &wrapper_props)?;
                }
            }
            _ => {}
        }
    }

    Ok(merged(
        context,
        content,
        "Changes applied in dependency order".to_string(),
    ))
}

/// Replay modification changes in chronological task order. Pure additions
/// are intentionally skipped here; the classifier only picks this strategy
/// for all-modification regions.
fn order_by_time(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let mut sorted: Vec<&TaskSnapshot> = context.task_snapshots.iter().collect();
    sorted.sort_by_key(|s| s.started_at);

    let mut content = context.baseline_content.clone();
    for snapshot in &sorted {
        for change in &snapshot.semantic_changes {
            if let (Some(before), Some(after)) =
                (change.content_before.as_deref(), change.content_after.as_deref())
            {
                if content.contains(before) {
                    content = replace_once(&content, before, after);
                }
            }
        }
    }

    let explanation = format!(
        "Applied {} tasks' changes in chronological order",
        sorted.len()
    );
    Ok(merged(context, content, explanation))
}

// ── append_statements ────────────────────────────────────────

fn append_statements(context: &MergeContext) -> Result<MergeResult, StrategyError> {
    let eol = detect_line_ending(&context.baseline_content);
    let additions: Vec<String> = all_changes(context)
        .filter(|c| c.is_additive())
        .filter_map(|c| c.content_after.clone())
        .collect();

    let mut content = context.baseline_content.clone();
    for addition in &additions {
        content.push_str(eol);
        content.push_str(addition);
    }

    let explanation = format!("Appended {} statements", additions.len());
    Ok(merged(context, content, explanation))
}
