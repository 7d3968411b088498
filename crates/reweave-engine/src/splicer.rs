//! Content splicing primitives.
//!
//! Everything here rewrites file text by region: replace-once and
//! remove-once, whole-line import stripping, import-block insertion,
//! class-body insertion (indentation-scan for Python, brace-depth for the
//! JS family), and location-span resolution for `function:Name` /
//! `class:Name` strings. Untouched content is preserved byte for byte; the
//! baseline's line-ending style (`\n`, `\r\n`, `\r`) is detected once and
//! every rewritten line uses it.
//!
//! When a region cannot be re-located (renamed or moved function), the
//! extraction functions return the input unchanged, which callers treat as
//! "the whole file is the region" — never as an error.

use regex::Regex;

use crate::language::ext_of;
use crate::types::{ChangeType, SemanticChange, TaskSnapshot};

/// Detect the dominant line-ending style of `content`.
pub fn detect_line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") {
        "\r\n"
    } else if content.contains('\r') {
        "\r"
    } else {
        "\n"
    }
}

/// Split on any line-ending style. A trailing terminator yields a trailing
/// empty element, so joining with the detected ending round-trips exactly.
pub(crate) fn split_universal(content: &str) -> Vec<String> {
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(String::from)
        .collect()
}

/// Rewrite a block's internal line endings to the target style.
fn normalize_eol(block: &str, eol: &str) -> String {
    block
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', eol)
}

/// Replace the first occurrence of `old` with `new`. At most one
/// substitution, ever.
pub fn replace_once(content: &str, old: &str, new: &str) -> String {
    if old.is_empty() || old == new {
        return content.to_string();
    }
    content.replacen(old, new, 1)
}

/// Remove the first occurrence of `block`, retrying with surrounding
/// newlines trimmed when the exact text is absent.
fn remove_once(content: &str, block: &str) -> String {
    if block.is_empty() {
        return content.to_string();
    }
    let updated = content.replacen(block, "", 1);
    if updated != content {
        return updated;
    }
    let trimmed = block.trim_matches('\n');
    if !trimmed.is_empty() && trimmed != block {
        return content.replacen(trimmed, "", 1);
    }
    content.to_string()
}

/// Strip whole lines whose stripped text matches a line of `block`. Each
/// target line is consumed at most once; substring matches never corrupt
/// neighbouring tokens.
fn remove_matching_lines(content: &str, block: &str) -> String {
    let targets: Vec<&str> = block
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if targets.is_empty() {
        return content.to_string();
    }
    let eol = detect_line_ending(content);
    let mut remaining: Vec<&str> = targets;
    let mut kept: Vec<String> = Vec::new();
    for line in split_universal(content) {
        let stripped = line.trim();
        if let Some(pos) = remaining.iter().position(|t| *t == stripped) {
            remaining.remove(pos);
            continue;
        }
        kept.push(line);
    }
    kept.join(eol)
}

fn location_names_region(location: &str) -> bool {
    location
        .split_once(':')
        .map(|(kind, _)| kind == "function" || kind == "class")
        .unwrap_or(false)
}

/// Try to apply a replace inside the named region only. `None` when the
/// region cannot be resolved or does not contain `old`.
fn maybe_replace_in_location(
    content: &str,
    location: &str,
    old: &str,
    new: &str,
) -> Option<String> {
    if !location_names_region(location) {
        return None;
    }
    let region = extract_location_content(content, location);
    if region.is_empty() || region == content {
        return None;
    }
    if region.contains(old) {
        let updated_region = region.replacen(old, new, 1);
        return Some(content.replacen(&region, &updated_region, 1));
    }
    if region == old {
        return Some(content.replacen(&region, new, 1));
    }
    None
}

fn maybe_remove_in_location(content: &str, location: &str, old: &str) -> Option<String> {
    maybe_replace_in_location(content, location, old, "")
}

/// Insert unique import lines at the end of the existing import block.
fn insert_imports(content: &str, imports: &[String], file_path: &str) -> String {
    if imports.is_empty() {
        return content.to_string();
    }
    let eol = detect_line_ending(content);
    let mut lines = split_universal(content);
    let import_end = find_import_end(&lines, file_path);
    let existing: Vec<String> = lines[..import_end]
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let mut new_imports: Vec<String> = Vec::new();
    for imp in imports {
        let stripped = imp.trim();
        if stripped.is_empty()
            || existing.iter().any(|e| e == stripped)
            || new_imports.iter().any(|e| e.trim() == stripped)
        {
            continue;
        }
        new_imports.push(imp.trim_end_matches(['\n', '\r']).to_string());
    }

    for imp in new_imports.into_iter().rev() {
        lines.insert(import_end, imp);
    }
    lines.join(eol)
}

/// Index just past the last import line — the insert position for new
/// imports.
pub fn find_import_end(lines: &[String], file_path: &str) -> usize {
    let ext = ext_of(file_path);
    let mut last_import = 0;
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        let is_import = match ext.as_str() {
            "py" => stripped.starts_with("import ") || stripped.starts_with("from "),
            "js" | "jsx" | "ts" | "tsx" => stripped.starts_with("import "),
            _ => false,
        };
        if is_import {
            last_import = i + 1;
        }
    }
    last_import
}

fn block_is_indented(block_lines: &[String], base_indent: usize) -> bool {
    for line in block_lines {
        if !line.trim().is_empty() {
            return indent_of(line) > base_indent;
        }
    }
    true
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn indent_block(block_lines: &[String], indent: usize) -> Vec<String> {
    let prefix = " ".repeat(indent);
    block_lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                line.clone()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect()
}

/// Insert a block at the end of a Python class body, found by indentation
/// scanning. `None` when the class is absent.
fn insert_into_python_class(content: &str, class_name: &str, block: &str) -> Option<String> {
    let class_re = Regex::new(&format!(
        r"^(\s*)class\s+{}\b",
        regex::escape(class_name)
    ))
    .ok()?;
    let eol = detect_line_ending(content);
    let mut lines = split_universal(content);

    for idx in 0..lines.len() {
        let Some(caps) = class_re.captures(&lines[idx]) else {
            continue;
        };
        let class_indent = caps[1].len();
        let mut insert_at = idx + 1;
        while insert_at < lines.len() {
            let candidate = &lines[insert_at];
            if candidate.trim().is_empty() {
                insert_at += 1;
                continue;
            }
            if indent_of(candidate) <= class_indent {
                break;
            }
            insert_at += 1;
        }

        let mut block_lines: Vec<String> = normalize_eol(block.trim_end_matches('\n'), "\n")
            .split('\n')
            .map(String::from)
            .collect();
        if block_lines.iter().all(|l| l.trim().is_empty()) {
            return Some(content.to_string());
        }
        if !block_is_indented(&block_lines, class_indent) {
            block_lines = indent_block(&block_lines, class_indent + 4);
        }
        if insert_at > 0
            && !lines[insert_at - 1].trim().is_empty()
            && !block_lines[0].trim().is_empty()
        {
            block_lines.insert(0, String::new());
        }
        lines.splice(insert_at..insert_at, block_lines);
        return Some(lines.join(eol));
    }
    None
}

/// Insert a block before the closing brace of a JS-family class, found by
/// brace-depth counting. `None` when the class is absent or unbalanced.
fn insert_into_js_class(content: &str, class_name: &str, block: &str) -> Option<String> {
    let class_re = Regex::new(&format!(
        r"class\s+{}\b[^{{]*\{{",
        regex::escape(class_name)
    ))
    .ok()?;
    let m = class_re.find(content)?;
    let close = find_matching_brace(content, m.end())?;

    let eol = detect_line_ending(content);
    let insert_block = block.trim_end_matches('\n');
    if insert_block.is_empty() {
        return Some(content.to_string());
    }
    let insert_block = normalize_eol(insert_block, eol);
    let before = &content[..close];
    let after = &content[close..];
    let prefix = if before.ends_with('\n') { "" } else { eol };
    Some(format!("{before}{prefix}{insert_block}{eol}{after}"))
}

/// Byte offset of the brace closing the one just before `start`, depth-aware.
fn find_matching_brace(content: &str, start: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 1usize;
    let mut idx = start;
    while idx < bytes.len() {
        match bytes[idx] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
        idx += 1;
    }
    None
}

fn insert_into_class(
    content: &str,
    class_name: &str,
    block: &str,
    file_path: &str,
) -> Option<String> {
    match ext_of(file_path).as_str() {
        "py" => insert_into_python_class(content, class_name, block),
        "js" | "jsx" | "ts" | "tsx" => insert_into_js_class(content, class_name, block),
        _ => None,
    }
}

/// Class portion of a qualified `function:Class.method` location.
fn class_name_from_location(location: &str) -> Option<&str> {
    let (_, name) = location.split_once(':')?;
    if !name.contains('.') {
        return None;
    }
    name.split('.').next()
}

fn partition_changes(
    changes: &[SemanticChange],
) -> (
    Vec<&SemanticChange>,
    Vec<&SemanticChange>,
    Vec<&SemanticChange>,
) {
    let mut removals = Vec::new();
    let mut modifications = Vec::new();
    let mut additions = Vec::new();
    for change in changes {
        if change.is_modification() {
            modifications.push(change);
        } else if change.is_removal() {
            removals.push(change);
        } else if change.is_addition() {
            additions.push(change);
        }
    }
    (removals, modifications, additions)
}

fn apply_passes(
    baseline: &str,
    removals: &[&SemanticChange],
    modifications: &[&SemanticChange],
    additions: &[&SemanticChange],
    file_path: &str,
) -> String {
    let mut content = baseline.to_string();

    // Pass 1: removals. Import removals strip whole matching lines so a
    // partial-token substring never gets cut out of neighbouring code.
    for change in removals {
        let Some(before) = change.content_before.as_deref() else {
            continue;
        };
        if change.change_type == ChangeType::RemoveImport {
            content = remove_matching_lines(&content, before);
            continue;
        }
        content = maybe_remove_in_location(&content, &change.location, before)
            .unwrap_or_else(|| remove_once(&content, before));
    }

    // Pass 2: modifications, preferring the named region, each substitution
    // applied at most once.
    for change in modifications {
        let (Some(before), Some(after)) = (
            change.content_before.as_deref(),
            change.content_after.as_deref(),
        ) else {
            continue;
        };
        content = maybe_replace_in_location(&content, &change.location, before, after)
            .unwrap_or_else(|| replace_once(&content, before, after));
    }

    // Pass 3: additions. Imports land at the import-block boundary,
    // method/function additions route into their class when the location
    // names one, everything else appends at end of file.
    let import_additions: Vec<String> = additions
        .iter()
        .filter(|c| c.change_type == ChangeType::AddImport)
        .filter_map(|c| c.content_after.clone())
        .collect();
    content = insert_imports(&content, &import_additions, file_path);

    let eol = detect_line_ending(&content);
    for change in additions {
        let Some(after) = change.content_after.as_deref() else {
            continue;
        };
        if change.change_type == ChangeType::AddImport {
            continue;
        }
        if matches!(
            change.change_type,
            ChangeType::AddMethod | ChangeType::AddFunction
        ) {
            if let Some(class_name) = class_name_from_location(&change.location) {
                if let Some(updated) = insert_into_class(&content, class_name, after, file_path)
                {
                    content = updated;
                    continue;
                }
            }
        }
        if !content.contains(after) {
            content.push_str(eol);
            content.push_str(eol);
            content.push_str(&normalize_eol(after, eol));
        }
    }

    content
}

/// Apply one task's changes to the baseline: removals, then modifications,
/// then additions.
pub fn apply_single_task_changes(
    baseline: &str,
    snapshot: &TaskSnapshot,
    file_path: &str,
) -> String {
    let (removals, modifications, additions) = partition_changes(&snapshot.semantic_changes);
    apply_passes(baseline, &removals, &modifications, &additions, file_path)
}

/// Apply the changes of several non-conflicting tasks to the baseline, same
/// three-pass policy with all snapshots' changes pooled per pass.
pub fn combine_non_conflicting_changes(
    baseline: &str,
    snapshots: &[TaskSnapshot],
    file_path: &str,
) -> String {
    let mut removals = Vec::new();
    let mut modifications = Vec::new();
    let mut additions = Vec::new();
    for snapshot in snapshots {
        let (r, m, a) = partition_changes(&snapshot.semantic_changes);
        removals.extend(r);
        modifications.extend(m);
        additions.extend(a);
    }
    apply_passes(baseline, &removals, &modifications, &additions, file_path)
}

fn function_span(content: &str, name: &str) -> Option<(usize, usize)> {
    let escaped = regex::escape(name);
    let patterns = [
        format!(r"function\s+{escaped}\s*\([^)]*\)\s*\{{[\s\S]*?\n\}}"),
        format!(r"(?:const|let|var)\s+{escaped}\s*=[\s\S]*?\n\}};?"),
    ];
    for pattern in &patterns {
        if let Some(m) = Regex::new(pattern).ok()?.find(content) {
            return Some((m.start(), m.end()));
        }
    }
    None
}

fn class_span(content: &str, name: &str) -> Option<(usize, usize)> {
    let header = Regex::new(&format!(r"class\s+{}\b[^{{]*\{{", regex::escape(name))).ok()?;
    let m = header.find(content)?;
    let close = find_matching_brace(content, m.end())?;
    Some((m.start(), close + 1))
}

/// Byte span of the region a location string names. `None` when it cannot
/// be re-located.
pub fn find_location_span(content: &str, location: &str) -> Option<(usize, usize)> {
    let (loc_type, name) = location.split_once(':')?;
    match loc_type {
        "function" => function_span(content, name),
        "class" => class_span(content, name),
        _ => None,
    }
}

/// Source text of the region a location names, or the unmodified input when
/// the region cannot be re-located ("treat the whole file as the region").
pub fn extract_location_content(content: &str, location: &str) -> String {
    match find_location_span(content, location) {
        Some((start, end)) => content[start..end].to_string(),
        None => content.to_string(),
    }
}

/// Splice an externally merged region back over its location. Falls back to
/// a first-occurrence single replace of the originally extracted content;
/// an empty region deletes the location.
pub fn apply_ai_merge(content: &str, location: &str, merged_region: Option<&str>) -> String {
    let Some(merged_region) = merged_region else {
        return content.to_string();
    };

    if let Some((start, end)) = find_location_span(content, location) {
        return format!("{}{}{}", &content[..start], merged_region, &content[end..]);
    }

    let original = extract_location_content(content, location);
    if !original.is_empty() && original != content {
        return replace_once(content, &original, merged_region);
    }
    content.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(changes: Vec<SemanticChange>) -> TaskSnapshot {
        TaskSnapshot {
            task_id: "task-001".into(),
            task_intent: "test".into(),
            started_at: Utc::now(),
            semantic_changes: changes,
        }
    }

    fn change(ct: ChangeType, target: &str, location: &str) -> SemanticChange {
        SemanticChange {
            change_type: ct,
            target: target.into(),
            location: location.into(),
            line_start: 1,
            line_end: 1,
            content_before: None,
            content_after: None,
        }
    }

    #[test]
    fn test_remove_import_strips_whole_line() {
        let baseline = "import os\nimport sys\n\nprint('hi')\n";
        let mut remove = change(ChangeType::RemoveImport, "sys", "file_top");
        remove.content_before = Some("import sys".into());
        let merged = apply_single_task_changes(baseline, &snapshot(vec![remove]), "app.py");
        assert!(!merged.contains("import sys"));
        assert!(merged.contains("import os"));
    }

    #[test]
    fn test_method_addition_lands_inside_python_class() {
        let baseline = "class Greeter:\n    def greet(self):\n        return \"hi\"\n\ndef outside():\n    return \"outside\"\n";
        let mut add = change(
            ChangeType::AddFunction,
            "Greeter.farewell",
            "function:Greeter.farewell",
        );
        add.content_after = Some("    def farewell(self):\n        return \"bye\"".into());
        let merged = apply_single_task_changes(baseline, &snapshot(vec![add]), "greeter.py");
        let farewell = merged.find("def farewell").expect("farewell inserted");
        let outside = merged.find("def outside").expect("outside kept");
        assert!(farewell < outside);
    }

    #[test]
    fn test_combine_applies_removal_and_addition() {
        let baseline = "import os\nimport sys\n\nVALUE = 1\n";
        let mut remove = change(ChangeType::RemoveImport, "sys", "file_top");
        remove.content_before = Some("import sys".into());
        let mut add = change(ChangeType::AddVariable, "NEW_VALUE", "file_bottom");
        add.content_after = Some("NEW_VALUE = 2".into());
        let merged = combine_non_conflicting_changes(
            baseline,
            &[snapshot(vec![remove]), snapshot(vec![add])],
            "app.py",
        );
        assert!(!merged.contains("import sys"));
        assert!(merged.contains("NEW_VALUE = 2"));
    }

    #[test]
    fn test_modification_applied_at_most_once() {
        let baseline =
            "def hello():\n    return \"hi\"\n\ndef hello():\n    return \"hi\"\n";
        let mut modify = change(ChangeType::ModifyFunction, "hello", "function:hello");
        modify.content_before = Some("def hello():\n    return \"hi\"".into());
        modify.content_after = Some("def hello():\n    return \"bye\"".into());
        let merged = apply_single_task_changes(baseline, &snapshot(vec![modify]), "hello.py");
        assert_eq!(merged.matches("return \"bye\"").count(), 1);
        assert_eq!(merged.matches("return \"hi\"").count(), 1);
    }

    #[test]
    fn test_crlf_style_preserved() {
        let baseline = "import os\r\nimport sys\r\n\r\nVALUE = 1\r\n";
        let mut remove = change(ChangeType::RemoveImport, "sys", "file_top");
        remove.content_before = Some("import sys".into());
        let merged = apply_single_task_changes(baseline, &snapshot(vec![remove]), "app.py");
        assert!(!merged.contains("import sys"));
        assert!(merged.contains("\r\n"));
        assert!(merged.replace("\r\n", "").find('\n').is_none());
    }

    #[test]
    fn test_duplicate_import_inserted_once() {
        let baseline = "import os\n\nprint('hi')\n";
        let mut add_a = change(ChangeType::AddImport, "json", "file_top");
        add_a.content_after = Some("import json".into());
        let add_b = add_a.clone();
        let merged = combine_non_conflicting_changes(
            baseline,
            &[snapshot(vec![add_a]), snapshot(vec![add_b])],
            "app.py",
        );
        assert_eq!(merged.matches("import json").count(), 1);
    }

    #[test]
    fn test_import_inserted_at_block_end() {
        let baseline = "import os\nimport sys\n\nprint('hi')\n";
        let mut add = change(ChangeType::AddImport, "json", "file_top");
        add.content_after = Some("import json".into());
        let merged = apply_single_task_changes(baseline, &snapshot(vec![add]), "app.py");
        let lines: Vec<&str> = merged.lines().collect();
        assert_eq!(lines[..3], ["import os", "import sys", "import json"]);
    }

    #[test]
    fn test_extract_location_function() {
        let content = "function greet() {\n  return 'hi';\n}\n\nconsole.log('ok');\n";
        let region = extract_location_content(content, "function:greet");
        assert!(region.starts_with("function greet"));
        assert!(!region.contains("console.log"));
    }

    #[test]
    fn test_extract_unknown_location_returns_input() {
        let content = "let x = 1;\n";
        assert_eq!(extract_location_content(content, "function:missing"), content);
    }

    #[test]
    fn test_class_span_is_brace_aware() {
        let content =
            "class Store {\n  get(k) {\n    if (k) { return this.d[k]; }\n    return null;\n  }\n}\n\nconst other = 1;\n";
        let (start, end) = find_location_span(content, "class:Store").unwrap();
        let region = &content[start..end];
        assert!(region.ends_with('}'));
        assert!(region.contains("return null"));
        assert!(!region.contains("other"));
    }

    #[test]
    fn test_apply_ai_merge_empty_region_removes_function() {
        let content = "function greet() {\n  return 'hi';\n}\n\nconsole.log('ok');\n";
        let merged = apply_ai_merge(content, "function:greet", Some(""));
        assert!(!merged.contains("function greet"));
        assert!(merged.contains("console.log('ok');"));
    }

    #[test]
    fn test_apply_ai_merge_replaces_region() {
        let content = "function greet() {\n  return 'hi';\n}\n";
        let merged = apply_ai_merge(
            content,
            "function:greet",
            Some("function greet() {\n  return 'hello';\n}"),
        );
        assert!(merged.contains("return 'hello';"));
        assert!(!merged.contains("return 'hi';"));
    }

    #[test]
    fn test_js_class_insertion_before_closing_brace() {
        let baseline = "class Store {\n  get(k) { return this.d[k]; }\n}\n";
        let mut add = change(ChangeType::AddMethod, "Store.set", "function:Store.set");
        add.content_after = Some("  set(k, v) { this.d[k] = v; }".into());
        let merged = apply_single_task_changes(baseline, &snapshot(vec![add]), "store.js");
        let set_pos = merged.find("set(k, v)").unwrap();
        let close_pos = merged.rfind('}').unwrap();
        assert!(set_pos < close_pos);
        assert!(merged.contains("get(k)"));
    }
}
