//! Regex-based fallback analysis for files without a registered grammar.
//!
//! Works over a unified line diff and detects exactly two signal classes:
//! added/removed import lines and added/removed function names. Strictly
//! less precise than the syntax-tree path; callers can tell the modes apart
//! through `SemanticDiffer::has_ast_support`.

use std::sync::OnceLock;

use regex::Regex;
use similar::{ChangeTag, TextDiff};

use crate::types::{ChangeType, FileAnalysis, SemanticChange};

pub fn analyze_with_regex(
    file_path: &str,
    before: &str,
    after: &str,
    ext: &str,
) -> FileAnalysis {
    let mut analysis = FileAnalysis::new(file_path);

    let diff = TextDiff::from_lines(before, after);
    let mut added_lines: Vec<(usize, String)> = Vec::new();
    let mut removed_lines: Vec<(usize, String)> = Vec::new();
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches(['\n', '\r']).to_string();
        match change.tag() {
            ChangeTag::Insert => {
                added_lines.push((change.new_index().unwrap_or(0) + 1, line));
            }
            ChangeTag::Delete => {
                removed_lines.push((change.old_index().unwrap_or(0) + 1, line));
            }
            ChangeTag::Equal => {}
        }
    }

    if let Some(import_re) = import_pattern(ext) {
        for (line_num, line) in &added_lines {
            if import_re.is_match(line.trim()) {
                analysis.push(SemanticChange {
                    change_type: ChangeType::AddImport,
                    target: line.trim().to_string(),
                    location: "file_top".into(),
                    line_start: *line_num,
                    line_end: *line_num,
                    content_before: None,
                    content_after: Some(line.clone()),
                });
            }
        }
        for (line_num, line) in &removed_lines {
            if import_re.is_match(line.trim()) {
                analysis.push(SemanticChange {
                    change_type: ChangeType::RemoveImport,
                    target: line.trim().to_string(),
                    location: "file_top".into(),
                    line_start: *line_num,
                    line_end: *line_num,
                    content_before: Some(line.clone()),
                    content_after: None,
                });
            }
        }
    }

    // Function signatures are matched against the whole file content, not
    // diff hunks, so a moved function does not read as an add/remove pair.
    if let Some(func_re) = function_pattern(ext) {
        let funcs_before = function_names(func_re, before);
        let funcs_after = function_names(func_re, after);

        for name in funcs_after.iter().filter(|n| !funcs_before.contains(*n)) {
            analysis.push(SemanticChange {
                change_type: ChangeType::AddFunction,
                target: name.clone(),
                location: format!("function:{name}"),
                line_start: 1,
                line_end: 1,
                content_before: None,
                content_after: None,
            });
        }
        for name in funcs_before.iter().filter(|n| !funcs_after.contains(*n)) {
            analysis.push(SemanticChange {
                change_type: ChangeType::RemoveFunction,
                target: name.clone(),
                location: format!("function:{name}"),
                line_start: 1,
                line_end: 1,
                content_before: None,
                content_after: None,
            });
        }
    }

    analysis.total_lines_changed = added_lines.len() + removed_lines.len();
    analysis
}

fn function_names(re: &Regex, content: &str) -> Vec<String> {
    let mut names = Vec::new();
    for caps in re.captures_iter(content) {
        let name = caps
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str().to_string())
            .next();
        if let Some(name) = name {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

fn import_pattern(ext: &str) -> Option<&'static Regex> {
    static PY: OnceLock<Regex> = OnceLock::new();
    static JS: OnceLock<Regex> = OnceLock::new();
    match ext {
        "py" => Some(PY.get_or_init(|| {
            Regex::new(r"^(?:from\s+\S+\s+)?import\s+").expect("python import pattern")
        })),
        "js" | "jsx" | "ts" | "tsx" => {
            Some(JS.get_or_init(|| Regex::new(r"^import\s+").expect("js import pattern")))
        }
        _ => None,
    }
}

fn function_pattern(ext: &str) -> Option<&'static Regex> {
    static PY: OnceLock<Regex> = OnceLock::new();
    static JS: OnceLock<Regex> = OnceLock::new();
    static TS: OnceLock<Regex> = OnceLock::new();
    match ext {
        "py" => Some(PY.get_or_init(|| Regex::new(r"def\s+(\w+)\s*\(").expect("python fn pattern"))),
        "js" | "jsx" => Some(JS.get_or_init(|| {
            Regex::new(
                r"(?:function\s+(\w+)|(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?(?:function|\([^)]*\)\s*=>))",
            )
            .expect("js fn pattern")
        })),
        "ts" | "tsx" => Some(TS.get_or_init(|| {
            Regex::new(
                r"(?:function\s+(\w+)|(?:const|let|var)\s+(\w+)\s*(?::\s*\w+)?\s*=\s*(?:async\s+)?(?:function|\([^)]*\)\s*=>))",
            )
            .expect("ts fn pattern")
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_added_and_removed_imports() {
        let before = "import os\nimport sys\n\nprint('hi')\n";
        let after = "import os\nimport json\n\nprint('hi')\n";
        let analysis = analyze_with_regex("app.py", before, after, "py");
        assert_eq!(analysis.imports_added, vec!["import json"]);
        assert_eq!(analysis.imports_removed, vec!["import sys"]);
    }

    #[test]
    fn test_detects_function_addition_by_name() {
        let before = "def f():\n    pass\n";
        let after = "def f():\n    pass\n\ndef g():\n    pass\n";
        let analysis = analyze_with_regex("app.py", before, after, "py");
        assert_eq!(analysis.functions_added, vec!["g"]);
    }

    #[test]
    fn test_arrow_function_name_captured() {
        let before = "";
        let after = "const load = async () => {\n  return fetch('/x');\n};\n";
        let analysis = analyze_with_regex("api.ts", before, after, "ts");
        assert_eq!(analysis.functions_added, vec!["load"]);
    }

    #[test]
    fn test_moved_function_is_not_reported() {
        let before = "def a():\n    pass\n\ndef b():\n    pass\n";
        let after = "def b():\n    pass\n\ndef a():\n    pass\n";
        let analysis = analyze_with_regex("app.py", before, after, "py");
        assert!(analysis.functions_added.is_empty());
        assert!(analysis.changes.iter().all(|c| c.change_type != ChangeType::RemoveFunction));
    }

    #[test]
    fn test_unknown_extension_counts_lines_only() {
        let analysis = analyze_with_regex("notes.txt", "a\n", "b\n", "txt");
        assert!(analysis.changes.is_empty());
        assert_eq!(analysis.total_lines_changed, 2);
    }
}
