//! Semantic differencing of two file versions.
//!
//! Extracts the element maps of the before and after texts and compares them
//! key by key: present only in after is an addition, only in before a
//! removal, present in both with different content a modification. Import
//! changes are reported one per import element, never merged, because the
//! import merge strategy operates line by line.
//!
//! When no grammar is registered for a file's extension the differ degrades
//! to the regex fallback, which detects only import and function-name
//! changes. Callers can query `has_ast_support` before trusting precision.

use std::collections::BTreeMap;
use std::sync::Arc;

use similar::{ChangeTag, TextDiff};

use crate::extract::extract_elements;
use crate::fallback;
use crate::language::{ext_of, ParserRegistry};
use crate::types::{ChangeType, ElementKind, ExtractedElement, FileAnalysis, SemanticChange};

/// Analyzes code changes at a semantic level.
pub struct SemanticDiffer {
    registry: Arc<ParserRegistry>,
}

impl SemanticDiffer {
    pub fn new(registry: Arc<ParserRegistry>) -> Self {
        Self { registry }
    }

    /// Shared handle to the underlying parser registry.
    pub fn registry(&self) -> &Arc<ParserRegistry> {
        &self.registry
    }

    /// Capability flag: AST-precision analysis for this extension?
    pub fn has_ast_support(&self, ext: &str) -> bool {
        self.registry.supports(ext)
    }

    /// Extensions the differ understands, in AST or fallback mode.
    pub fn supported_extensions(&self) -> &'static [&'static str] {
        &["py", "js", "jsx", "ts", "tsx"]
    }

    pub fn is_supported(&self, file_path: &str) -> bool {
        let ext = ext_of(file_path);
        self.supported_extensions().contains(&ext.as_str())
    }

    /// Analyze the semantic differences between two versions of a file.
    pub fn analyze_diff(&self, file_path: &str, before: &str, after: &str) -> FileAnalysis {
        let ext = ext_of(file_path);

        let analysis = if self.registry.supports(&ext) {
            tracing::debug!(file = file_path, ext = %ext, "analyzing with syntax tree");
            let elements_before = extract_elements(before, &ext, &self.registry);
            let elements_after = extract_elements(after, &ext, &self.registry);
            compare_elements(file_path, &elements_before, &elements_after)
        } else {
            tracing::debug!(file = file_path, ext = %ext, "analyzing with regex fallback");
            fallback::analyze_with_regex(file_path, before, after, &ext)
        };

        tracing::debug!(
            file = file_path,
            changes = analysis.changes.len(),
            lines = analysis.total_lines_changed,
            "analysis complete"
        );
        analysis
    }

    /// Snapshot a file's current structure: every element reported as one
    /// addition. Used to capture a structural baseline.
    pub fn analyze_file(&self, file_path: &str, content: &str) -> FileAnalysis {
        self.analyze_diff(file_path, "", content)
    }
}

/// Compare two element maps into a `FileAnalysis`.
pub fn compare_elements(
    file_path: &str,
    before: &BTreeMap<String, ExtractedElement>,
    after: &BTreeMap<String, ExtractedElement>,
) -> FileAnalysis {
    let mut analysis = FileAnalysis::new(file_path);

    for (key, elem) in after {
        match before.get(key) {
            None => {
                for change in addition_changes(elem) {
                    analysis.push(change);
                }
            }
            Some(prev) if prev.content != elem.content => {
                for change in modification_changes(prev, elem) {
                    analysis.push(change);
                }
            }
            Some(_) => {}
        }
    }

    for (key, elem) in before {
        if !after.contains_key(key) {
            analysis.push(removal_change(elem));
        }
    }

    analysis
}

fn location_of(elem: &ExtractedElement) -> String {
    match elem.kind {
        ElementKind::Import | ElementKind::ImportFrom => "file_top".to_string(),
        ElementKind::Function | ElementKind::Method => format!("function:{}", elem.name),
        ElementKind::Class => format!("class:{}", elem.name),
        ElementKind::Variable | ElementKind::Interface | ElementKind::TypeAlias => {
            "file_bottom".to_string()
        }
    }
}

fn base_change(elem: &ExtractedElement, change_type: ChangeType) -> SemanticChange {
    SemanticChange {
        change_type,
        target: elem.name.clone(),
        location: location_of(elem),
        line_start: elem.start_line,
        line_end: elem.end_line,
        content_before: None,
        content_after: None,
    }
}

fn addition_changes(elem: &ExtractedElement) -> Vec<SemanticChange> {
    let change_type = match elem.kind {
        ElementKind::Import | ElementKind::ImportFrom => ChangeType::AddImport,
        ElementKind::Function => ChangeType::AddFunction,
        ElementKind::Method => ChangeType::AddMethod,
        ElementKind::Class => ChangeType::ModifyClass,
        ElementKind::Variable => variable_change_type(elem),
        ElementKind::Interface | ElementKind::TypeAlias => ChangeType::AddVariable,
    };
    let mut change = base_change(elem, change_type);
    change.content_after = Some(elem.content.clone());
    vec![change]
}

fn removal_change(elem: &ExtractedElement) -> SemanticChange {
    let change_type = match elem.kind {
        ElementKind::Import | ElementKind::ImportFrom => ChangeType::RemoveImport,
        ElementKind::Function | ElementKind::Method => ChangeType::RemoveFunction,
        ElementKind::Class => ChangeType::ModifyClass,
        ElementKind::Variable | ElementKind::Interface | ElementKind::TypeAlias => {
            ChangeType::AddVariable
        }
    };
    let mut change = base_change(elem, change_type);
    change.content_before = Some(elem.content.clone());
    change
}

fn modification_changes(
    before: &ExtractedElement,
    after: &ExtractedElement,
) -> Vec<SemanticChange> {
    // Imports keyed by the same module but with different text are reported
    // as a remove/add pair so the import strategy can stay line-oriented.
    if matches!(
        after.kind,
        ElementKind::Import | ElementKind::ImportFrom
    ) {
        let mut removed = base_change(before, ChangeType::RemoveImport);
        removed.content_before = Some(before.content.clone());
        let mut added = base_change(after, ChangeType::AddImport);
        added.content_after = Some(after.content.clone());
        return vec![removed, added];
    }

    let change_type = match after.kind {
        ElementKind::Function => refine_function_modification(before, after),
        ElementKind::Method => ChangeType::ModifyFunction,
        ElementKind::Class => ChangeType::ModifyClass,
        ElementKind::Variable | ElementKind::Interface | ElementKind::TypeAlias => {
            ChangeType::AddVariable
        }
        ElementKind::Import | ElementKind::ImportFrom => unreachable!(),
    };

    let mut change = base_change(after, change_type);
    change.content_before = Some(before.content.clone());
    change.content_after = Some(after.content.clone());
    vec![change]
}

fn variable_change_type(elem: &ExtractedElement) -> ChangeType {
    let screaming = !elem.name.is_empty()
        && elem
            .name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if screaming || elem.content.trim_start().starts_with("const ") {
        ChangeType::AddConstant
    } else {
        ChangeType::AddVariable
    }
}

/// Classify what kind of modification a function body underwent.
///
/// Heuristic, pinned by tests: pure hook-call insertions, JSX return
/// wrapping, and prop-only edits each get their own change type so the
/// classifier can pick the matching merge strategy; anything else is a plain
/// function modification.
fn refine_function_modification(
    before: &ExtractedElement,
    after: &ExtractedElement,
) -> ChangeType {
    let diff = TextDiff::from_lines(before.content.as_str(), after.content.as_str());
    let mut added: Vec<String> = Vec::new();
    let mut removed: Vec<String> = Vec::new();
    for change in diff.iter_all_changes() {
        let line = change.value().trim();
        if line.is_empty() {
            continue;
        }
        match change.tag() {
            ChangeTag::Insert => added.push(line.to_string()),
            ChangeTag::Delete => removed.push(line.to_string()),
            ChangeTag::Equal => {}
        }
    }

    if removed.is_empty() && !added.is_empty() && added.iter().all(|l| is_hook_line(l)) {
        return ChangeType::AddHookCall;
    }

    let before_root = jsx_return_root(&before.content);
    let after_root = jsx_return_root(&after.content);
    if let (Some(b), Some(a)) = (&before_root, &after_root) {
        if b != a && after.content.contains(&format!("<{b}")) {
            return ChangeType::WrapJsx;
        }
        if b == a {
            let before_tag = jsx_opening_tag(&before.content, b);
            let after_tag = jsx_opening_tag(&after.content, a);
            if let (Some(bt), Some(at)) = (before_tag, after_tag) {
                if bt != at {
                    return ChangeType::ModifyJsxProps;
                }
            }
        }
    }

    ChangeType::ModifyFunction
}

fn is_hook_line(line: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(
            r"^(?:const\s+(?:\{[^}]*\}|\[[^\]]*\]|\w+)\s*=\s*)?use[A-Z]\w*\(.*\)\s*;?$",
        )
        .expect("hook line pattern")
    });
    re.is_match(line)
}

/// Tag name of the JSX root element in a `return (<Tag ...` expression.
fn jsx_return_root(content: &str) -> Option<String> {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"return\s*\(?\s*<(\w+)").expect("jsx root pattern")
    });
    re.captures(content)
        .map(|caps| caps[1].to_string())
}

/// Full opening tag `<Tag ...>` for a named element, first occurrence.
fn jsx_opening_tag(content: &str, tag: &str) -> Option<String> {
    let re = regex::Regex::new(&format!(r"<{}\b[^>]*>", regex::escape(tag))).ok()?;
    re.find(content).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn differ() -> SemanticDiffer {
        SemanticDiffer::new(Arc::new(ParserRegistry::with_defaults()))
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_diff_against_self_is_empty() {
        let src = "import os\n\ndef f():\n    return 1\n\nclass C:\n    def m(self):\n        pass\n";
        let analysis = differ().analyze_diff("app.py", src, src);
        assert!(analysis.is_empty());
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_snapshot_reports_every_element_as_addition() {
        let src = "import os\n\ndef f():\n    return 1\n\nclass C:\n    def m(self):\n        pass\n";
        let analysis = differ().analyze_file("app.py", src);
        // import:os, function:f, class:C, method:C.m
        assert_eq!(analysis.changes.len(), 4);
        assert!(analysis.changes.iter().all(|c| c.is_addition()));
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_added_import_and_function() {
        let before = "import os\n\ndef f():\n    return 1\n";
        let after = "import os\nimport sys\n\ndef f():\n    return 1\n\ndef g():\n    return 2\n";
        let analysis = differ().analyze_diff("app.py", before, after);
        assert_eq!(analysis.imports_added, vec!["sys"]);
        assert_eq!(analysis.functions_added, vec!["g"]);
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_modified_function_detected() {
        let before = "def f():\n    return 1\n";
        let after = "def f():\n    return 2\n";
        let analysis = differ().analyze_diff("app.py", before, after);
        assert_eq!(analysis.functions_modified, vec!["f"]);
        let change = &analysis.changes[0];
        assert_eq!(change.change_type, ChangeType::ModifyFunction);
        assert!(change.is_modification());
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_hook_addition_refined() {
        let before = "const App = () => {\n  return (<div>hi</div>);\n};\n";
        let after =
            "const App = () => {\n  const { theme } = useTheme();\n  return (<div>hi</div>);\n};\n";
        let analysis = differ().analyze_diff("App.jsx", before, after);
        assert_eq!(analysis.changes.len(), 1);
        assert_eq!(analysis.changes[0].change_type, ChangeType::AddHookCall);
        assert_eq!(analysis.changes[0].location, "function:App");
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_jsx_wrap_refined() {
        let before = "const App = () => {\n  return (<div>hi</div>);\n};\n";
        let after = "const App = () => {\n  return (<Layout theme=\"dark\">\n      <div>hi</div>\n    </Layout>);\n};\n";
        let analysis = differ().analyze_diff("App.jsx", before, after);
        assert_eq!(analysis.changes[0].change_type, ChangeType::WrapJsx);
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_jsx_prop_change_refined() {
        let before = "const App = () => {\n  return (<div className=\"a\">hi</div>);\n};\n";
        let after = "const App = () => {\n  return (<div className=\"a\" id=\"root\">hi</div>);\n};\n";
        let analysis = differ().analyze_diff("App.jsx", before, after);
        assert_eq!(analysis.changes[0].change_type, ChangeType::ModifyJsxProps);
    }

    #[test]
    fn test_unsupported_extension_uses_fallback() {
        let differ = SemanticDiffer::new(Arc::new(ParserRegistry::empty()));
        assert!(!differ.has_ast_support("py"));
        let analysis = differ.analyze_diff("app.py", "import os\n", "import os\nimport sys\n");
        assert_eq!(analysis.imports_added, vec!["import sys"]);
    }

    #[test]
    fn test_is_hook_line() {
        assert!(is_hook_line("useEffect(() => {}, []);"));
        assert!(is_hook_line("const { data } = useQuery(key);"));
        assert!(is_hook_line("const [n, setN] = useState(0);"));
        assert!(!is_hook_line("userFetch();"));
        assert!(!is_hook_line("return useMemo;"));
    }
}
