//! Python element extraction.
//!
//! Imports are recorded one element per dotted name; `from x import y` is
//! keyed by the source module. Class bodies recurse with the class name as
//! parent, so methods come out as `method:Class.name`. Decorated
//! definitions are unwrapped to the inner def/class.

use std::collections::BTreeMap;

use tree_sitter::Node;

use crate::extract::{node_lines, node_text};
use crate::types::{ElementKind, ExtractedElement};

pub(crate) fn extract(
    node: Node<'_>,
    source: &str,
    elements: &mut BTreeMap<String, ExtractedElement>,
    parent: Option<&str>,
) {
    for i in 0..node.child_count() {
        let Some(child) = node.child(i) else { continue };
        match child.kind() {
            "import_statement" => {
                // `import a, b.c` — one element per dotted name.
                for j in 0..child.child_count() {
                    let Some(sub) = child.child(j) else { continue };
                    let name_node = match sub.kind() {
                        "dotted_name" => Some(sub),
                        // `import x as y` wraps the dotted name.
                        "aliased_import" => sub.child_by_field_name("name"),
                        _ => None,
                    };
                    if let Some(name_node) = name_node {
                        let name = node_text(name_node, source).to_string();
                        insert(elements, ElementKind::Import, name, child, source, None);
                    }
                }
            }
            "import_from_statement" => {
                if let Some(module_node) = child.child_by_field_name("module_name") {
                    let module = node_text(module_node, source).to_string();
                    insert(
                        elements,
                        ElementKind::ImportFrom,
                        module,
                        child,
                        source,
                        None,
                    );
                }
            }
            "function_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(name_node, source);
                    let (kind, full_name) = match parent {
                        Some(p) => (ElementKind::Method, format!("{p}.{name}")),
                        None => (ElementKind::Function, name.to_string()),
                    };
                    insert(elements, kind, full_name, child, source, parent);
                }
            }
            "class_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(name_node, source).to_string();
                    insert(elements, ElementKind::Class, name.clone(), child, source, None);
                    if let Some(body) = child.child_by_field_name("body") {
                        extract(body, source, elements, Some(&name));
                    }
                }
            }
            // The decorated wrapper owns the decorators; recurse to reach the
            // inner def/class.
            "decorated_definition" => {
                extract(child, source, elements, parent);
            }
            "if_statement" | "while_statement" | "for_statement" | "try_statement"
            | "with_statement" | "block" => {
                extract(child, source, elements, parent);
            }
            _ => {}
        }
    }
}

fn insert(
    elements: &mut BTreeMap<String, ExtractedElement>,
    kind: ElementKind,
    name: String,
    node: Node<'_>,
    source: &str,
    parent: Option<&str>,
) {
    let (start_line, end_line) = node_lines(node);
    let element = ExtractedElement {
        kind,
        name,
        start_line,
        end_line,
        content: node_text(node, source).to_string(),
        parent: parent.map(String::from),
    };
    elements.insert(element.key(), element);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ParserRegistry;

    fn parse(src: &str) -> BTreeMap<String, ExtractedElement> {
        crate::extract::extract_elements(src, "py", &ParserRegistry::with_defaults())
    }

    #[test]
    fn test_multi_import_statement() {
        let elements = parse("import os, sys\n");
        assert!(elements.contains_key("import:os"));
        assert!(elements.contains_key("import:sys"));
    }

    #[test]
    fn test_from_import_keyed_by_module() {
        let elements = parse("from pathlib import Path\n");
        let elem = &elements["import_from:pathlib"];
        assert_eq!(elem.content, "from pathlib import Path");
    }

    #[test]
    fn test_decorated_function_unwrapped() {
        let src = "@cached\ndef slow():\n    return 1\n";
        let elements = parse(src);
        assert!(elements.contains_key("function:slow"));
    }

    #[test]
    fn test_nested_method_lines() {
        let src = "class Greeter:\n    def greet(self):\n        return 'hi'\n";
        let elements = parse(src);
        let method = &elements["method:Greeter.greet"];
        assert_eq!(method.start_line, 2);
        assert_eq!(method.end_line, 3);
    }

    #[test]
    fn test_conditional_definition_found() {
        let src = "if True:\n    def maybe():\n        pass\n";
        let elements = parse(src);
        assert!(elements.contains_key("function:maybe"));
    }
}
