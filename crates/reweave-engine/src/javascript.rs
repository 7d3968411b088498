//! JavaScript / TypeScript element extraction.
//!
//! Walks the tree-sitter CST and records imports (keyed by source module),
//! functions, classes, methods, variables, interfaces, and type aliases.
//! A const/let/var declarator whose initializer is an arrow function or
//! function expression is recorded as `function:name`, not `variable:name` —
//! hook and JSX changes are routed by that distinction. Export statements
//! are unwrapped so exported and plain declarations produce identical keys.

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
                if let Some(source_node) = child.child_by_field_name("source") {
                    let module = node_text(source_node, source)
                        .trim_matches(|c| c == '\'' || c == '"' || c == '`')
                        .to_string();
                    insert(
                        elements,
                        ElementKind::Import,
                        module,
                        child,
                        source,
                        None,
                    );
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = qualified(parent, node_text(name_node, source));
                    insert(elements, ElementKind::Function, name, child, source, parent);
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                extract_declarators(child, source, elements, parent);
            }
            "class_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(name_node, source).to_string();
                    insert(
                        elements,
                        ElementKind::Class,
                        name.clone(),
                        child,
                        source,
                        None,
                    );
                    if let Some(body) = child.child_by_field_name("body") {
                        extract(body, source, elements, Some(&name));
                    }
                }
            }
            "method_definition" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = qualified(parent, node_text(name_node, source));
                    insert(elements, ElementKind::Method, name, child, source, parent);
                }
            }
            // Unwrap `export ...` so the inner declaration is keyed normally.
            "export_statement" => {
                extract(child, source, elements, parent);
            }
            "interface_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(name_node, source).to_string();
                    insert(elements, ElementKind::Interface, name, child, source, None);
                }
            }
            "type_alias_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = node_text(name_node, source).to_string();
                    insert(elements, ElementKind::TypeAlias, name, child, source, None);
                }
            }
            "program" | "statement_block" | "class_body" => {
                extract(child, source, elements, parent);
            }
            _ => {}
        }
    }
}

/// Walk the declarators of a const/let/var statement, splitting functions
/// from plain variables by the initializer's node kind.
fn extract_declarators(
    decl: Node<'_>,
    source: &str,
    elements: &mut BTreeMap<String, ExtractedElement>,
    parent: Option<&str>,
) {
    for i in 0..decl.child_count() {
        let Some(declarator) = decl.child(i) else { continue };
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = declarator.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, source).to_string();
        let is_function = declarator
            .child_by_field_name("value")
            .map(|value| {
                matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function"
                )
            })
            .unwrap_or(false);

        let kind = if is_function {
            ElementKind::Function
        } else {
            ElementKind::Variable
        };
        // Content covers the whole declaration statement, not just the
        // declarator, so splicing reproduces the `const` keyword.
        insert(elements, kind, name, decl, source, parent);
    }
}

fn qualified(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(p) => format!("{p}.{name}"),
        None => name.to_string(),
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

    fn parse(src: &str, ext: &str) -> BTreeMap<String, ExtractedElement> {
        crate::extract::extract_elements(src, ext, &ParserRegistry::with_defaults())
    }

    #[test]
    fn test_import_keyed_by_source_module() {
        let src = "import { useState } from 'react';\nimport api from './api';\n";
        let elements = parse(src, "tsx");
        assert!(elements.contains_key("import:react"));
        assert!(elements.contains_key("import:./api"));
    }

    #[test]
    fn test_class_methods_qualified() {
        let src = "class Store {\n  get(key) { return this.data[key]; }\n}\n";
        let elements = parse(src, "js");
        assert!(elements.contains_key("class:Store"));
        let method = &elements["method:Store.get"];
        assert_eq!(method.parent.as_deref(), Some("Store"));
        assert!(method.content.contains("this.data[key]"));
    }

    #[test]
    fn test_function_expression_assigned_to_const() {
        let src = "const handler = function (event) {\n  return event.id;\n};\n";
        let elements = parse(src, "js");
        assert!(elements.contains_key("function:handler"));
    }

    #[test]
    fn test_interface_and_type_alias() {
        let src = "interface Props { title: string }\ntype Id = string;\n";
        let elements = parse(src, "ts");
        assert!(elements.contains_key("interface:Props"));
        assert!(elements.contains_key("type:Id"));
    }

    #[test]
    fn test_export_default_function_unwrapped() {
        let src = "export default function App() {\n  return null;\n}\n";
        let elements = parse(src, "jsx");
        assert!(elements.contains_key("function:App"));
    }
}
