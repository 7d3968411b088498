//! Element extraction: source text in, map of named structural elements out.
//!
//! The extractor walks a tree-sitter syntax tree and records every import,
//! function, class, method, variable, and type declaration it finds,
//! qualifying nested names as `Parent.child`. Unsupported extensions yield
//! an empty map, not an error.

use std::collections::BTreeMap;

#[cfg(feature = "ast")]
use crate::language::Language;
use crate::language::ParserRegistry;
use crate::types::ExtractedElement;

/// Extract all named structural elements from `source`.
///
/// `ext` is the file extension (with or without dot). Returns an empty map
/// when no grammar is registered for the extension.
#[cfg(feature = "ast")]
pub fn extract_elements(
    source: &str,
    ext: &str,
    registry: &ParserRegistry,
) -> BTreeMap<String, ExtractedElement> {
    let mut elements = BTreeMap::new();
    let Some(lang) = Language::from_extension(ext) else {
        return elements;
    };
    let Some(tree) = registry.parse(source, lang) else {
        return elements;
    };

    let root = tree.root_node();
    match lang {
        Language::Python => crate::python::extract(root, source, &mut elements, None),
        Language::JavaScript | Language::TypeScript | Language::Tsx => {
            crate::javascript::extract(root, source, &mut elements, None)
        }
    }
    elements
}

#[cfg(not(feature = "ast"))]
pub fn extract_elements(
    _source: &str,
    _ext: &str,
    _registry: &ParserRegistry,
) -> BTreeMap<String, ExtractedElement> {
    BTreeMap::new()
}

/// Verbatim source text of a node.
#[cfg(feature = "ast")]
pub(crate) fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-indexed start/end lines of a node.
#[cfg(feature = "ast")]
pub(crate) fn node_lines(node: tree_sitter::Node<'_>) -> (usize, usize) {
    (
        node.start_position().row + 1,
        node.end_position().row + 1,
    )
}
