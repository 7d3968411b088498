//! Language support and the process-lifetime parser registry.
//!
//! One grammar per file extension, resolved once at startup and shared by
//! reference into the extractor. When the `ast` feature is disabled (or an
//! extension has no registered grammar) the registry reports no support and
//! callers degrade to the regex fallback differ.

use std::collections::HashMap;

/// Languages the element extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
}

impl Language {
    /// Infer language from a file extension, with or without the leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match normalize_ext(ext).as_str() {
            "py" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            _ => None,
        }
    }

    /// Whether this language belongs to the JS/TS family (shared import and
    /// declaration shapes).
    pub fn is_js_family(&self) -> bool {
        !matches!(self, Language::Python)
    }
}

/// Lowercase an extension and strip the leading dot.
pub fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

/// Extension of a file path, normalized. Empty string when absent.
pub fn ext_of(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(normalize_ext)
        .unwrap_or_default()
}

/// Registry mapping languages to their tree-sitter grammars.
///
/// Built once per process and passed by shared reference; never a mutable
/// singleton.
pub struct ParserRegistry {
    #[cfg(feature = "ast")]
    grammars: HashMap<Language, tree_sitter::Language>,
    #[cfg(not(feature = "ast"))]
    grammars: HashMap<Language, ()>,
}

impl ParserRegistry {
    /// Registry with every built-in grammar registered.
    #[cfg(feature = "ast")]
    pub fn with_defaults() -> Self {
        let mut grammars: HashMap<Language, tree_sitter::Language> = HashMap::new();
        grammars.insert(Language::Python, tree_sitter_python::LANGUAGE.into());
        grammars.insert(Language::JavaScript, tree_sitter_javascript::LANGUAGE.into());
        grammars.insert(
            Language::TypeScript,
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        );
        grammars.insert(Language::Tsx, tree_sitter_typescript::LANGUAGE_TSX.into());
        Self { grammars }
    }

    /// Without the `ast` feature no grammars exist; everything goes through
    /// the regex fallback.
    #[cfg(not(feature = "ast"))]
    pub fn with_defaults() -> Self {
        Self {
            grammars: HashMap::new(),
        }
    }

    /// Registry with no grammars at all (forces the regex fallback).
    pub fn empty() -> Self {
        Self {
            grammars: HashMap::new(),
        }
    }

    /// Capability flag: can this extension be parsed into a syntax tree?
    pub fn supports(&self, ext: &str) -> bool {
        Language::from_extension(ext)
            .map(|lang| self.grammars.contains_key(&lang))
            .unwrap_or(false)
    }

    /// Parse source text for a registered language. `None` when the grammar
    /// is missing or the parse produced no tree.
    #[cfg(feature = "ast")]
    pub fn parse(&self, source: &str, lang: Language) -> Option<tree_sitter::Tree> {
        let grammar = self.grammars.get(&lang)?;
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(grammar).ok()?;
        parser.parse(source, None)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension(".tsx"), Some(Language::Tsx));
        assert_eq!(Language::from_extension("rs"), None);
    }

    #[test]
    fn test_ext_of() {
        assert_eq!(ext_of("src/App.TSX"), "tsx");
        assert_eq!(ext_of("Makefile"), "");
    }

    #[test]
    fn test_empty_registry_supports_nothing() {
        let registry = ParserRegistry::empty();
        assert!(!registry.supports("py"));
        assert!(!registry.supports("tsx"));
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_default_registry_supports_known_extensions() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.supports("py"));
        assert!(registry.supports("js"));
        assert!(registry.supports("jsx"));
        assert!(registry.supports("ts"));
        assert!(registry.supports("tsx"));
        assert!(!registry.supports("go"));
    }

    #[cfg(feature = "ast")]
    #[test]
    fn test_parse_python() {
        let registry = ParserRegistry::with_defaults();
        let tree = registry.parse("def f():\n    pass\n", Language::Python).unwrap();
        assert_eq!(tree.root_node().kind(), "module");
    }
}
