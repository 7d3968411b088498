//! # reweave-engine
//!
//! A semantic merge engine for multi-agent development: several autonomous
//! coding tasks edit isolated worktree copies of the same repository, and
//! their changes — often to the same files — must be reconciled into one
//! consistent result.
//!
//! ## Pipeline
//!
//! 1. **Element extraction** — each file version is parsed into named
//!    structural elements (imports, functions, classes, methods, variables)
//!    via tree-sitter, with a regex fallback when no grammar is registered.
//! 2. **Semantic differencing** — before/after element maps become an
//!    ordered list of typed changes: additions, removals, modifications,
//!    refined into hook-call, JSX-wrap, and prop-level changes for UI code.
//! 3. **Conflict classification** — changes are grouped by the region they
//!    touch; regions edited by two or more tasks get a severity and a merge
//!    strategy.
//! 4. **Deterministic auto-merge** — nine strategies (import union, hook
//!    insertion, JSX wrapping, function/method appends, chronological
//!    replay, ...) combine compatible edits without model assistance.
//! 5. **Model-assisted resolution** — regions no strategy can handle are
//!    rendered into a minimal-context prompt for an injected model call and
//!    the returned region is spliced back.
//!
//! Untouched content survives byte for byte, including the baseline's
//! line-ending style. Every public merge entry point returns a result value
//! rather than propagating errors, so the orchestration layer can always
//! fall back to manual conflict markers.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reweave_engine::{MergeEngine, ParserRegistry};
//!
//! let registry = Arc::new(ParserRegistry::with_defaults());
//! let engine = MergeEngine::new(registry);
//!
//! let report = engine.merge_file("app.py", "import os\n", &[]);
//! assert!(report.all_resolved);
//! ```

pub mod automerge;
pub mod classifier;
pub mod differ;
pub mod engine;
pub mod extract;
pub mod fallback;
pub mod language;
pub mod resolver;
pub mod splicer;
pub mod types;

#[cfg(feature = "ast")]
mod javascript;
#[cfg(feature = "ast")]
mod python;

// Re-export primary public API
pub use automerge::AutoMerger;
pub use classifier::ConflictClassifier;
pub use differ::SemanticDiffer;
pub use engine::{FileMergeReport, MergeEngine};
pub use language::{Language, ParserRegistry};
pub use resolver::{AiResolver, ConflictContext, ModelCall, ResolveError, SYSTEM_PROMPT};
pub use types::{
    ChangeType, ConflictRegion, ConflictSeverity, ExtractedElement, FileAnalysis, MergeContext,
    MergeDecision, MergeResult, MergeStrategy, SemanticChange, TaskSnapshot,
};
