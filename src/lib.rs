//! iacfacts - structural analysis and fact extraction for
//! infrastructure-as-code bundles.
//!
//! iacfacts turns heterogeneous IaC sources (Chef cookbooks, Ansible
//! playbooks, Salt states, shell scripts, BladeLogic NSH jobs) into a
//! normalized, queryable fact set: resources, dependencies, metadata, and
//! variables, each with an explicit confidence score. Grammar-based parsing
//! tolerates malformed input and degrades to line-pattern extraction when a
//! tree cannot be trusted.
//!
//! # Architecture
//!
//! - `dialect`: dialect enum, detection, and the static extraction rule tables
//! - `parser`: grammar registry and the tree-sitter wrapper
//! - `extract`: structural extractors per syntax family, plus the fallback
//! - `normalize`: deduplication, cross-referencing, allow-list validation
//! - `session`: the per-file pipeline orchestrator and run budgets
//! - `config`: the immutable engine configuration
//! - `report`: output formatting (pretty, JSON)
//!
//! # Adding a New Dialect
//!
//! Register a rule table in `dialect/rules.rs` and map the dialect to a
//! grammar in `parser`. The orchestrator, normalizer, and fallback extractor
//! need no changes.

pub mod cli;
pub mod config;
pub mod dialect;
pub mod extract;
pub mod facts;
pub mod normalize;
pub mod parser;
pub mod report;
pub mod session;

pub use config::{ConfigError, EngineConfig};
pub use dialect::{Dialect, ALL_DIALECTS};
pub use facts::{
    AnalysisResult, AttrValue, ConfidenceSummary, DependencyEdge, ExtractionMethod, Fact,
    FactKind, FileError, FileReport, FileStatus, SourceLocation,
};
pub use session::{AnalysisSession, SourceFile};

/// Initialize all subsystems.
///
/// Call this once at startup. Currently this warms the grammar registry so
/// parallel workers share initialized grammars.
pub fn init() {
    parser::init();
}
