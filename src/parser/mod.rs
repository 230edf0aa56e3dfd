//! Structural parsing: the grammar registry and the tree-sitter wrapper.
//!
//! The wrapper never panics on malformed input and never blocks past the
//! configured timeout. Syntax errors degrade the outcome rather than failing
//! it: a tree with error nodes is still usable up to the configured error cap,
//! beyond which extraction would mostly produce noise and the outcome is
//! downgraded to force fallback.

use std::fmt;

/// Why structural parsing produced no usable tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailReason {
    /// The parser hit the per-file timeout.
    Timeout,
    /// The parser returned no tree at all.
    NoTree,
    /// The tree exceeded the configured error-node cap.
    TooManyErrors,
    /// Structural parsing is compiled out (`tree-sitter` feature disabled).
    GrammarUnavailable,
}

impl fmt::Display for ParseFailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseFailReason::Timeout => "timeout",
            ParseFailReason::NoTree => "no tree",
            ParseFailReason::TooManyErrors => "too many errors",
            ParseFailReason::GrammarUnavailable => "grammar unavailable",
        };
        write!(f, "{}", s)
    }
}

#[cfg(feature = "tree-sitter")]
pub use structural::{language_for, parse, ParseOutcome, ParsedSource};

/// Warm up the grammar registry. Safe to call more than once.
pub fn init() {
    #[cfg(feature = "tree-sitter")]
    structural::register_grammars();
}

#[cfg(feature = "tree-sitter")]
mod structural {
    use std::time::{Duration, Instant};

    use once_cell::sync::Lazy;
    use tree_sitter::{Language, Parser as TsParser, Tree};

    use super::ParseFailReason;
    use crate::dialect::Dialect;

    static RUBY: Lazy<Language> = Lazy::new(|| tree_sitter_ruby::LANGUAGE.into());
    static YAML: Lazy<Language> = Lazy::new(|| tree_sitter_yaml::LANGUAGE.into());
    static BASH: Lazy<Language> = Lazy::new(|| tree_sitter_bash::LANGUAGE.into());

    /// Force-load every grammar so worker threads share the initialized
    /// statics read-only.
    pub fn register_grammars() {
        Lazy::force(&RUBY);
        Lazy::force(&YAML);
        Lazy::force(&BASH);
    }

    /// The grammar registry: one tree-sitter language per dialect. YAML-family
    /// and shell-family dialects share a grammar but keep separate rule tables.
    pub fn language_for(dialect: Dialect) -> &'static Language {
        match dialect {
            Dialect::Chef => &RUBY,
            Dialect::Ansible | Dialect::Salt => &YAML,
            Dialect::Shell | Dialect::Bladelogic => &BASH,
        }
    }

    /// A parsed file: the tree plus the source it indexes into.
    pub struct ParsedSource {
        pub tree: Tree,
        pub source: Vec<u8>,
        pub path: String,
        /// Total node count, denominator for error density.
        pub node_count: usize,
    }

    impl ParsedSource {
        /// Get text for a tree-sitter node.
        pub fn node_text(&self, node: tree_sitter::Node) -> &str {
            node.utf8_text(&self.source).unwrap_or("")
        }
    }

    /// Outcome of structural parsing.
    pub enum ParseOutcome {
        /// A clean tree.
        Parsed { parsed: ParsedSource, error_count: usize },
        /// A tree with error nodes, still within the configured cap.
        PartiallyParsed { parsed: ParsedSource, error_count: usize },
        /// No usable tree.
        Failed { reason: ParseFailReason },
    }

    impl ParseOutcome {
        pub fn error_count(&self) -> usize {
            match self {
                ParseOutcome::Parsed { error_count, .. }
                | ParseOutcome::PartiallyParsed { error_count, .. } => *error_count,
                ParseOutcome::Failed { .. } => 0,
            }
        }

        /// Error nodes per total nodes, in [0,1].
        pub fn error_density(&self) -> f64 {
            match self {
                ParseOutcome::Parsed { parsed, error_count }
                | ParseOutcome::PartiallyParsed { parsed, error_count } => {
                    *error_count as f64 / parsed.node_count.max(1) as f64
                }
                ParseOutcome::Failed { .. } => 1.0,
            }
        }
    }

    /// Walk the whole tree counting nodes and error/missing nodes.
    fn count_nodes(tree: &Tree) -> (usize, usize) {
        let mut cursor = tree.walk();
        let mut total = 0usize;
        let mut errors = 0usize;

        'walk: loop {
            let node = cursor.node();
            total += 1;
            if node.is_error() || node.is_missing() {
                errors += 1;
            }

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    continue 'walk;
                }
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }

        (total, errors)
    }

    /// Parse `content` under the dialect's grammar.
    ///
    /// Never blocks past `timeout` and never panics on arbitrary bytes.
    pub fn parse(
        path: &str,
        content: &[u8],
        dialect: Dialect,
        timeout: Duration,
        max_errors: usize,
    ) -> ParseOutcome {
        let mut parser = TsParser::new();
        if parser.set_language(language_for(dialect)).is_err() {
            return ParseOutcome::Failed {
                reason: ParseFailReason::GrammarUnavailable,
            };
        }
        parser.set_timeout_micros(timeout.as_micros() as u64);

        let started = Instant::now();
        let tree = match parser.parse(content, None) {
            Some(tree) => tree,
            None => {
                let reason = if started.elapsed() >= timeout {
                    ParseFailReason::Timeout
                } else {
                    ParseFailReason::NoTree
                };
                return ParseOutcome::Failed { reason };
            }
        };

        let (node_count, error_count) = count_nodes(&tree);
        let parsed = ParsedSource {
            tree,
            source: content.to_vec(),
            path: path.to_string(),
            node_count,
        };

        if error_count == 0 {
            ParseOutcome::Parsed { parsed, error_count }
        } else if error_count <= max_errors {
            ParseOutcome::PartiallyParsed { parsed, error_count }
        } else {
            ParseOutcome::Failed {
                reason: ParseFailReason::TooManyErrors,
            }
        }
    }
}

#[cfg(all(test, feature = "tree-sitter"))]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use std::time::Duration;

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn test_parse_clean_ruby() {
        let source = b"package \"nginx\" do\n  action :install\nend\n";
        let outcome = parse("default.rb", source, Dialect::Chef, timeout(), 50);
        match outcome {
            ParseOutcome::Parsed { error_count, .. } => assert_eq!(error_count, 0),
            _ => panic!("clean source should parse cleanly"),
        }
    }

    #[test]
    fn test_parse_broken_ruby_counts_errors() {
        // Missing `end`.
        let source = b"package \"nginx\" do\n  action :install\n";
        let outcome = parse("broken.rb", source, Dialect::Chef, timeout(), 50);
        match outcome {
            ParseOutcome::PartiallyParsed { error_count, .. } => assert!(error_count > 0),
            ParseOutcome::Parsed { .. } => panic!("broken source should report errors"),
            ParseOutcome::Failed { .. } => {} // also acceptable: cap semantics
        }
    }

    #[test]
    fn test_error_cap_forces_failure() {
        let source = b"package \"nginx\" do\n  action :install\n";
        let outcome = parse("broken.rb", source, Dialect::Chef, timeout(), 0);
        match outcome {
            ParseOutcome::Failed { reason } => {
                assert_eq!(reason, ParseFailReason::TooManyErrors)
            }
            _ => panic!("zero error budget must fail a broken parse"),
        }
    }

    #[test]
    fn test_parse_yaml_and_bash() {
        let yaml = b"---\n- hosts: web\n  tasks:\n    - apt:\n        name: nginx\n";
        assert!(matches!(
            parse("site.yml", yaml, Dialect::Ansible, timeout(), 50),
            ParseOutcome::Parsed { .. }
        ));

        let bash = b"#!/bin/bash\nyum install -y nginx\n";
        assert!(matches!(
            parse("run.sh", bash, Dialect::Shell, timeout(), 50),
            ParseOutcome::Parsed { .. }
        ));
    }

    #[test]
    fn test_arbitrary_bytes_never_panic() {
        let junk: Vec<u8> = (0..255u8).collect();
        let _ = parse("junk.rb", &junk, Dialect::Chef, timeout(), 50);
    }

    #[test]
    fn test_error_density() {
        let source = b"package \"nginx\" do\n  action :install\n";
        let outcome = parse("broken.rb", source, Dialect::Chef, timeout(), 50);
        assert!(outcome.error_density() > 0.0);
        assert!(outcome.error_density() <= 1.0);
    }
}
