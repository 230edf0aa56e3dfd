//! Fact extraction: structural walkers per syntax family, plus the
//! line-pattern fallback extractor.
//!
//! All extractors read the same `DialectRules` tables, so a fact has the same
//! shape whether it came from a tree walk or a regex match; only `method` and
//! `confidence` differ.

pub mod fallback;

#[cfg(feature = "tree-sitter")]
mod chef;
#[cfg(feature = "tree-sitter")]
mod shell;
#[cfg(feature = "tree-sitter")]
mod yaml_doc;

#[cfg(feature = "tree-sitter")]
use crate::dialect::rules::{DialectRules, SyntaxFamily};
#[cfg(feature = "tree-sitter")]
use crate::facts::Fact;
#[cfg(feature = "tree-sitter")]
use crate::parser::ParsedSource;

/// Run the structural extractor for the dialect's syntax family.
///
/// `confidence` is already scaled for tree quality by the caller.
#[cfg(feature = "tree-sitter")]
pub fn structural(parsed: &ParsedSource, rules: &'static DialectRules, confidence: f64) -> Vec<Fact> {
    match rules.family {
        SyntaxFamily::RubyBlock => chef::extract(parsed, rules, confidence),
        SyntaxFamily::YamlMapping => yaml_doc::extract(parsed, rules, confidence),
        SyntaxFamily::ShellCommand => shell::extract(parsed, rules, confidence),
    }
}

/// Strip surrounding quotes from a scalar token.
pub(crate) fn unquote(raw: &str) -> &str {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Argument words that name an operation rather than a target, skipped when
/// picking the resource name out of a command line.
pub(crate) const COMMAND_VERBS: &[&str] = &[
    "install",
    "add",
    "remove",
    "erase",
    "update",
    "upgrade",
    "start",
    "stop",
    "restart",
    "reload",
    "enable",
    "disable",
    "status",
    "deploy",
    "execute",
    "is-active",
    "daemon-reload",
    // Subcommand words naming a category rather than a target
    // (`blcli service nginx`, `blcli file deploy ...`).
    "service",
    "file",
    "template",
];

/// Pick the first argument that plausibly names a target: not a flag, not an
/// operation verb. Returns the verb seen on the way, if any.
pub(crate) fn pick_target<'a>(args: impl Iterator<Item = &'a str>) -> (Option<String>, Option<String>) {
    let mut verb = None;
    for arg in args {
        if arg.starts_with('-') {
            continue;
        }
        if COMMAND_VERBS.contains(&arg) {
            if verb.is_none() {
                verb = Some(arg.to_string());
            }
            continue;
        }
        return (Some(arg.to_string()), verb);
    }
    (None, verb)
}
