//! Line-pattern fallback extractor.
//!
//! Used when structural parsing fails, exceeds the error thresholds, or is
//! compiled out. Patterns are generated from the same dialect rule tables the
//! structural extractors read, so a fallback fact has the same resource-type
//! and dependency vocabulary — only `method` and `confidence` differ.
//!
//! This module must never fail on arbitrary text: no matches means zero
//! facts, not an error.

use std::collections::HashMap;

use regex::Regex;

use crate::dialect::rules::{DependencyCall, DialectRules, ResourceCall, SyntaxFamily};
use crate::dialect::Dialect;
use crate::facts::{AttrValue, ExtractionMethod, Fact, FactKind, SourceLocation};

use super::{pick_target, unquote};

/// How far ahead a YAML module key looks for its `name:` line.
const NAME_LOOKAHEAD: usize = 6;

/// Pre-compiled patterns for one dialect.
struct FallbackPatterns {
    resources: Vec<(Regex, &'static ResourceCall)>,
    dependencies: Vec<(Regex, &'static DependencyCall)>,
    metadata: Vec<(Regex, &'static str)>,
    variable: Option<Regex>,
    /// YAML only: `name:` lookahead line.
    yaml_name: Option<Regex>,
    /// YAML only: unindented `id:` line opening a Salt state block.
    yaml_state_id: Option<Regex>,
    /// YAML only: `- item` list entry under a dependency key.
    yaml_list_item: Option<Regex>,
}

lazy_static::lazy_static! {
    static ref PATTERNS: HashMap<Dialect, FallbackPatterns> = {
        let mut map = HashMap::new();
        for rules in crate::dialect::rules::all_rules() {
            map.insert(rules.dialect, compile(rules));
        }
        map
    };
}

fn compile(rules: &'static DialectRules) -> FallbackPatterns {
    let mut resources = Vec::new();
    let mut dependencies = Vec::new();
    let mut metadata = Vec::new();

    match rules.family {
        SyntaxFamily::RubyBlock => {
            for call in rules.resource_calls {
                let re = Regex::new(&format!(
                    r#"^\s*{}\s+['"]([^'"]+)['"]"#,
                    regex::escape(call.word)
                ))
                .expect("static pattern");
                resources.push((re, call));
            }
            for call in rules.dependency_calls {
                let re = Regex::new(&format!(
                    r#"^\s*{}\s+['"]([^'"]+)['"]"#,
                    regex::escape(call.word)
                ))
                .expect("static pattern");
                dependencies.push((re, call));
            }
            for field in rules.metadata_fields {
                let re = Regex::new(&format!(
                    r#"^\s*{}\s+['"]([^'"]+)['"]"#,
                    regex::escape(field)
                ))
                .expect("static pattern");
                metadata.push((re, *field));
            }
        }
        SyntaxFamily::YamlMapping => {
            for call in rules.resource_calls {
                let re = Regex::new(&format!(
                    r#"^\s*(?:-\s+)?{}(?:\.[a-z_]+)?\s*:\s*(.*)$"#,
                    regex::escape(call.word)
                ))
                .expect("static pattern");
                resources.push((re, call));
            }
            for call in rules.dependency_calls {
                let re = Regex::new(&format!(
                    r#"^\s*(?:-\s+)?{}\s*:\s*(\S*)\s*$"#,
                    regex::escape(call.word)
                ))
                .expect("static pattern");
                dependencies.push((re, call));
            }
            for field in rules.metadata_fields {
                let re = Regex::new(&format!(
                    r#"^\s*{}\s*:\s*(\S.*)$"#,
                    regex::escape(field)
                ))
                .expect("static pattern");
                metadata.push((re, *field));
            }
        }
        SyntaxFamily::ShellCommand => {
            for call in rules.resource_calls {
                let re = Regex::new(&format!(
                    r#"(?:^|[;&|]\s*)\s*{}\s+(.+)$"#,
                    regex::escape(call.word)
                ))
                .expect("static pattern");
                resources.push((re, call));
            }
            for call in rules.dependency_calls {
                let re = Regex::new(&format!(
                    r#"^\s*{}\s+(\S+)"#,
                    regex::escape(call.word)
                ))
                .expect("static pattern");
                dependencies.push((re, call));
            }
        }
    }

    let variable = match rules.family {
        SyntaxFamily::RubyBlock => Some(
            Regex::new(r#"^\s*((?:node\.)?default(?:\[[^\]]+\])+)\s*=\s*(.+)$"#)
                .expect("static pattern"),
        ),
        SyntaxFamily::ShellCommand => Some(
            Regex::new(r#"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$"#).expect("static pattern"),
        ),
        SyntaxFamily::YamlMapping => None,
    };

    let yaml = rules.family == SyntaxFamily::YamlMapping;
    FallbackPatterns {
        resources,
        dependencies,
        metadata,
        variable,
        yaml_name: yaml
            .then(|| Regex::new(r#"^\s+name\s*:\s*(\S.*)$"#).expect("static pattern")),
        yaml_state_id: yaml
            .then(|| Regex::new(r#"^([A-Za-z0-9_\-\./]+)\s*:\s*$"#).expect("static pattern")),
        yaml_list_item: yaml
            .then(|| Regex::new(r#"^\s+-\s+(?:role\s*:\s*)?([\w\.\-/]+)\s*$"#).expect("static pattern")),
    }
}

/// Extract facts from raw text using the dialect's line patterns.
pub fn extract(path: &str, text: &str, rules: &'static DialectRules, confidence: f64) -> Vec<Fact> {
    let patterns = match PATTERNS.get(&rules.dialect) {
        Some(p) => p,
        None => return Vec::new(),
    };

    let lines: Vec<&str> = text.lines().collect();
    let mut facts = Vec::new();
    // Cookbook metadata fields only live in metadata.rb.
    let metadata_active = rules.extract_metadata
        && (rules.family != SyntaxFamily::RubyBlock || path.ends_with("metadata.rb"));
    let mut state_id: Option<String> = None;
    // Line index (0-based) up to which dependency list items are consumed.
    let mut dep_list: Option<(&'static DependencyCall, usize)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let lineno = idx + 1;
        let location = |l: usize| SourceLocation {
            file: path.to_string(),
            line: l,
        };

        // Track the enclosing Salt state id for `mod.func:` lines.
        if let Some(re) = &patterns.yaml_state_id {
            if let Some(caps) = re.captures(line) {
                state_id = Some(caps[1].to_string());
            }
        }

        // Consume list items under an open dependency key.
        if let Some((call, start)) = dep_list {
            if idx > start {
                if let Some(re) = &patterns.yaml_list_item {
                    if let Some(caps) = re.captures(line) {
                        push_dependency(&mut facts, rules, call, &caps[1], location(lineno), confidence);
                        continue;
                    }
                }
                dep_list = None;
            }
        }

        if metadata_active {
            for (re, field) in &patterns.metadata {
                if let Some(caps) = re.captures(line) {
                    let value = unquote(&caps[1]);
                    facts.push(
                        Fact::new(
                            FactKind::Metadata,
                            rules.dialect,
                            "metadata",
                            field,
                            location(lineno),
                            confidence,
                            ExtractionMethod::Fallback,
                        )
                        .with_attr("value", AttrValue::from_scalar(value)),
                    );
                }
            }
        }

        for (re, call) in &patterns.dependencies {
            if let Some(caps) = re.captures(line) {
                let target = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                if target.is_empty() {
                    // `include:` / `roles:` opening a list.
                    dep_list = Some((*call, idx));
                } else {
                    push_dependency(&mut facts, rules, call, unquote(target), location(lineno), confidence);
                }
            }
        }

        for (re, call) in &patterns.resources {
            let Some(caps) = re.captures(line) else { continue };
            let rest = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");

            let name = match rules.family {
                SyntaxFamily::RubyBlock => Some(rest.to_string()),
                SyntaxFamily::ShellCommand => {
                    let cleaned = rest.split(&['#', ';'][..]).next().unwrap_or("");
                    pick_target(cleaned.split_whitespace().map(unquote)).0
                }
                SyntaxFamily::YamlMapping => yaml_name(rest, &lines, idx, patterns, &state_id),
            };

            if let Some(name) = name {
                facts.push(Fact::new(
                    FactKind::Resource,
                    rules.dialect,
                    call.resource_type,
                    &name,
                    location(lineno),
                    confidence,
                    ExtractionMethod::Fallback,
                ));
            }
        }

        if rules.extract_variables {
            if let Some(re) = &patterns.variable {
                if let Some(caps) = re.captures(line) {
                    let value = unquote(&caps[2]);
                    facts.push(
                        Fact::new(
                            FactKind::Variable,
                            rules.dialect,
                            "variable",
                            caps[1].trim(),
                            location(lineno),
                            confidence,
                            ExtractionMethod::Fallback,
                        )
                        .with_attr("value", AttrValue::from_scalar(value)),
                    );
                }
            }
        }
    }

    facts
}

fn push_dependency(
    facts: &mut Vec<Fact>,
    rules: &'static DialectRules,
    call: &'static DependencyCall,
    target: &str,
    location: SourceLocation,
    confidence: f64,
) {
    facts.push(Fact::new(
        FactKind::Dependency,
        rules.dialect,
        call.resource_type,
        target,
        location.clone(),
        confidence,
        ExtractionMethod::Fallback,
    ));
    if call.site_resource {
        facts.push(Fact::new(
            FactKind::Resource,
            rules.dialect,
            call.resource_type,
            target,
            location,
            confidence,
            ExtractionMethod::Fallback,
        ));
    }
}

/// Resolve a YAML resource name: inline value, `name=` token, Salt state id,
/// or a `name:` line within the lookahead window.
fn yaml_name(
    inline: &str,
    lines: &[&str],
    idx: usize,
    patterns: &FallbackPatterns,
    state_id: &Option<String>,
) -> Option<String> {
    if !inline.is_empty() {
        if let Some(name) = inline
            .split_whitespace()
            .find_map(|t| t.strip_prefix("name="))
        {
            return Some(name.to_string());
        }
        let token = unquote(inline);
        if !token.is_empty()
            && !token.starts_with('{')
            && !token.starts_with('[')
            && !token.starts_with('|')
            && !token.starts_with('>')
            && !token.starts_with('#')
        {
            return Some(token.split_whitespace().next().unwrap_or(token).to_string());
        }
    }

    if let Some(re) = &patterns.yaml_name {
        for line in lines.iter().skip(idx + 1).take(NAME_LOOKAHEAD) {
            if let Some(caps) = re.captures(line) {
                return Some(unquote(&caps[1]).to_string());
            }
        }
    }

    state_id.clone()
}
