//! Structural extractor for the cookbook-resource dialect (Ruby trees).
//!
//! Chef recipes declare resources as bare method calls with a string name and
//! an optional `do ... end` attribute block:
//!
//! ```ruby
//! package "nginx" do
//!   action :install
//! end
//! include_recipe "nginx::ssl"
//! ```
//!
//! The walker matches call nodes against the rule table. A matched resource
//! block is consumed whole: its inner calls become attributes, never separate
//! resources, so `group "root"` inside a template block stays an attribute.

use tree_sitter::Node;

use crate::dialect::rules::DialectRules;
use crate::facts::{AttrValue, ExtractionMethod, Fact, FactKind, SourceLocation};
use crate::parser::ParsedSource;

use super::unquote;

/// Node kinds that represent a method call across tree-sitter-ruby versions.
const CALL_KINDS: &[&str] = &["call", "command", "command_call", "method_call"];

/// Maximum depth when searching a call's arguments for the name literal.
const ARG_SEARCH_DEPTH: usize = 3;

pub fn extract(parsed: &ParsedSource, rules: &'static DialectRules, confidence: f64) -> Vec<Fact> {
    let mut facts = Vec::new();
    let is_metadata_file = parsed.path.ends_with("metadata.rb");

    let mut stack = vec![parsed.tree.root_node()];
    while let Some(node) = stack.pop() {
        if CALL_KINDS.contains(&node.kind()) {
            if let Some(word) = call_method_name(parsed, node) {
                if visit_call(parsed, rules, confidence, is_metadata_file, node, &word, &mut facts) {
                    // Matched calls own their block; don't descend.
                    continue;
                }
            }
        } else if node.kind() == "assignment" && rules.extract_variables {
            if let Some(fact) = variable_fact(parsed, rules, confidence, node) {
                facts.push(fact);
                continue;
            }
        }

        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }

    facts
}

/// Handle one matched call node. Returns true when the node produced a fact
/// (and its subtree should be skipped).
fn visit_call(
    parsed: &ParsedSource,
    rules: &'static DialectRules,
    confidence: f64,
    is_metadata_file: bool,
    node: Node,
    word: &str,
    facts: &mut Vec<Fact>,
) -> bool {
    let location = location_of(parsed, node);

    if let Some(dep) = rules.dependency_calls.iter().find(|c| c.word == word) {
        let Some(target) = first_string_arg(parsed, node) else {
            return false;
        };
        facts.push(Fact::new(
            FactKind::Dependency,
            rules.dialect,
            dep.resource_type,
            &target,
            location.clone(),
            confidence,
            ExtractionMethod::Structural,
        ));
        if dep.site_resource {
            facts.push(Fact::new(
                FactKind::Resource,
                rules.dialect,
                dep.resource_type,
                &target,
                location,
                confidence,
                ExtractionMethod::Structural,
            ));
        }
        return true;
    }

    if let Some(resource_type) = rules.resource_type_for(word) {
        let Some(name) = first_string_arg(parsed, node) else {
            return false;
        };
        let mut fact = Fact::new(
            FactKind::Resource,
            rules.dialect,
            resource_type,
            &name,
            location,
            confidence,
            ExtractionMethod::Structural,
        );
        if let Some(block) = block_of(node) {
            collect_block_attributes(parsed, block, &mut fact);
        }
        facts.push(fact);
        return true;
    }

    if is_metadata_file && rules.extract_metadata && rules.metadata_fields.contains(&word) {
        let Some(value) = first_string_arg(parsed, node) else {
            return false;
        };
        facts.push(
            Fact::new(
                FactKind::Metadata,
                rules.dialect,
                "metadata",
                word,
                location,
                confidence,
                ExtractionMethod::Structural,
            )
            .with_attr("value", AttrValue::from_scalar(&value)),
        );
        return true;
    }

    false
}

/// The identifier a call dispatches to: the `method` field when present,
/// otherwise the first identifier child.
fn call_method_name(parsed: &ParsedSource, node: Node) -> Option<String> {
    if let Some(method) = node.child_by_field_name("method") {
        if method.kind() == "identifier" {
            return Some(parsed.node_text(method).to_string());
        }
    }
    for i in 0..node.child_count() {
        let child = node.child(i)?;
        if child.kind() == "identifier" {
            return Some(parsed.node_text(child).to_string());
        }
    }
    None
}

/// Depth-limited search for the first string literal argument.
fn first_string_arg(parsed: &ParsedSource, node: Node) -> Option<String> {
    fn walk(parsed: &ParsedSource, node: Node, depth: usize) -> Option<String> {
        if depth > ARG_SEARCH_DEPTH {
            return None;
        }
        if node.kind().contains("string") {
            return Some(string_content(parsed, node));
        }
        // Don't wander into the attribute block looking for the name.
        if node.kind() == "do_block" || node.kind() == "block" {
            return None;
        }
        for i in 0..node.child_count() {
            if let Some(found) = walk(parsed, node.child(i)?, depth + 1) {
                return Some(found);
            }
        }
        None
    }

    // Skip the method identifier itself.
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        if child.kind() == "identifier" {
            continue;
        }
        if let Some(found) = walk(parsed, child, 0) {
            let trimmed = found.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

/// Text of a string node, preferring the `string_content` child.
fn string_content(parsed: &ParsedSource, node: Node) -> String {
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.kind().contains("content") {
                return parsed.node_text(child).to_string();
            }
        }
    }
    unquote(parsed.node_text(node)).to_string()
}

/// The attribute block attached to a resource call, if any.
fn block_of(node: Node) -> Option<Node> {
    if let Some(block) = node.child_by_field_name("block") {
        return Some(block);
    }
    for i in 0..node.child_count() {
        let child = node.child(i)?;
        if child.kind() == "do_block" || child.kind() == "block" {
            return Some(child);
        }
    }
    None
}

/// Turn `action :install` / `owner "root"` / `mode "0644"` lines inside a
/// resource block into attributes on the fact.
fn collect_block_attributes(parsed: &ParsedSource, block: Node, fact: &mut Fact) {
    let mut stack = vec![block];
    while let Some(node) = stack.pop() {
        if CALL_KINDS.contains(&node.kind()) {
            if let Some(key) = call_method_name(parsed, node) {
                if let Some(value) = first_scalar_arg(parsed, node) {
                    fact.attributes.entry(key).or_insert(value);
                }
            }
            continue;
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }
}

/// First scalar argument of an attribute call: string, symbol, number, bool.
fn first_scalar_arg(parsed: &ParsedSource, node: Node) -> Option<AttrValue> {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        if child.kind() == "identifier" {
            continue;
        }
        if let Some(value) = scalar_of(parsed, child, 0) {
            return Some(value);
        }
    }
    None
}

fn scalar_of(parsed: &ParsedSource, node: Node, depth: usize) -> Option<AttrValue> {
    if depth > 2 {
        return None;
    }
    match node.kind() {
        k if k.contains("string") => Some(AttrValue::Str(string_content(parsed, node))),
        "simple_symbol" | "symbol" => Some(AttrValue::Str(
            parsed.node_text(node).trim_start_matches(':').to_string(),
        )),
        "integer" | "float" => parsed.node_text(node).parse::<f64>().ok().map(AttrValue::Num),
        "true" => Some(AttrValue::Bool(true)),
        "false" => Some(AttrValue::Bool(false)),
        _ => {
            for i in 0..node.child_count() {
                if let Some(found) = scalar_of(parsed, node.child(i)?, depth + 1) {
                    return Some(found);
                }
            }
            None
        }
    }
}

/// `default[...] = value` / `node.default[...] = value` attribute assignments.
fn variable_fact(
    parsed: &ParsedSource,
    rules: &'static DialectRules,
    confidence: f64,
    node: Node,
) -> Option<Fact> {
    let left = node.child_by_field_name("left")?;
    let left_text = parsed.node_text(left);
    if !(left_text.starts_with("default[") || left_text.starts_with("node.")) {
        return None;
    }
    let right = node.child_by_field_name("right")?;
    let value = unquote(parsed.node_text(right));

    Some(
        Fact::new(
            FactKind::Variable,
            rules.dialect,
            "variable",
            left_text,
            location_of(parsed, node),
            confidence,
            ExtractionMethod::Structural,
        )
        .with_attr("value", AttrValue::from_scalar(value)),
    )
}

fn location_of(parsed: &ParsedSource, node: Node) -> SourceLocation {
    SourceLocation {
        file: parsed.path.clone(),
        line: node.start_position().row + 1,
    }
}
