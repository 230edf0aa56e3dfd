//! Structural extractor for YAML-family dialects: playbooks and Salt states.
//!
//! Both dialects are mappings all the way down but name things differently:
//! a playbook task keys on the module (`apt:`) with the target nested under
//! `name:`, while a Salt state keys on the state id with the module function
//! (`pkg.installed:`) one level below. The walker carries the enclosing
//! mapping key so both forms resolve to a named fact from one rule table.

use tree_sitter::Node;

use crate::dialect::rules::DialectRules;
use crate::facts::{AttrValue, ExtractionMethod, Fact, FactKind, SourceLocation};
use crate::parser::ParsedSource;

use super::unquote;

pub fn extract(parsed: &ParsedSource, rules: &'static DialectRules, confidence: f64) -> Vec<Fact> {
    let mut facts = Vec::new();
    visit(parsed, rules, confidence, parsed.tree.root_node(), None, &mut facts);
    facts
}

/// Recursive walk over mapping pairs. `parent_key` is the key of the pair
/// whose value subtree we are inside (the Salt state id position).
fn visit(
    parsed: &ParsedSource,
    rules: &'static DialectRules,
    confidence: f64,
    node: Node,
    parent_key: Option<&str>,
    facts: &mut Vec<Fact>,
) {
    if node.kind() == "block_mapping_pair" || node.kind() == "flow_pair" {
        if let Some(key) = pair_key(parsed, node) {
            if visit_pair(parsed, rules, confidence, node, &key, parent_key, facts) {
                return;
            }
            // Descend with this pair's key as the new enclosing key.
            if let Some(value) = node.child_by_field_name("value") {
                visit(parsed, rules, confidence, value, Some(&key), facts);
            }
            return;
        }
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            visit(parsed, rules, confidence, child, parent_key, facts);
        }
    }
}

/// Apply the rule table to one `key: value` pair. Returns true when the pair
/// was consumed (no further descent).
fn visit_pair(
    parsed: &ParsedSource,
    rules: &'static DialectRules,
    confidence: f64,
    pair: Node,
    key: &str,
    parent_key: Option<&str>,
    facts: &mut Vec<Fact>,
) -> bool {
    let location = location_of(parsed, pair);

    // Dependency references: `roles:`, `include_role:`, Salt `include:`.
    if let Some(dep) = rules.dependency_calls.iter().find(|c| c.word == key) {
        let value = pair.child_by_field_name("value");
        let targets = value.map(|v| list_targets(parsed, v)).unwrap_or_default();
        for target in targets {
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
                    location.clone(),
                    confidence,
                    ExtractionMethod::Structural,
                ));
            }
        }
        return true;
    }

    // Playbook module keys match exactly (FQCN keys like
    // `ansible.builtin.apt` match on the last segment); Salt state functions
    // match on the module prefix of `module.function`.
    let prefixed = key.contains('.');
    let module_word = if rules.dialect == crate::dialect::Dialect::Salt {
        key.split('.').next().unwrap_or(key)
    } else {
        key.rsplit('.').next().unwrap_or(key)
    };
    if let Some(resource_type) = rules.resource_type_for(module_word) {
        if prefixed || rules.dialect != crate::dialect::Dialect::Salt {
            let name = pair
                .child_by_field_name("value")
                .and_then(|v| nested_name(parsed, v))
                .or_else(|| sibling_name(parsed, pair))
                .or_else(|| {
                    if prefixed {
                        parent_key.map(|k| k.to_string())
                    } else {
                        None
                    }
                });
            if let Some(name) = name {
                let mut fact = Fact::new(
                    FactKind::Resource,
                    rules.dialect,
                    resource_type,
                    &name,
                    location,
                    confidence,
                    ExtractionMethod::Structural,
                );
                if let Some(value) = pair.child_by_field_name("value") {
                    collect_mapping_attributes(parsed, value, &mut fact);
                }
                facts.push(fact);
                return true;
            }
        }
    }

    // Play-level metadata: `hosts:`, `become:`.
    if rules.extract_metadata && rules.metadata_fields.contains(&key) {
        if let Some(value) = pair.child_by_field_name("value").and_then(|v| scalar_text(parsed, v)) {
            facts.push(
                Fact::new(
                    FactKind::Metadata,
                    rules.dialect,
                    "metadata",
                    key,
                    location,
                    confidence,
                    ExtractionMethod::Structural,
                )
                .with_attr("value", AttrValue::from_scalar(&value)),
            );
            return true;
        }
    }

    // `vars:` blocks become Variable facts.
    if rules.extract_variables && key == "vars" {
        if let Some(value) = pair.child_by_field_name("value") {
            collect_vars(parsed, rules, confidence, value, facts);
        }
        return true;
    }

    false
}

fn pair_key(parsed: &ParsedSource, pair: Node) -> Option<String> {
    let key = pair.child_by_field_name("key")?;
    let text = unquote(parsed.node_text(key)).to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Scalar text of a value node, if it is (or wraps) a single scalar.
fn scalar_text(parsed: &ParsedSource, node: Node) -> Option<String> {
    match node.kind() {
        "plain_scalar" | "single_quote_scalar" | "double_quote_scalar" | "string_scalar" => {
            Some(unquote(parsed.node_text(node)).to_string())
        }
        "flow_node" | "block_node" | "flow_scalar" => {
            for i in 0..node.child_count() {
                if let Some(found) = scalar_text(parsed, node.child(i)?) {
                    return Some(found);
                }
            }
            None
        }
        _ => None,
    }
}

/// Find a nested `name:` under a module value, or read the name out of a
/// `name=nginx state=present` inline string.
fn nested_name(parsed: &ParsedSource, value: Node) -> Option<String> {
    if let Some(scalar) = scalar_text(parsed, value) {
        if let Some(rest) = scalar.split_whitespace().find_map(|t| t.strip_prefix("name=")) {
            return Some(rest.to_string());
        }
        return None;
    }

    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        if node.kind() == "block_mapping_pair" || node.kind() == "flow_pair" {
            if pair_key(parsed, node).as_deref() == Some("name") {
                if let Some(v) = node.child_by_field_name("value") {
                    return scalar_text(parsed, v);
                }
            }
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                stack.push(child);
            }
        }
    }
    None
}

/// Task-level `name:` in the same mapping as the module key.
fn sibling_name(parsed: &ParsedSource, pair: Node) -> Option<String> {
    let mapping = pair.parent()?;
    for i in 0..mapping.child_count() {
        let sibling = mapping.child(i)?;
        if sibling.id() == pair.id() {
            continue;
        }
        if sibling.kind() == "block_mapping_pair" || sibling.kind() == "flow_pair" {
            if pair_key(parsed, sibling).as_deref() == Some("name") {
                return sibling
                    .child_by_field_name("value")
                    .and_then(|v| scalar_text(parsed, v));
            }
        }
    }
    None
}

/// Targets of a dependency value: a single scalar, a sequence of scalars, or
/// sequence items carrying a `role:`/`name:` mapping.
fn list_targets(parsed: &ParsedSource, value: Node) -> Vec<String> {
    if let Some(scalar) = scalar_text(parsed, value) {
        return vec![scalar];
    }

    let mut targets = Vec::new();
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        if node.kind() == "block_sequence_item" {
            if let Some(scalar) = item_scalar(parsed, node) {
                targets.push(scalar);
            } else {
                // `- role: common` item form
                let mut inner = vec![node];
                while let Some(n) = inner.pop() {
                    if n.kind() == "block_mapping_pair" || n.kind() == "flow_pair" {
                        let key = pair_key(parsed, n);
                        if matches!(key.as_deref(), Some("role") | Some("name")) {
                            if let Some(v) = n.child_by_field_name("value") {
                                if let Some(scalar) = scalar_text(parsed, v) {
                                    targets.push(scalar);
                                }
                            }
                        }
                        continue;
                    }
                    for i in (0..n.child_count()).rev() {
                        if let Some(child) = n.child(i) {
                            inner.push(child);
                        }
                    }
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
    targets
}

/// Scalar content of a plain `- value` sequence item.
fn item_scalar(parsed: &ParsedSource, item: Node) -> Option<String> {
    for i in 0..item.child_count() {
        if let Some(found) = scalar_text(parsed, item.child(i)?) {
            return Some(found);
        }
    }
    None
}

/// Scalar pairs under a module value become attributes (except `name`).
fn collect_mapping_attributes(parsed: &ParsedSource, value: Node, fact: &mut Fact) {
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        if node.kind() == "block_mapping_pair" || node.kind() == "flow_pair" {
            if let Some(key) = pair_key(parsed, node) {
                if key != "name" {
                    if let Some(v) = node.child_by_field_name("value").and_then(|v| scalar_text(parsed, v)) {
                        fact.attributes.entry(key).or_insert(AttrValue::from_scalar(&v));
                    }
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

fn collect_vars(
    parsed: &ParsedSource,
    rules: &'static DialectRules,
    confidence: f64,
    value: Node,
    facts: &mut Vec<Fact>,
) {
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        if node.kind() == "block_mapping_pair" || node.kind() == "flow_pair" {
            if let Some(key) = pair_key(parsed, node) {
                let mut fact = Fact::new(
                    FactKind::Variable,
                    rules.dialect,
                    "variable",
                    &key,
                    location_of(parsed, node),
                    confidence,
                    ExtractionMethod::Structural,
                );
                if let Some(v) = node.child_by_field_name("value").and_then(|v| scalar_text(parsed, v)) {
                    fact = fact.with_attr("value", AttrValue::from_scalar(&v));
                }
                facts.push(fact);
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

fn location_of(parsed: &ParsedSource, node: Node) -> SourceLocation {
    SourceLocation {
        file: parsed.path.clone(),
        line: node.start_position().row + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::rules::rules_for;
    use crate::dialect::Dialect;
    use crate::facts::STRUCTURAL_BASELINE;
    use crate::parser::{parse, ParseOutcome};
    use std::time::Duration;

    fn extract_yaml(dialect: Dialect, path: &str, source: &str) -> Vec<Fact> {
        let parsed = match parse(path, source.as_bytes(), dialect, Duration::from_secs(5), 50) {
            ParseOutcome::Parsed { parsed, .. } | ParseOutcome::PartiallyParsed { parsed, .. } => {
                parsed
            }
            ParseOutcome::Failed { reason } => panic!("parse failed: {}", reason),
        };
        extract(&parsed, rules_for(dialect), STRUCTURAL_BASELINE)
    }

    #[test]
    fn test_ansible_task_with_nested_name() {
        let source = "---\n- hosts: web\n  tasks:\n    - name: install web server\n      apt:\n        name: nginx\n        state: present\n";
        let facts = extract_yaml(Dialect::Ansible, "site.yml", source);

        let pkg = facts
            .iter()
            .find(|f| f.resource_type == "package")
            .expect("package fact");
        assert_eq!(pkg.name, "nginx");
        assert_eq!(
            pkg.attributes.get("state"),
            Some(&AttrValue::Str("present".to_string()))
        );

        assert!(facts
            .iter()
            .any(|f| f.kind == FactKind::Metadata && f.name == "hosts"));
    }

    #[test]
    fn test_ansible_roles_and_vars() {
        let source = "---\n- hosts: all\n  vars:\n    http_port: 8080\n  roles:\n    - common\n";
        let facts = extract_yaml(Dialect::Ansible, "site.yml", source);

        assert!(facts
            .iter()
            .any(|f| f.kind == FactKind::Dependency && f.resource_type == "role" && f.name == "common"));
        assert!(facts
            .iter()
            .any(|f| f.kind == FactKind::Variable && f.name == "http_port"));
    }

    #[test]
    fn test_salt_state_named_by_id() {
        let source = "nginx:\n  pkg.installed: []\n  service.running:\n    - enable: True\n";
        let facts = extract_yaml(Dialect::Salt, "webserver.sls", source);

        assert!(facts
            .iter()
            .any(|f| f.resource_type == "package" && f.name == "nginx"));
        assert!(facts
            .iter()
            .any(|f| f.resource_type == "service" && f.name == "nginx"));
    }

    #[test]
    fn test_salt_include_list() {
        let source = "include:\n  - common\n  - webserver.tuning\n";
        let facts = extract_yaml(Dialect::Salt, "top.sls", source);

        let targets: Vec<&str> = facts
            .iter()
            .filter(|f| f.kind == FactKind::Dependency)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(targets, vec!["common", "webserver.tuning"]);
    }
}
