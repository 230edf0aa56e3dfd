//! Structural extractor for shell-family dialects (bash trees).
//!
//! Covers plain shell scripts and BladeLogic NSH jobs, which share the bash
//! grammar but carry different command vocabularies in their rule tables
//! (`yum install nginx` vs `blpackage install BLPKG-nginx`).

use streaming_iterator::StreamingIterator;
use tree_sitter::{Query, QueryCursor};

use crate::dialect::rules::DialectRules;
use crate::facts::{AttrValue, ExtractionMethod, Fact, FactKind, SourceLocation};
use crate::parser::{language_for, ParsedSource};

use super::{pick_target, unquote};

/// Query for commands and their name word.
const COMMAND_QUERY: &str = r#"
(command
  name: (command_name (word) @cmd)
) @command
"#;

/// Query for variable assignments.
const ASSIGN_QUERY: &str = r#"
(variable_assignment
  name: (variable_name) @var_name
) @assign
"#;

pub fn extract(parsed: &ParsedSource, rules: &'static DialectRules, confidence: f64) -> Vec<Fact> {
    let mut facts = Vec::new();
    extract_commands(parsed, rules, confidence, &mut facts);
    if rules.extract_variables {
        extract_assignments(parsed, rules, confidence, &mut facts);
    }
    facts
}

fn extract_commands(
    parsed: &ParsedSource,
    rules: &'static DialectRules,
    confidence: f64,
    facts: &mut Vec<Fact>,
) {
    let language = language_for(rules.dialect);
    let query = match Query::new(language, COMMAND_QUERY) {
        Ok(q) => q,
        Err(_) => return,
    };

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

    while let Some(m) = matches.next() {
        let mut cmd = None;
        let mut command_node = None;
        for capture in m.captures {
            match query.capture_names()[capture.index as usize] {
                "cmd" => cmd = Some(parsed.node_text(capture.node).to_string()),
                "command" => command_node = Some(capture.node),
                _ => {}
            }
        }
        let (Some(cmd), Some(command_node)) = (cmd, command_node) else {
            continue;
        };

        let args = command_args(parsed, command_node);
        let location = SourceLocation {
            file: parsed.path.clone(),
            line: command_node.start_position().row + 1,
        };

        if let Some(dep) = rules.dependency_calls.iter().find(|c| c.word == cmd) {
            let Some(target) = args.first() else { continue };
            facts.push(Fact::new(
                FactKind::Dependency,
                rules.dialect,
                dep.resource_type,
                target,
                location.clone(),
                confidence,
                ExtractionMethod::Structural,
            ));
            if dep.site_resource {
                facts.push(Fact::new(
                    FactKind::Resource,
                    rules.dialect,
                    dep.resource_type,
                    target,
                    location,
                    confidence,
                    ExtractionMethod::Structural,
                ));
            }
            continue;
        }

        if let Some(resource_type) = rules.resource_type_for(&cmd) {
            let (target, verb) = pick_target(args.iter().map(|s| s.as_str()));
            let Some(target) = target else { continue };
            let mut fact = Fact::new(
                FactKind::Resource,
                rules.dialect,
                resource_type,
                &target,
                location,
                confidence,
                ExtractionMethod::Structural,
            );
            if let Some(verb) = verb {
                fact = fact.with_attr("action", AttrValue::Str(verb));
            }
            facts.push(fact);
        }
    }
}

/// Argument words of a command node, quotes stripped, in source order.
fn command_args(parsed: &ParsedSource, command: tree_sitter::Node) -> Vec<String> {
    let mut args = Vec::new();
    for i in 0..command.child_count() {
        let Some(child) = command.child(i) else { continue };
        match child.kind() {
            "command_name" => continue,
            "word" | "number" | "string" | "raw_string" | "concatenation" => {
                let text = unquote(parsed.node_text(child)).to_string();
                if !text.is_empty() {
                    args.push(text);
                }
            }
            _ => {}
        }
    }
    args
}

fn extract_assignments(
    parsed: &ParsedSource,
    rules: &'static DialectRules,
    confidence: f64,
    facts: &mut Vec<Fact>,
) {
    let language = language_for(rules.dialect);
    let query = match Query::new(language, ASSIGN_QUERY) {
        Ok(q) => q,
        Err(_) => return,
    };

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

    while let Some(m) = matches.next() {
        let mut name = None;
        let mut assign_node = None;
        for capture in m.captures {
            match query.capture_names()[capture.index as usize] {
                "var_name" => name = Some(parsed.node_text(capture.node).to_string()),
                "assign" => assign_node = Some(capture.node),
                _ => {}
            }
        }
        let (Some(name), Some(assign_node)) = (name, assign_node) else {
            continue;
        };

        let mut fact = Fact::new(
            FactKind::Variable,
            rules.dialect,
            "variable",
            &name,
            SourceLocation {
                file: parsed.path.clone(),
                line: assign_node.start_position().row + 1,
            },
            confidence,
            ExtractionMethod::Structural,
        );
        if let Some(value) = assign_node.child_by_field_name("value") {
            let text = unquote(parsed.node_text(value));
            fact = fact.with_attr("value", AttrValue::from_scalar(text));
        }
        facts.push(fact);
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

    fn extract_shell(dialect: Dialect, source: &str) -> Vec<Fact> {
        let parsed = match parse("run.sh", source.as_bytes(), dialect, Duration::from_secs(5), 50)
        {
            ParseOutcome::Parsed { parsed, .. } | ParseOutcome::PartiallyParsed { parsed, .. } => {
                parsed
            }
            ParseOutcome::Failed { reason } => panic!("parse failed: {}", reason),
        };
        extract(&parsed, rules_for(dialect), STRUCTURAL_BASELINE)
    }

    #[test]
    fn test_package_install_with_action() {
        let facts = extract_shell(Dialect::Shell, "#!/bin/bash\nyum install -y nginx\n");

        let pkg = facts
            .iter()
            .find(|f| f.resource_type == "package")
            .expect("package fact");
        assert_eq!(pkg.name, "nginx");
        assert_eq!(
            pkg.attributes.get("action"),
            Some(&AttrValue::Str("install".to_string()))
        );
    }

    #[test]
    fn test_source_is_dependency() {
        let facts = extract_shell(Dialect::Shell, "source ./common.sh\n");
        assert!(facts
            .iter()
            .any(|f| f.kind == FactKind::Dependency && f.name == "./common.sh"));
    }

    #[test]
    fn test_assignment_is_variable() {
        let facts = extract_shell(Dialect::Shell, "APP_PORT=8080\n");

        let var = facts
            .iter()
            .find(|f| f.kind == FactKind::Variable)
            .expect("variable fact");
        assert_eq!(var.name, "APP_PORT");
        assert_eq!(var.attributes.get("value"), Some(&AttrValue::Num(8080.0)));
    }

    #[test]
    fn test_bladelogic_vocabulary() {
        let facts = extract_shell(
            Dialect::Bladelogic,
            "blpackage install BLPKG-web\nnexec -f harden.nsh\n",
        );

        assert!(facts
            .iter()
            .any(|f| f.resource_type == "package" && f.name == "BLPKG-web"));
        assert!(facts
            .iter()
            .any(|f| f.resource_type == "script" && f.name == "harden.nsh"));
    }
}
