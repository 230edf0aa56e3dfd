//! Fact normalization: name canonicalization, deduplication, dependency
//! cross-referencing, and allow-list validation.
//!
//! Runs single-threaded over the complete fact set after all file pipelines
//! finish. The merge is commutative and associative, so the order facts
//! arrive in from parallel workers does not affect the output.

use std::collections::{BTreeMap, BTreeSet};

use crate::dialect::rules::rules_for;
use crate::dialect::Dialect;
use crate::facts::{DependencyEdge, Fact, FactKind};

/// Output of the normalization pipeline.
#[derive(Debug, Default)]
pub struct NormalizeOutput {
    pub facts: Vec<Fact>,
    pub edges: Vec<DependencyEdge>,
    /// Facts dropped by allow-list validation.
    pub rejected: usize,
}

/// Deduplication key. `kind` participates so an inclusion-site Resource fact
/// never collides with its sibling Dependency fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FactKey {
    kind: FactKind,
    dialect: Dialect,
    resource_type: String,
    name: String,
}

impl FactKey {
    fn of(fact: &Fact) -> Self {
        Self {
            kind: fact.kind,
            dialect: fact.dialect,
            resource_type: fact.resource_type.clone(),
            name: normalized_name(fact.dialect, &fact.name),
        }
    }
}

/// Canonicalize a name per dialect convention: case-fold and canonicalize
/// separators. Path-like names keep their slashes and case-sensitive parts
/// are lowered anyway — matching is what matters here, not display.
pub fn normalized_name(dialect: Dialect, name: &str) -> String {
    let trimmed = name.trim();
    match dialect {
        // Cookbook and role identifiers treat `-` and `_` interchangeably.
        Dialect::Chef | Dialect::Ansible | Dialect::Salt => {
            trimmed.to_lowercase().replace('-', "_")
        }
        // Shell targets are often paths or unit names; only fold case.
        Dialect::Shell | Dialect::Bladelogic => trimmed.to_lowercase(),
    }
}

/// Run the full normalization pipeline.
///
/// `module_ids` are the analyzed module identifiers (file stems, cookbook
/// names from metadata) used to resolve dependency targets that do not match
/// any extracted resource.
pub fn normalize(all_facts: Vec<Fact>, module_ids: &BTreeSet<String>) -> NormalizeOutput {
    // (1) + (2): normalize names and deduplicate. Highest confidence wins;
    // attribute sets are unioned with the winner's values kept on conflict.
    let mut merged: BTreeMap<FactKey, Fact> = BTreeMap::new();
    for mut fact in all_facts {
        let key = FactKey::of(&fact);
        fact.name = key.name.clone();
        match merged.get_mut(&key) {
            None => {
                merged.insert(key, fact);
            }
            Some(existing) => merge_into(existing, fact),
        }
    }

    // (3): cross-reference dependency targets against the resource set and
    // the analyzed module identifiers. Inclusion-site Resource facts carry a
    // dependency resource type; they are the reference itself, so they must
    // not resolve it.
    let is_site_resource = |f: &Fact| {
        rules_for(f.dialect)
            .dependency_calls
            .iter()
            .any(|c| c.resource_type == f.resource_type)
    };
    let resource_names: BTreeSet<(Dialect, String)> = merged
        .values()
        .filter(|f| f.kind == FactKind::Resource && !is_site_resource(f))
        .map(|f| (f.dialect, f.name.clone()))
        .collect();

    let resolves = |fact: &Fact| -> bool {
        let target = fact.name.as_str();
        if resource_names.contains(&(fact.dialect, target.to_string())) {
            return true;
        }
        if module_ids.contains(target) {
            return true;
        }
        // `cookbook::recipe` resolves through the cookbook identifier.
        if let Some(cookbook) = target.split("::").next() {
            if cookbook != target && module_ids.contains(cookbook) {
                return true;
            }
        }
        false
    };

    // (4): validation. Facts with a resource type outside the dialect
    // allow-list are dropped and counted, never silently discarded.
    let mut rejected = 0usize;
    let mut facts = Vec::with_capacity(merged.len());
    let mut edges = Vec::new();
    for fact in merged.into_values() {
        if !rules_for(fact.dialect).allows(&fact.resource_type) {
            rejected += 1;
            continue;
        }
        if fact.kind == FactKind::Dependency {
            edges.push(DependencyEdge {
                source: fact.location.file.clone(),
                target: fact.name.clone(),
                resource_type: fact.resource_type.clone(),
                resolved: resolves(&fact),
                location: fact.location.clone(),
            });
        }
        facts.push(fact);
    }

    // Deterministic output order regardless of worker completion order.
    facts.sort_by(|a, b| {
        (&a.location.file, a.location.line, a.kind, &a.resource_type, &a.name).cmp(&(
            &b.location.file,
            b.location.line,
            b.kind,
            &b.resource_type,
            &b.name,
        ))
    });
    edges.sort_by(|a, b| {
        (&a.source, &a.target, &a.resource_type).cmp(&(&b.source, &b.target, &b.resource_type))
    });

    NormalizeOutput {
        facts,
        edges,
        rejected,
    }
}

/// Merge `candidate` into `winner`, keeping the higher-confidence fact's
/// identity and values while unioning non-conflicting attributes.
fn merge_into(winner: &mut Fact, candidate: Fact) {
    if candidate.confidence > winner.confidence {
        let loser = std::mem::replace(winner, candidate);
        for (key, value) in loser.attributes {
            winner.attributes.entry(key).or_insert(value);
        }
    } else {
        for (key, value) in candidate.attributes {
            winner.attributes.entry(key).or_insert(value);
        }
    }
}
