//! Fact structures produced by extraction and the aggregate analysis result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// Baseline confidence for a fact matched on a clean parse tree.
pub const STRUCTURAL_BASELINE: f64 = 0.95;

/// Confidence penalty applied per remaining error node in the source tree.
pub const ERROR_NODE_PENALTY: f64 = 0.02;

/// Lower bound for structural confidence regardless of tree quality.
pub const CONFIDENCE_FLOOR: f64 = 0.5;

/// Confidence for a structurally extracted fact, scaled by tree quality.
pub fn structural_confidence(error_count: usize) -> f64 {
    (STRUCTURAL_BASELINE - ERROR_NODE_PENALTY * error_count as f64).max(CONFIDENCE_FLOOR)
}

/// Confidence for a fallback-extracted fact.
///
/// Always the structural baseline reduced by the configured factor, so a
/// fallback fact scores strictly below any structural fact in the same run.
pub fn fallback_confidence(factor: f64) -> f64 {
    STRUCTURAL_BASELINE * factor
}

/// The kind of thing a fact describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Resource,
    Dependency,
    Metadata,
    Variable,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Resource => "resource",
            FactKind::Dependency => "dependency",
            FactKind::Metadata => "metadata",
            FactKind::Variable => "variable",
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a fact was extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Structural,
    Fallback,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMethod::Structural => write!(f, "structural"),
            ExtractionMethod::Fallback => write!(f, "fallback"),
        }
    }
}

/// An attribute value: string, number, or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl AttrValue {
    /// Parse a raw scalar the way the source language would read it.
    pub fn from_scalar(raw: &str) -> Self {
        match raw {
            "true" | "True" | "yes" => AttrValue::Bool(true),
            "false" | "False" | "no" => AttrValue::Bool(false),
            _ => {
                if let Ok(n) = raw.parse::<f64>() {
                    AttrValue::Num(n)
                } else {
                    AttrValue::Str(raw.to_string())
                }
            }
        }
    }
}

/// Where a fact came from: file path plus 1-indexed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A single normalized record extracted from a source file.
///
/// Facts are immutable value objects: created once by an extractor, then only
/// discarded or merged by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub kind: FactKind,
    pub dialect: Dialect,
    pub resource_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
    pub location: SourceLocation,
    pub confidence: f64,
    pub method: ExtractionMethod,
}

impl Fact {
    pub fn new(
        kind: FactKind,
        dialect: Dialect,
        resource_type: &str,
        name: &str,
        location: SourceLocation,
        confidence: f64,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            kind,
            dialect,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            attributes: BTreeMap::new(),
            location,
            confidence,
            method,
        }
    }

    /// Attach an attribute, keeping the first value for a repeated key.
    pub fn with_attr(mut self, key: &str, value: AttrValue) -> Self {
        self.attributes.entry(key.to_string()).or_insert(value);
        self
    }
}

/// A directed relationship from one module to another it includes or wraps.
///
/// Edges are derived by the normalizer from Dependency facts; they are never
/// stored redundantly alongside the facts that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Path of the file containing the reference.
    pub source: String,
    /// The referenced module/recipe/role identifier.
    pub target: String,
    /// The reference kind (e.g. "include_recipe", "role").
    pub resource_type: String,
    /// Whether the target resolved against this run's resources/modules.
    pub resolved: bool,
    pub location: SourceLocation,
}

/// Per-file error taxonomy. Represented as data in reports, never thrown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileError {
    DetectionAmbiguous,
    ParseTimeout,
    ParseFailed,
    SizeLimitExceeded,
    BudgetExceeded,
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileError::DetectionAmbiguous => "detection_ambiguous",
            FileError::ParseTimeout => "parse_timeout",
            FileError::ParseFailed => "parse_failed",
            FileError::SizeLimitExceeded => "size_limit_exceeded",
            FileError::BudgetExceeded => "budget_exceeded",
        };
        write!(f, "{}", s)
    }
}

/// Terminal processing state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Done,
    Skipped,
    Failed,
}

/// Per-file metrics in the aggregate result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
    pub status: FileStatus,
    pub parse_error_count: usize,
    pub fact_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ExtractionMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FileError>,
    pub elapsed_ms: u64,
}

impl FileReport {
    pub fn skipped(path: &str, error: FileError) -> Self {
        Self {
            path: path.to_string(),
            dialect: None,
            status: FileStatus::Skipped,
            parse_error_count: 0,
            fact_count: 0,
            method: None,
            error: Some(error),
            elapsed_ms: 0,
        }
    }

    pub fn failed(path: &str, dialect: Option<Dialect>, error: FileError) -> Self {
        Self {
            path: path.to_string(),
            dialect,
            status: FileStatus::Failed,
            parse_error_count: 0,
            fact_count: 0,
            method: None,
            error: Some(error),
            elapsed_ms: 0,
        }
    }
}

/// Confidence distribution over the final fact set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub structural_facts: usize,
    pub fallback_facts: usize,
}

impl ConfidenceSummary {
    pub fn from_facts(facts: &[Fact]) -> Self {
        if facts.is_empty() {
            return Self::default();
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut sum = 0.0;
        let mut structural = 0;
        let mut fallback = 0;
        for fact in facts {
            min = min.min(fact.confidence);
            max = max.max(fact.confidence);
            sum += fact.confidence;
            match fact.method {
                ExtractionMethod::Structural => structural += 1,
                ExtractionMethod::Fallback => fallback += 1,
            }
        }
        Self {
            min,
            max,
            mean: sum / facts.len() as f64,
            structural_facts: structural,
            fallback_facts: fallback,
        }
    }
}

/// The aggregate analysis result: the engine's sole hand-off artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub facts: Vec<Fact>,
    pub edges: Vec<DependencyEdge>,
    /// Per-file reports, in input order regardless of completion order.
    pub files: Vec<FileReport>,
    /// Processed file counts per dialect.
    pub dialect_counts: BTreeMap<String, usize>,
    pub confidence: ConfidenceSummary,
    /// The reduction factor applied to the structural baseline for every
    /// fallback-extracted fact in this run.
    pub fallback_confidence_factor: f64,
    /// Facts dropped by allow-list validation.
    pub rejected_facts: usize,
    /// Set when the run stopped before processing every input file.
    pub truncated: bool,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl AnalysisResult {
    /// Unresolved dependency edges.
    pub fn unresolved_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(|e| !e.resolved)
    }

    /// Facts of a given kind.
    pub fn facts_of_kind(&self, kind: FactKind) -> impl Iterator<Item = &Fact> {
        self.facts.iter().filter(move |f| f.kind == kind)
    }

    /// Files whose fact set is dominated by Dependency facts: wrapper modules
    /// that mostly re-export other cookbooks/roles rather than declare their
    /// own resources. Inclusion-site Resource facts mirror a Dependency fact
    /// and don't count as the module's own resources.
    pub fn wrapper_modules(&self) -> Vec<String> {
        let is_site = |fact: &Fact| {
            crate::dialect::rules::rules_for(fact.dialect)
                .dependency_calls
                .iter()
                .any(|c| c.resource_type == fact.resource_type)
        };
        let mut per_file: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for fact in &self.facts {
            let entry = per_file.entry(fact.location.file.as_str()).or_insert((0, 0));
            match fact.kind {
                FactKind::Resource if !is_site(fact) => entry.0 += 1,
                FactKind::Resource => {}
                FactKind::Dependency => entry.1 += 1,
                _ => {}
            }
        }
        per_file
            .into_iter()
            .filter(|(_, (resources, deps))| *deps > 0 && deps > resources)
            .map(|(path, _)| path.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation {
            file: "recipes/default.rb".to_string(),
            line: 3,
        }
    }

    #[test]
    fn test_structural_confidence_scales_with_errors() {
        assert_eq!(structural_confidence(0), STRUCTURAL_BASELINE);
        assert!(structural_confidence(1) < structural_confidence(0));
        // Floors out instead of going negative.
        assert_eq!(structural_confidence(1000), CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_fallback_confidence_below_structural() {
        let fb = fallback_confidence(0.3);
        assert!(fb < 1.0);
        assert!(fb < structural_confidence(10));
        assert!((fb - STRUCTURAL_BASELINE * 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_attr_value_from_scalar() {
        assert_eq!(AttrValue::from_scalar("true"), AttrValue::Bool(true));
        assert_eq!(AttrValue::from_scalar("0644"), AttrValue::Num(644.0));
        assert_eq!(
            AttrValue::from_scalar("nginx"),
            AttrValue::Str("nginx".to_string())
        );
    }

    #[test]
    fn test_with_attr_keeps_first_value() {
        let fact = Fact::new(
            FactKind::Resource,
            Dialect::Chef,
            "package",
            "nginx",
            loc(),
            0.95,
            ExtractionMethod::Structural,
        )
        .with_attr("action", AttrValue::Str("install".to_string()))
        .with_attr("action", AttrValue::Str("remove".to_string()));

        assert_eq!(
            fact.attributes.get("action"),
            Some(&AttrValue::Str("install".to_string()))
        );
    }

    #[test]
    fn test_confidence_summary() {
        let structural = Fact::new(
            FactKind::Resource,
            Dialect::Chef,
            "package",
            "nginx",
            loc(),
            0.95,
            ExtractionMethod::Structural,
        );
        let fallback = Fact::new(
            FactKind::Resource,
            Dialect::Chef,
            "service",
            "nginx",
            loc(),
            0.285,
            ExtractionMethod::Fallback,
        );

        let summary = ConfidenceSummary::from_facts(&[structural, fallback]);
        assert_eq!(summary.structural_facts, 1);
        assert_eq!(summary.fallback_facts, 1);
        assert!((summary.min - 0.285).abs() < 1e-9);
        assert!((summary.max - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_wrapper_modules() {
        let mut result = AnalysisResult::default();
        let dep = |file: &str| {
            let mut f = Fact::new(
                FactKind::Dependency,
                Dialect::Chef,
                "include_recipe",
                "base::default",
                loc(),
                0.95,
                ExtractionMethod::Structural,
            );
            f.location.file = file.to_string();
            f
        };
        let res = |file: &str| {
            let mut f = Fact::new(
                FactKind::Resource,
                Dialect::Chef,
                "package",
                "nginx",
                loc(),
                0.95,
                ExtractionMethod::Structural,
            );
            f.location.file = file.to_string();
            f
        };

        // wrapper.rb: two includes, no resources. real.rb: the opposite.
        result.facts = vec![dep("wrapper.rb"), dep("wrapper.rb"), res("real.rb")];
        assert_eq!(result.wrapper_modules(), vec!["wrapper.rb".to_string()]);
    }
}
