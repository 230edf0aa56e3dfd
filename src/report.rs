//! Output formatting for analysis results.
//!
//! Two formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::Serialize;

use crate::facts::{AnalysisResult, ExtractionMethod, FactKind, FileStatus};

/// JSON report wrapper around the analysis result.
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: String,
    /// The analyzed bundle path or label.
    pub bundle: String,
    #[serde(flatten)]
    pub result: &'a AnalysisResult,
}

/// Write the result as pretty-printed JSON to stdout.
pub fn write_json(bundle: &str, result: &AnalysisResult) -> anyhow::Result<()> {
    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        bundle: bundle.to_string(),
        result,
    };
    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    Ok(())
}

/// Write a colored human-readable summary to stdout.
pub fn write_pretty(bundle: &str, result: &AnalysisResult) {
    println!();
    println!("{} {}", "Analyzed".bold(), bundle);
    println!();

    // Per-file lines, input order.
    for file in &result.files {
        let status = match file.status {
            FileStatus::Done => "done".green(),
            FileStatus::Skipped => "skipped".yellow(),
            FileStatus::Failed => "failed".red(),
        };
        let dialect = file
            .dialect
            .map(|d| d.as_str())
            .unwrap_or("-");
        let method = match file.method {
            Some(ExtractionMethod::Structural) => "structural",
            Some(ExtractionMethod::Fallback) => "fallback",
            None => "-",
        };
        let mut line = format!(
            "  {:<40} {:<10} {:>7}  {} facts via {}",
            file.path, dialect, status, file.fact_count, method
        );
        if let Some(error) = file.error {
            line.push_str(&format!("  [{}]", error));
        }
        if file.parse_error_count > 0 {
            line.push_str(&format!("  ({} syntax errors)", file.parse_error_count));
        }
        println!("{}", line);
    }

    println!();
    let kind_count = |kind: FactKind| result.facts_of_kind(kind).count();
    println!(
        "  {}: {} resources, {} dependencies, {} metadata, {} variables",
        "Facts".bold(),
        kind_count(FactKind::Resource),
        kind_count(FactKind::Dependency),
        kind_count(FactKind::Metadata),
        kind_count(FactKind::Variable),
    );

    let unresolved = result.unresolved_edges().count();
    println!(
        "  {}: {} edges ({} unresolved)",
        "Dependencies".bold(),
        result.edges.len(),
        unresolved
    );

    if !result.dialect_counts.is_empty() {
        let counts: Vec<String> = result
            .dialect_counts
            .iter()
            .map(|(d, n)| format!("{} {}", n, d))
            .collect();
        println!("  {}: {}", "Dialects".bold(), counts.join(", "));
    }

    println!(
        "  {}: mean {:.2}, min {:.2}, max {:.2} ({} structural, {} fallback)",
        "Confidence".bold(),
        result.confidence.mean,
        result.confidence.min,
        result.confidence.max,
        result.confidence.structural_facts,
        result.confidence.fallback_facts,
    );

    if result.rejected_facts > 0 {
        println!(
            "  {}: {} facts outside dialect allow-lists",
            "Rejected".yellow().bold(),
            result.rejected_facts
        );
    }

    let wrappers = result.wrapper_modules();
    if !wrappers.is_empty() {
        println!("  {}: {}", "Wrapper modules".bold(), wrappers.join(", "));
    }

    if result.truncated {
        println!(
            "  {}",
            "Run truncated: budget exhausted before all files were processed"
                .yellow()
                .bold()
        );
    }

    println!(
        "  {} files done, {} skipped, {} failed in {} ms",
        result.files.len() - result.skipped - result.failed,
        result.skipped,
        result.failed,
        result.elapsed_ms
    );
    println!();
}
