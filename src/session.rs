//! Analysis session orchestration.
//!
//! Drives the per-file pipeline — detect, parse, extract, fallback — under
//! the run budgets, then hands the complete fact set to the normalizer. The
//! session is the only component with cross-file state; per-file state is
//! owned by its worker until the pipeline finishes.
//!
//! Per-file failures are recovered locally and reported as data. The run
//! itself always produces an `AnalysisResult`; only an invalid configuration
//! is fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use crate::config::{ConfigError, EngineConfig};
use crate::dialect::{self, rules::rules_for, Dialect};
use crate::extract;
use crate::facts::{
    fallback_confidence, AnalysisResult, AttrValue, ConfidenceSummary, ExtractionMethod, Fact,
    FactKind, FileError, FileReport, FileStatus,
};
use crate::normalize;

/// One file of an input bundle. Never mutated after ingestion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Relative path, the file's stable identifier.
    pub path: String,
    pub content: Vec<u8>,
    /// Explicit dialect hint, overriding auto-detection.
    pub dialect_hint: Option<Dialect>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            dialect_hint: None,
        }
    }

    pub fn with_hint(mut self, dialect: Dialect) -> Self {
        self.dialect_hint = Some(dialect);
        self
    }
}

/// How a single file's pipeline ended before fallback was considered.
enum Pass {
    Structural { facts: Vec<Fact>, error_count: usize },
    NeedsFallback { error_count: usize, error: FileError },
}

/// The orchestrator for one or more analysis runs.
pub struct AnalysisSession {
    config: EngineConfig,
}

impl AnalysisSession {
    /// Build a session. Fails only on invalid configuration.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        crate::parser::init();
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyze a bundle. Never fails: all per-file problems are reported as
    /// data, and budget exhaustion yields a partial result flagged truncated.
    pub fn run(&self, files: Vec<SourceFile>) -> AnalysisResult {
        let started = Instant::now();
        let deadline = started + self.config.total_timeout();
        let cancelled = AtomicBool::new(false);

        let eligible = files.len().min(self.config.max_files);
        let (active, overflow) = files.split_at(eligible);

        let process = |file: &SourceFile| -> (FileReport, Vec<Fact>) {
            // Budget check between file launches; in-flight files complete.
            if cancelled.load(Ordering::Relaxed) || Instant::now() >= deadline {
                cancelled.store(true, Ordering::Relaxed);
                return (
                    FileReport::skipped(&file.path, FileError::BudgetExceeded),
                    Vec::new(),
                );
            }
            let out = process_file(&self.config, file);
            if Instant::now() >= deadline {
                cancelled.store(true, Ordering::Relaxed);
            }
            out
        };

        let run_all = || -> Vec<(FileReport, Vec<Fact>)> {
            // Indexed parallel map: results come back in input order.
            active.par_iter().map(&process).collect()
        };

        let mut entries = match self.config.max_workers {
            0 => run_all(),
            n => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => pool.install(run_all),
                Err(_) => run_all(),
            },
        };

        for file in overflow {
            entries.push((
                FileReport::skipped(&file.path, FileError::BudgetExceeded),
                Vec::new(),
            ));
        }

        let mut all_facts = Vec::new();
        let mut reports = Vec::with_capacity(entries.len());
        for (report, facts) in entries {
            all_facts.extend(facts);
            reports.push(report);
        }

        let module_ids = module_identifiers(files.iter().map(|f| f.path.as_str()), &all_facts);
        let normalized = normalize::normalize(all_facts, &module_ids);

        let mut dialect_counts: BTreeMap<String, usize> = BTreeMap::new();
        for report in &reports {
            if let Some(dialect) = report.dialect {
                *dialect_counts.entry(dialect.as_str().to_string()).or_insert(0) += 1;
            }
        }

        let truncated = reports
            .iter()
            .any(|r| r.error == Some(FileError::BudgetExceeded));
        let skipped = reports
            .iter()
            .filter(|r| r.status == FileStatus::Skipped)
            .count();
        let failed = reports
            .iter()
            .filter(|r| r.status == FileStatus::Failed)
            .count();

        AnalysisResult {
            confidence: ConfidenceSummary::from_facts(&normalized.facts),
            facts: normalized.facts,
            edges: normalized.edges,
            files: reports,
            dialect_counts,
            fallback_confidence_factor: self.config.fallback_confidence_factor,
            rejected_facts: normalized.rejected,
            truncated,
            skipped,
            failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// The per-file pipeline: Queued -> Detecting -> Parsing -> Extracting ->
/// (Fallback?) -> Done, with terminal Skipped/Failed along the way.
fn process_file(config: &EngineConfig, file: &SourceFile) -> (FileReport, Vec<Fact>) {
    let started = Instant::now();
    let elapsed = |r: &mut FileReport| r.elapsed_ms = started.elapsed().as_millis() as u64;

    // Size cap first: exactly at the limit passes, one byte over fails.
    if file.content.len() > config.max_content_length_bytes {
        let mut report = FileReport::failed(&file.path, None, FileError::SizeLimitExceeded);
        elapsed(&mut report);
        return (report, Vec::new());
    }

    let Some(dialect) = dialect::detect(&file.path, &file.content, file.dialect_hint) else {
        let mut report = FileReport::skipped(&file.path, FileError::DetectionAmbiguous);
        elapsed(&mut report);
        return (report, Vec::new());
    };
    let rules = rules_for(dialect);

    let pass = structural_pass(config, file, dialect);

    let (facts, method, error_count, error) = match pass {
        Pass::Structural { facts, error_count } => {
            (facts, Some(ExtractionMethod::Structural), error_count, None)
        }
        Pass::NeedsFallback { error_count, error } => {
            if config.fallback_enabled {
                let text = String::from_utf8_lossy(&file.content);
                let facts = extract::fallback::extract(
                    &file.path,
                    &text,
                    rules,
                    fallback_confidence(config.fallback_confidence_factor),
                );
                (facts, Some(ExtractionMethod::Fallback), error_count, None)
            } else {
                let mut report = FileReport::failed(&file.path, Some(dialect), error);
                report.parse_error_count = error_count;
                elapsed(&mut report);
                return (report, Vec::new());
            }
        }
    };

    let mut report = FileReport {
        path: file.path.clone(),
        dialect: Some(dialect),
        status: FileStatus::Done,
        parse_error_count: error_count,
        fact_count: facts.len(),
        method,
        error,
        elapsed_ms: 0,
    };
    elapsed(&mut report);
    (report, facts)
}

/// Structural parse + extract. The fallback decision is a pure function of
/// (error count, error density, configured caps).
#[cfg(feature = "tree-sitter")]
fn structural_pass(config: &EngineConfig, file: &SourceFile, dialect: Dialect) -> Pass {
    use crate::facts::structural_confidence;
    use crate::parser::{parse, ParseFailReason, ParseOutcome};

    let rules = rules_for(dialect);
    let outcome = parse(
        &file.path,
        &file.content,
        dialect,
        config.parse_timeout(),
        config.max_syntax_errors_per_file,
    );

    match outcome {
        ParseOutcome::Parsed { parsed, error_count } => Pass::Structural {
            facts: extract::structural(&parsed, rules, structural_confidence(error_count)),
            error_count,
        },
        ParseOutcome::PartiallyParsed { parsed, error_count } => {
            let density = error_count as f64 / parsed.node_count.max(1) as f64;
            if density <= config.max_error_density {
                Pass::Structural {
                    facts: extract::structural(&parsed, rules, structural_confidence(error_count)),
                    error_count,
                }
            } else {
                Pass::NeedsFallback {
                    error_count,
                    error: FileError::ParseFailed,
                }
            }
        }
        ParseOutcome::Failed { reason } => Pass::NeedsFallback {
            error_count: 0,
            error: match reason {
                ParseFailReason::Timeout => FileError::ParseTimeout,
                _ => FileError::ParseFailed,
            },
        },
    }
}

/// Pattern-only build: every file goes straight to fallback, matching the
/// original pattern-only mode when grammars are unavailable.
#[cfg(not(feature = "tree-sitter"))]
fn structural_pass(_config: &EngineConfig, _file: &SourceFile, _dialect: Dialect) -> Pass {
    Pass::NeedsFallback {
        error_count: 0,
        error: FileError::ParseFailed,
    }
}

/// Identifiers a dependency target may resolve against: path stems, path
/// components, and module names declared in metadata.
fn module_identifiers<'a>(
    paths: impl Iterator<Item = &'a str>,
    facts: &[Fact],
) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();

    for path in paths {
        let p = Path::new(path);
        if let Some(stem) = p.file_stem().and_then(|s| s.to_str()) {
            ids.insert(stem.to_lowercase());
        }
        for component in p.components() {
            if let Some(name) = component.as_os_str().to_str() {
                if !name.contains('.') {
                    ids.insert(name.to_lowercase());
                }
            }
        }
    }

    for fact in facts {
        if fact.kind == FactKind::Metadata && fact.name == "name" {
            if let Some(AttrValue::Str(value)) = fact.attributes.get("value") {
                ids.insert(normalize::normalized_name(fact.dialect, value));
            }
        }
    }

    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AnalysisSession {
        AnalysisSession::new(EngineConfig::default()).expect("default config is valid")
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = EngineConfig::default();
        config.fallback_confidence_factor = 2.0;
        assert!(AnalysisSession::new(config).is_err());
    }

    #[test]
    fn test_empty_bundle() {
        let result = session().run(Vec::new());
        assert!(result.facts.is_empty());
        assert!(result.files.is_empty());
        assert!(!result.truncated);
    }

    #[test]
    fn test_unknown_dialect_is_skipped_with_zero_facts() {
        let result = session().run(vec![SourceFile::new("README.md", "# docs\n")]);
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].status, FileStatus::Skipped);
        assert_eq!(result.files[0].error, Some(FileError::DetectionAmbiguous));
        assert!(result.facts.is_empty());
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_size_limit_boundary() {
        let mut config = EngineConfig::default();
        config.max_content_length_bytes = 24;
        let session = AnalysisSession::new(config).unwrap();

        let exactly = "package \"nginx\"\n# pad10\n"; // 24 bytes
        assert_eq!(exactly.len(), 24);
        let result = session.run(vec![SourceFile::new("a.rb", exactly)]);
        assert_eq!(result.files[0].status, FileStatus::Done);

        let over = format!("{}!", exactly);
        let result = session.run(vec![SourceFile::new("a.rb", over)]);
        assert_eq!(result.files[0].status, FileStatus::Failed);
        assert_eq!(result.files[0].error, Some(FileError::SizeLimitExceeded));
        assert_eq!(result.files[0].fact_count, 0);
        assert!(result.facts.is_empty());
    }

    #[test]
    fn test_max_files_truncates() {
        let mut config = EngineConfig::default();
        config.max_files = 2;
        let session = AnalysisSession::new(config).unwrap();

        let files: Vec<SourceFile> = (0..5)
            .map(|i| SourceFile::new(format!("r{}.rb", i), "package \"nginx\"\n"))
            .collect();
        let result = session.run(files);

        assert!(result.truncated);
        assert_eq!(result.files.len(), 5);
        let skipped: Vec<_> = result
            .files
            .iter()
            .filter(|r| r.error == Some(FileError::BudgetExceeded))
            .collect();
        assert_eq!(skipped.len(), 3);
        // Input ordering preserved: the overflow files are the last three.
        assert_eq!(result.files[2].path, "r2.rb");
        assert_eq!(result.files[2].status, FileStatus::Skipped);
    }

    #[test]
    fn test_reports_preserve_input_order() {
        let result = session().run(vec![
            SourceFile::new("z.rb", "package \"a\"\n"),
            SourceFile::new("a.sh", "yum install -y vim\n"),
            SourceFile::new("m.sls", "vim:\n  pkg.installed: []\n"),
        ]);
        let paths: Vec<_> = result.files.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["z.rb", "a.sh", "m.sls"]);
    }

    #[test]
    fn test_fallback_disabled_fails_broken_files() {
        let mut config = EngineConfig::default();
        config.fallback_enabled = false;
        config.max_syntax_errors_per_file = 0;
        let session = AnalysisSession::new(config).unwrap();

        let result = session.run(vec![SourceFile::new(
            "broken.rb",
            "package \"nginx\" do\n  action :install\n",
        )]);
        assert_eq!(result.files[0].status, FileStatus::Failed);
        assert!(result.facts.is_empty());
        assert_eq!(result.failed, 1);
    }

    #[test]
    fn test_dialect_hint_overrides_detection() {
        // A .yml path forced through the Salt rules.
        let result = session().run(vec![SourceFile::new(
            "state.yml",
            "nginx:\n  pkg.installed: []\n",
        )
        .with_hint(Dialect::Salt)]);
        assert_eq!(result.files[0].dialect, Some(Dialect::Salt));
        assert!(result
            .facts
            .iter()
            .any(|f| f.dialect == Dialect::Salt && f.resource_type == "package"));
    }

    #[test]
    fn test_module_identifiers() {
        let ids = module_identifiers(
            ["cookbooks/apache/recipes/default.rb", "webserver.sls"].into_iter(),
            &[],
        );
        assert!(ids.contains("default"));
        assert!(ids.contains("apache"));
        assert!(ids.contains("webserver"));
    }
}
