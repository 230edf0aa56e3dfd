//! Command-line interface for iacfacts.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::EngineConfig;
use crate::dialect::{rules, Dialect};
use crate::report;
use crate::session::{AnalysisSession, SourceFile};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Default config file names to search for.
const DEFAULT_CONFIG_NAMES: &[&str] = &["iacfacts.yaml", ".iacfacts.yaml"];

/// Structural analysis and fact extraction for infrastructure-as-code.
///
/// iacfacts parses Chef cookbooks, Ansible playbooks, Salt states, shell
/// scripts, and BladeLogic NSH jobs into a normalized, confidence-scored
/// fact set: resources, dependencies, metadata, and variables.
#[derive(Parser)]
#[command(name = "iacfacts")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a file or directory bundle
    #[command(visible_alias = "scan")]
    Analyze(AnalyzeArgs),
    /// List registered dialects and their extraction vocabularies
    Dialects,
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Path to analyze (file or directory)
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover, then defaults)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Force a dialect for every file, overriding detection
    #[arg(short, long)]
    pub dialect: Option<String>,

    /// Override the configured file cap
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Disable pattern fallback (broken files fail instead)
    #[arg(long)]
    pub no_fallback: bool,
}

/// Discover a config file in the current directory.
fn discover_config() -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Glob set over every dialect's path globs, for files whose extension alone
/// does not identify them.
fn dialect_globs() -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for rules in rules::all_rules() {
        for pattern in rules.path_globs {
            builder.add(Glob::new(pattern)?);
        }
    }
    Ok(builder.build()?)
}

/// Collect candidate files under a root: anything with a registered
/// extension or matching a dialect path glob.
fn collect_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let globs = dialect_globs()?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            // Skip hidden and vendored directories.
            if e.file_type().is_dir()
                && (name.starts_with('.') || name == "vendor" || name == "node_modules")
            {
                return false;
            }
            true
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let known_ext = rules::all_rules().any(|r| r.extensions.contains(&ext));
        if known_ext || globs.is_match(path) {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    let hint = match &args.dialect {
        None => None,
        Some(name) => match Dialect::from_str(name) {
            Ok(d) => Some(d),
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_ERROR);
            }
        },
    };

    let mut config = match args.config.clone().or_else(discover_config) {
        Some(path) => match EngineConfig::parse_file(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(EXIT_ERROR);
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(max_files) = args.max_files {
        config.max_files = max_files;
    }
    if args.no_fallback {
        config.fallback_enabled = false;
    }

    let root = match args.path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };

    let paths = if root.is_dir() {
        collect_files(&root)?
    } else {
        vec![root.clone()]
    };
    if paths.is_empty() {
        eprintln!("Warning: no recognized files under {}", args.path.display());
        return Ok(EXIT_SUCCESS);
    }

    let mut bundle = Vec::with_capacity(paths.len());
    for path in &paths {
        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) => {
                // A vanished or unreadable file should not sink the bundle.
                eprintln!("Warning: cannot read {}: {}", path.display(), e);
                continue;
            }
        };
        let rel = path
            .strip_prefix(&root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        let rel = if rel.is_empty() {
            path.to_string_lossy().to_string()
        } else {
            rel
        };
        let mut file = SourceFile::new(rel, content);
        file.dialect_hint = hint;
        bundle.push(file);
    }

    let session = match AnalysisSession::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    let result = session.run(bundle);

    let bundle_label = args.path.to_string_lossy();
    match args.format.as_str() {
        "json" => report::write_json(&bundle_label, &result)?,
        _ => report::write_pretty(&bundle_label, &result),
    }

    if result.failed > 0 {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the dialects command.
pub fn run_dialects() -> anyhow::Result<i32> {
    println!("Registered dialects:");
    println!();
    for rules in rules::all_rules() {
        let extensions: Vec<String> = rules
            .extensions
            .iter()
            .map(|e| format!(".{}", e))
            .collect();
        let resources: Vec<&str> = rules.resource_calls.iter().map(|c| c.word).collect();
        let deps: Vec<&str> = rules.dependency_calls.iter().map(|c| c.word).collect();
        println!("  {:<12} {}", rules.dialect.to_string(), extensions.join(", "));
        println!("    resources:    {}", resources.join(", "));
        println!("    dependencies: {}", deps.join(", "));
    }
    println!();
    println!(
        "Detection order: explicit hint, extension, shebang, content shape."
    );
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_files_by_extension_and_glob() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("recipes")).unwrap();
        fs::create_dir_all(temp.path().join("node_modules")).unwrap();

        fs::write(temp.path().join("recipes/default.rb"), "package \"a\"\n").unwrap();
        fs::write(temp.path().join("site.yml"), "---\n").unwrap();
        fs::write(temp.path().join("top.sls"), "base:\n").unwrap();
        fs::write(temp.path().join("notes.txt"), "ignore me\n").unwrap();
        fs::write(temp.path().join("node_modules/x.rb"), "skip\n").unwrap();

        let files = collect_files(temp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert!(names.contains(&"default.rb".to_string()));
        assert!(names.contains(&"site.yml".to_string()));
        assert!(names.contains(&"top.sls".to_string()));
        assert!(!names.contains(&"notes.txt".to_string()));
        assert!(!names.contains(&"x.rb".to_string()));
    }
}
