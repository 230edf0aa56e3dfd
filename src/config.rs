//! Engine configuration.
//!
//! One immutable struct threaded into the session at construction time — no
//! ambient global state. Loadable from YAML; every knob has a default so a
//! config file only names what it overrides. Validation failures are the one
//! fatal error the engine surfaces.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal configuration errors. Everything else the engine reports as data.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tuning knobs for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of files processed per run; the rest are skipped and
    /// the result is flagged truncated.
    pub max_files: usize,
    /// Per-file content cap in bytes. A file at exactly the cap is processed;
    /// one byte over is failed without extraction.
    pub max_content_length_bytes: usize,
    /// Per-file structural parse timeout.
    pub parse_timeout_per_file_ms: u64,
    /// Total wall-clock budget for the run.
    pub total_timeout_ms: u64,
    /// Error-node cap before a partial tree is downgraded to failed.
    pub max_syntax_errors_per_file: usize,
    /// Error-node density (errors / total nodes) above which a partial tree
    /// is not trusted for structural extraction.
    pub max_error_density: f64,
    /// Whether pattern fallback runs when structural parsing fails.
    pub fallback_enabled: bool,
    /// Multiplier applied to the structural baseline for fallback facts.
    /// Must be in (0, 1).
    pub fallback_confidence_factor: f64,
    /// Worker thread cap; 0 uses the rayon default.
    pub max_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_files: 500,
            max_content_length_bytes: 1_048_576,
            parse_timeout_per_file_ms: 5_000,
            total_timeout_ms: 120_000,
            max_syntax_errors_per_file: 50,
            max_error_density: 0.4,
            fallback_enabled: true,
            fallback_confidence_factor: 0.3,
            max_workers: 0,
        }
    }
}

impl EngineConfig {
    /// Load a config from a YAML file and validate it.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range knobs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_files == 0 {
            return Err(ConfigError::Invalid("max_files must be positive".into()));
        }
        if self.max_content_length_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_content_length_bytes must be positive".into(),
            ));
        }
        if self.parse_timeout_per_file_ms == 0 || self.total_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if !(self.fallback_confidence_factor > 0.0 && self.fallback_confidence_factor < 1.0) {
            return Err(ConfigError::Invalid(
                "fallback_confidence_factor must be in (0, 1)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_error_density) {
            return Err(ConfigError::Invalid(
                "max_error_density must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_per_file_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_factor_bounds() {
        let mut config = EngineConfig::default();
        config.fallback_confidence_factor = 1.0;
        assert!(config.validate().is_err());
        config.fallback_confidence_factor = 0.0;
        assert!(config.validate().is_err());
        config.fallback_confidence_factor = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_budgets_rejected() {
        let mut config = EngineConfig::default();
        config.max_files = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.total_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_file_with_partial_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iacfacts.yaml");
        std::fs::write(&path, "max_files: 10\nfallback_confidence_factor: 0.25\n").unwrap();

        let config = EngineConfig::parse_file(&path).unwrap();
        assert_eq!(config.max_files, 10);
        assert!((config.fallback_confidence_factor - 0.25).abs() < 1e-9);
        // Untouched knobs keep their defaults.
        assert_eq!(config.max_syntax_errors_per_file, 50);
    }

    #[test]
    fn test_unknown_field_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iacfacts.yaml");
        std::fs::write(&path, "max_filez: 10\n").unwrap();
        assert!(EngineConfig::parse_file(&path).is_err());
    }
}
