//! Supported dialects and dialect detection.
//!
//! A `Dialect` identifies one infrastructure-as-code grammar. Detection runs
//! once per file, before parsing: explicit hint, then extension, then shebang,
//! then content-shape heuristics for extensionless or misnamed files.

pub mod rules;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One supported infrastructure-as-code source grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Cookbook-resource language (Ruby DSL).
    Chef,
    /// Declarative-playbook language (YAML).
    Ansible,
    /// Declarative-infrastructure language (YAML state files).
    Salt,
    /// POSIX/bash shell scripts.
    Shell,
    /// BladeLogic NSH job scripts.
    Bladelogic,
}

/// All registered dialects, in detection-table order.
pub const ALL_DIALECTS: &[Dialect] = &[
    Dialect::Chef,
    Dialect::Ansible,
    Dialect::Salt,
    Dialect::Shell,
    Dialect::Bladelogic,
];

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Chef => "chef",
            Dialect::Ansible => "ansible",
            Dialect::Salt => "salt",
            Dialect::Shell => "shell",
            Dialect::Bladelogic => "bladelogic",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chef" => Ok(Dialect::Chef),
            "ansible" => Ok(Dialect::Ansible),
            "salt" | "saltstack" => Ok(Dialect::Salt),
            "shell" | "bash" | "sh" => Ok(Dialect::Shell),
            "bladelogic" | "nsh" => Ok(Dialect::Bladelogic),
            _ => Err(format!("unknown dialect: {}", s)),
        }
    }
}

/// How many leading bytes the detector inspects for shebang/shape checks.
const DETECT_WINDOW: usize = 4096;

/// Map a file extension (without dot) to a dialect.
fn for_extension(ext: &str) -> Option<Dialect> {
    for rules in rules::all_rules() {
        if rules.extensions.contains(&ext) {
            return Some(rules.dialect);
        }
    }
    None
}

/// Match a shebang line (`#!/bin/bash`, `#!/usr/bin/env ruby`, ...).
fn for_shebang(line: &str) -> Option<Dialect> {
    if !line.starts_with("#!") {
        return None;
    }
    if line.contains("nsh") {
        Some(Dialect::Bladelogic)
    } else if line.contains("bash") || line.contains("/sh") || line.contains("zsh") || line.contains("ksh") {
        Some(Dialect::Shell)
    } else if line.contains("ruby") {
        Some(Dialect::Chef)
    } else {
        None
    }
}

static CHEF_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*(?:package|service|template|directory|include_recipe)\s+['"]"#).unwrap()
});
static SALT_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s+(?:pkg|service|file|user|group|cmd)\.[a-z_]+\s*:").unwrap()
});
static ANSIBLE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:hosts|tasks|roles)\s*:").unwrap());

/// Content-shape heuristics, consulted only when extension and shebang say
/// nothing. Ordering matters: Salt state files also look like generic YAML,
/// so the Salt check runs before the playbook check.
fn for_shape(head: &str) -> Option<Dialect> {
    let first_line = head.lines().find(|l| !l.trim().is_empty())?;
    if head.contains("blcli ") || head.contains("nexec ") || head.contains("blpackage ") {
        return Some(Dialect::Bladelogic);
    }
    if CHEF_SHAPE.is_match(head) {
        return Some(Dialect::Chef);
    }
    if SALT_SHAPE.is_match(head) {
        return Some(Dialect::Salt);
    }
    if first_line.trim_start().starts_with("---") || ANSIBLE_SHAPE.is_match(head) {
        return Some(Dialect::Ansible);
    }
    None
}

/// Detect the dialect of a file from its path and leading content.
///
/// An explicit hint always wins. Returns `None` for unrecognized files, which
/// the orchestrator records as skipped.
pub fn detect(path: &str, content: &[u8], hint: Option<Dialect>) -> Option<Dialect> {
    if let Some(d) = hint {
        return Some(d);
    }

    let ext = path.rsplit('.').next().filter(|e| *e != path);
    if let Some(d) = ext.and_then(for_extension) {
        return Some(d);
    }

    let window = &content[..content.len().min(DETECT_WINDOW)];
    let head = String::from_utf8_lossy(window);
    if let Some(first) = head.lines().next() {
        if let Some(d) = for_shebang(first) {
            return Some(d);
        }
    }
    for_shape(&head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_overrides_extension() {
        let d = detect("site.yml", b"---\n", Some(Dialect::Salt));
        assert_eq!(d, Some(Dialect::Salt));
    }

    #[test]
    fn test_extension_table() {
        assert_eq!(detect("recipes/default.rb", b"", None), Some(Dialect::Chef));
        assert_eq!(detect("site.yml", b"", None), Some(Dialect::Ansible));
        assert_eq!(detect("top.sls", b"", None), Some(Dialect::Salt));
        assert_eq!(detect("run.sh", b"", None), Some(Dialect::Shell));
        assert_eq!(detect("deploy.nsh", b"", None), Some(Dialect::Bladelogic));
    }

    #[test]
    fn test_shebang_for_extensionless() {
        assert_eq!(
            detect("provision", b"#!/bin/bash\necho hi\n", None),
            Some(Dialect::Shell)
        );
        assert_eq!(
            detect("job", b"#!/usr/bin/nsh\nblcli service nginx\n", None),
            Some(Dialect::Bladelogic)
        );
    }

    #[test]
    fn test_shape_heuristics() {
        assert_eq!(
            detect("playbook", b"---\n- hosts: web\n", None),
            Some(Dialect::Ansible)
        );
        assert_eq!(
            detect("recipe", b"package \"nginx\" do\n  action :install\nend\n", None),
            Some(Dialect::Chef)
        );
        assert_eq!(
            detect("state", b"nginx:\n  pkg.installed: []\n", None),
            Some(Dialect::Salt)
        );
    }

    #[test]
    fn test_unknown_is_none() {
        assert_eq!(detect("README.md", b"# hello\n", None), None);
        assert_eq!(detect("data.bin", &[0u8, 159, 146, 150], None), None);
    }

    #[test]
    fn test_dialect_round_trip() {
        for d in ALL_DIALECTS {
            assert_eq!(Dialect::from_str(d.as_str()), Ok(*d));
        }
    }
}
