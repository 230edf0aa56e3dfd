//! Static, declarative extraction rule tables — one per dialect.
//!
//! Rule tables are data, not code: the structural extractors, the fallback
//! extractor, and the normalizer's allow-list validation all read the same
//! tables, so fact shape is uniform regardless of extraction path. Adding a
//! dialect means adding a table here (plus a grammar in the parser registry);
//! no orchestrator, normalizer, or fallback changes.

use super::Dialect;

/// The broad syntactic shape of a dialect, used to pick the right structural
/// walker and fallback regex template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxFamily {
    /// Ruby-style resource blocks: `package "nginx" do ... end`.
    RubyBlock,
    /// YAML mappings: module keys in tasks, or `id: { mod.func: ... }` states.
    YamlMapping,
    /// Imperative commands: `yum install nginx`, `blcli service nginx`.
    ShellCommand,
}

/// A recognized resource-declaring call/key/command word.
#[derive(Debug, Clone, Copy)]
pub struct ResourceCall {
    /// The identifier as it appears in source (call name, mapping key,
    /// command word, or Salt module prefix).
    pub word: &'static str,
    /// The normalized resource type the match yields.
    pub resource_type: &'static str,
}

/// A recognized dependency-reference pattern ("module A includes module B").
#[derive(Debug, Clone, Copy)]
pub struct DependencyCall {
    pub word: &'static str,
    /// The reference kind recorded on the resulting Dependency fact.
    pub resource_type: &'static str,
    /// Whether the match also yields a Resource fact for the inclusion site,
    /// keeping resource and relationship inventories independently queryable.
    /// True for inclusion forms, false for plain declarations (`depends`).
    pub site_resource: bool,
}

/// The full extraction rule table for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct DialectRules {
    pub dialect: Dialect,
    pub family: SyntaxFamily,
    /// File extensions (without dot) owned by this dialect.
    pub extensions: &'static [&'static str],
    /// Path globs used by the bundle collector.
    pub path_globs: &'static [&'static str],
    pub resource_calls: &'static [ResourceCall],
    pub dependency_calls: &'static [DependencyCall],
    /// Top-level declaration fields surfaced as Metadata facts.
    pub metadata_fields: &'static [&'static str],
    /// Resource types accepted by the normalizer's validation pass.
    pub allowed_types: &'static [&'static str],
    /// Feature toggles gating whole rule groups.
    pub extract_variables: bool,
    pub extract_metadata: bool,
}

impl DialectRules {
    pub fn resource_type_for(&self, word: &str) -> Option<&'static str> {
        self.resource_calls
            .iter()
            .find(|c| c.word == word)
            .map(|c| c.resource_type)
    }

    pub fn dependency_type_for(&self, word: &str) -> Option<&'static str> {
        self.dependency_calls
            .iter()
            .find(|c| c.word == word)
            .map(|c| c.resource_type)
    }

    pub fn allows(&self, resource_type: &str) -> bool {
        self.allowed_types.contains(&resource_type)
    }
}

static CHEF_RULES: DialectRules = DialectRules {
    dialect: Dialect::Chef,
    family: SyntaxFamily::RubyBlock,
    extensions: &["rb"],
    path_globs: &["**/metadata.rb", "**/recipes/*.rb", "**/attributes/*.rb"],
    resource_calls: &[
        ResourceCall { word: "package", resource_type: "package" },
        ResourceCall { word: "service", resource_type: "service" },
        ResourceCall { word: "file", resource_type: "file" },
        ResourceCall { word: "cookbook_file", resource_type: "file" },
        ResourceCall { word: "remote_file", resource_type: "file" },
        ResourceCall { word: "template", resource_type: "template" },
        ResourceCall { word: "directory", resource_type: "directory" },
        ResourceCall { word: "user", resource_type: "user" },
        ResourceCall { word: "group", resource_type: "group" },
        ResourceCall { word: "cron", resource_type: "cron" },
        ResourceCall { word: "execute", resource_type: "execute" },
    ],
    dependency_calls: &[
        DependencyCall { word: "include_recipe", resource_type: "include_recipe", site_resource: true },
        DependencyCall { word: "depends", resource_type: "cookbook_depend", site_resource: false },
    ],
    metadata_fields: &[
        "name",
        "version",
        "description",
        "maintainer",
        "license",
        "chef_version",
    ],
    allowed_types: &[
        "package",
        "service",
        "file",
        "template",
        "directory",
        "user",
        "group",
        "cron",
        "execute",
        "include_recipe",
        "cookbook_depend",
        "metadata",
        "variable",
    ],
    extract_variables: true,
    extract_metadata: true,
};

static ANSIBLE_RULES: DialectRules = DialectRules {
    dialect: Dialect::Ansible,
    family: SyntaxFamily::YamlMapping,
    extensions: &["yml", "yaml"],
    path_globs: &["**/playbooks/**/*.yml", "**/roles/**/*.yml", "**/tasks/*.yml"],
    resource_calls: &[
        ResourceCall { word: "package", resource_type: "package" },
        ResourceCall { word: "apt", resource_type: "package" },
        ResourceCall { word: "yum", resource_type: "package" },
        ResourceCall { word: "dnf", resource_type: "package" },
        ResourceCall { word: "pip", resource_type: "package" },
        ResourceCall { word: "service", resource_type: "service" },
        ResourceCall { word: "systemd", resource_type: "service" },
        ResourceCall { word: "copy", resource_type: "file" },
        ResourceCall { word: "file", resource_type: "file" },
        ResourceCall { word: "template", resource_type: "template" },
        ResourceCall { word: "user", resource_type: "user" },
        ResourceCall { word: "group", resource_type: "group" },
        ResourceCall { word: "cron", resource_type: "cron" },
    ],
    dependency_calls: &[
        DependencyCall { word: "roles", resource_type: "role", site_resource: true },
        DependencyCall { word: "include_role", resource_type: "role", site_resource: true },
        DependencyCall { word: "import_role", resource_type: "role", site_resource: true },
        DependencyCall { word: "include_tasks", resource_type: "tasks_include", site_resource: true },
        DependencyCall { word: "import_tasks", resource_type: "tasks_include", site_resource: true },
        DependencyCall { word: "import_playbook", resource_type: "playbook_import", site_resource: true },
    ],
    metadata_fields: &["hosts", "become", "gather_facts"],
    allowed_types: &[
        "package",
        "service",
        "file",
        "template",
        "user",
        "group",
        "cron",
        "role",
        "tasks_include",
        "playbook_import",
        "metadata",
        "variable",
    ],
    extract_variables: true,
    extract_metadata: true,
};

static SALT_RULES: DialectRules = DialectRules {
    dialect: Dialect::Salt,
    family: SyntaxFamily::YamlMapping,
    extensions: &["sls"],
    path_globs: &["**/salt/**/*.sls"],
    // Salt states key on `module.function`; the word here is the module prefix.
    resource_calls: &[
        ResourceCall { word: "pkg", resource_type: "package" },
        ResourceCall { word: "service", resource_type: "service" },
        ResourceCall { word: "file", resource_type: "file" },
        ResourceCall { word: "user", resource_type: "user" },
        ResourceCall { word: "group", resource_type: "group" },
        ResourceCall { word: "cron", resource_type: "cron" },
        ResourceCall { word: "cmd", resource_type: "execute" },
    ],
    dependency_calls: &[
        DependencyCall { word: "include", resource_type: "state_include", site_resource: true },
    ],
    metadata_fields: &[],
    allowed_types: &[
        "package",
        "service",
        "file",
        "user",
        "group",
        "cron",
        "execute",
        "state_include",
        "metadata",
        "variable",
    ],
    extract_variables: false,
    extract_metadata: false,
};

static SHELL_RULES: DialectRules = DialectRules {
    dialect: Dialect::Shell,
    family: SyntaxFamily::ShellCommand,
    extensions: &["sh", "bash"],
    path_globs: &["**/scripts/**/*.sh"],
    resource_calls: &[
        ResourceCall { word: "apt-get", resource_type: "package" },
        ResourceCall { word: "apt", resource_type: "package" },
        ResourceCall { word: "yum", resource_type: "package" },
        ResourceCall { word: "dnf", resource_type: "package" },
        ResourceCall { word: "apk", resource_type: "package" },
        ResourceCall { word: "rpm", resource_type: "package" },
        ResourceCall { word: "pip", resource_type: "package" },
        ResourceCall { word: "systemctl", resource_type: "service" },
        ResourceCall { word: "service", resource_type: "service" },
        ResourceCall { word: "chkconfig", resource_type: "service" },
        ResourceCall { word: "useradd", resource_type: "user" },
        ResourceCall { word: "groupadd", resource_type: "group" },
        ResourceCall { word: "mkdir", resource_type: "directory" },
        ResourceCall { word: "cp", resource_type: "file" },
        ResourceCall { word: "install", resource_type: "file" },
    ],
    dependency_calls: &[
        DependencyCall { word: "source", resource_type: "source", site_resource: true },
        DependencyCall { word: ".", resource_type: "source", site_resource: true },
    ],
    metadata_fields: &[],
    allowed_types: &[
        "package",
        "service",
        "user",
        "group",
        "directory",
        "file",
        "source",
        "metadata",
        "variable",
    ],
    extract_variables: true,
    extract_metadata: false,
};

static BLADELOGIC_RULES: DialectRules = DialectRules {
    dialect: Dialect::Bladelogic,
    family: SyntaxFamily::ShellCommand,
    extensions: &["nsh"],
    path_globs: &["**/jobs/**/*.nsh"],
    resource_calls: &[
        ResourceCall { word: "blpackage", resource_type: "package" },
        ResourceCall { word: "blpolicy", resource_type: "policy" },
        ResourceCall { word: "nexec", resource_type: "script" },
        ResourceCall { word: "blcli_execute", resource_type: "script" },
        ResourceCall { word: "blcli", resource_type: "execute" },
        ResourceCall { word: "yum", resource_type: "package" },
        ResourceCall { word: "rpm", resource_type: "package" },
        ResourceCall { word: "systemctl", resource_type: "service" },
    ],
    dependency_calls: &[
        DependencyCall { word: "source", resource_type: "source", site_resource: true },
        DependencyCall { word: ".", resource_type: "source", site_resource: true },
    ],
    metadata_fields: &[],
    allowed_types: &[
        "package",
        "policy",
        "script",
        "execute",
        "service",
        "source",
        "metadata",
        "variable",
    ],
    extract_variables: true,
    extract_metadata: false,
};

static ALL_RULES: &[&DialectRules] = &[
    &CHEF_RULES,
    &ANSIBLE_RULES,
    &SALT_RULES,
    &SHELL_RULES,
    &BLADELOGIC_RULES,
];

/// All registered rule tables.
pub fn all_rules() -> impl Iterator<Item = &'static DialectRules> {
    ALL_RULES.iter().copied()
}

/// The rule table for a dialect.
pub fn rules_for(dialect: Dialect) -> &'static DialectRules {
    match dialect {
        Dialect::Chef => &CHEF_RULES,
        Dialect::Ansible => &ANSIBLE_RULES,
        Dialect::Salt => &SALT_RULES,
        Dialect::Shell => &SHELL_RULES,
        Dialect::Bladelogic => &BLADELOGIC_RULES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_dialect_has_rules() {
        for d in super::super::ALL_DIALECTS {
            let rules = rules_for(*d);
            assert_eq!(rules.dialect, *d);
            assert!(!rules.extensions.is_empty());
        }
    }

    #[test]
    fn test_allow_list_covers_rule_outputs() {
        // Validation must never reject a type the extractors can produce.
        for rules in all_rules() {
            for call in rules.resource_calls {
                assert!(
                    rules.allows(call.resource_type),
                    "{} missing {} in allow-list",
                    rules.dialect,
                    call.resource_type
                );
            }
            for call in rules.dependency_calls {
                assert!(
                    rules.allows(call.resource_type),
                    "{} missing {} in allow-list",
                    rules.dialect,
                    call.resource_type
                );
            }
        }
    }

    #[test]
    fn test_lookup_helpers() {
        let chef = rules_for(Dialect::Chef);
        assert_eq!(chef.resource_type_for("cookbook_file"), Some("file"));
        assert_eq!(chef.dependency_type_for("include_recipe"), Some("include_recipe"));
        assert_eq!(chef.resource_type_for("not_a_resource"), None);
    }

    #[test]
    fn test_extensions_unique_across_dialects() {
        let mut seen = std::collections::HashSet::new();
        for rules in all_rules() {
            for ext in rules.extensions {
                assert!(seen.insert(*ext), "extension {} claimed twice", ext);
            }
        }
    }
}
