use crate::changelog::ChangelogFormat;
use crate::checks::{CheckName, CheckSelection};
use crate::errors::{CadenceError, Result, io_error_with_path};
use crate::graph::RangePolicy;
use crate::version::BumpStrategy;
use std::collections::BTreeMap;
use std::path::Path;

pub const CONFIG_DIR: &str = ".cadence";
const SCHEMA_VERSION: i64 = 1;
pub const DEFAULT_TAG_TEMPLATE: &str = "${prefix}${packageName}@${version}";
pub const DEFAULT_COMMIT_MESSAGE: &str = "chore(release): release ${packageName}@${version}";

/// Configuration for Cadence, read from `.cadence/config.toml`
#[derive(Debug, Clone)]
pub struct Config {
    pub strategy: BumpStrategy,
    pub range_policy: RangePolicy,
    pub changelog: ChangelogConfig,
    pub git: GitConfig,
    pub registry: RegistryConfig,
    pub checks: CheckSelection,
    /// Wildcard patterns matched against package names and workspace-relative paths.
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChangelogConfig {
    pub format: ChangelogFormat,
    pub file: String,
    /// When set, a missing changelog fails validation instead of being created.
    pub required: bool,
    pub package_formats: BTreeMap<String, ChangelogFormat>,
}

impl ChangelogConfig {
    pub fn format_for(&self, package: &str) -> ChangelogFormat {
        self.package_formats
            .get(package)
            .copied()
            .unwrap_or(self.format)
    }
}

#[derive(Debug, Clone)]
pub struct GitConfig {
    pub remote: String,
    pub release_branches: Vec<String>,
    pub tag_prefix: String,
    pub tag_template: String,
    pub commit_message: String,
    pub push: bool,
    pub force: bool,
}

impl GitConfig {
    pub fn is_release_branch(&self, branch: &str) -> bool {
        self.release_branches.is_empty() || self.release_branches.iter().any(|b| b == branch)
    }

    /// Tag name for a release, e.g. `a@1.0.1` or `v-a@1.0.1` with a prefix.
    pub fn tag_name(&self, package: &str, version: &str) -> String {
        render_template(
            &self.tag_template,
            &[
                ("prefix", &self.tag_prefix),
                ("packageName", package),
                ("version", version),
            ],
        )
    }

    /// Prefix shared by every tag of `package`, used to find its previous release.
    pub fn tag_prefix_for(&self, package: &str) -> String {
        let marker = "\u{0}";
        let rendered = self.tag_name(package, marker);
        match rendered.find(marker) {
            Some(idx) => rendered[..idx].to_string(),
            None => rendered,
        }
    }

    pub fn commit_message(&self, package: &str, version: &str) -> String {
        render_template(
            &self.commit_message,
            &[("packageName", package), ("version", version)],
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    pub publish: bool,
    pub registry: Option<String>,
    pub access: Option<String>,
    /// npm dist-tag used when publishing.
    pub tag: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: BumpStrategy::Independent,
            range_policy: RangePolicy::Preserve,
            changelog: ChangelogConfig {
                format: ChangelogFormat::Conventional,
                file: "CHANGELOG.md".to_string(),
                required: false,
                package_formats: BTreeMap::new(),
            },
            git: GitConfig {
                remote: "origin".to_string(),
                release_branches: vec!["main".to_string(), "master".to_string()],
                tag_prefix: String::new(),
                tag_template: DEFAULT_TAG_TEMPLATE.to_string(),
                commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
                push: true,
                force: false,
            },
            registry: RegistryConfig {
                publish: true,
                ..RegistryConfig::default()
            },
            checks: CheckSelection::default(),
            ignore: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from .cadence/config.toml
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_DIR).join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }

        let text =
            std::fs::read_to_string(&path).map_err(|e| io_error_with_path(e, &path))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let value: toml::Value = text
            .parse()
            .map_err(|e| CadenceError::Configuration(format!("invalid config.toml: {e}")))?;
        let defaults = Self::default();

        if let Some(version) = value.get("version")
            && version.as_integer() != Some(SCHEMA_VERSION)
        {
            return Err(CadenceError::Configuration(format!(
                "unsupported config version {version} (expected {SCHEMA_VERSION})"
            )));
        }

        let versioning = section(&value, "versioning");
        let strategy = match str_key(versioning, "strategy") {
            Some(s) => s.parse::<BumpStrategy>().map_err(CadenceError::Configuration)?,
            None => defaults.strategy,
        };
        let range_policy = match str_key(versioning, "range_policy") {
            Some(s) => s.parse::<RangePolicy>().map_err(CadenceError::Configuration)?,
            None => defaults.range_policy,
        };

        let changelog_table = section(&value, "changelog");
        let format = match str_key(changelog_table, "format") {
            Some(s) => s.parse::<ChangelogFormat>().map_err(CadenceError::Configuration)?,
            None => defaults.changelog.format,
        };
        let mut package_formats = BTreeMap::new();
        if let Some(packages) = changelog_table
            .and_then(|t| t.get("packages"))
            .and_then(toml::Value::as_table)
        {
            for (name, entry) in packages {
                let Some(fmt) = entry.get("format").and_then(toml::Value::as_str) else {
                    return Err(CadenceError::Configuration(format!(
                        "changelog.packages.{name} must set a 'format'"
                    )));
                };
                let fmt = fmt
                    .parse::<ChangelogFormat>()
                    .map_err(CadenceError::Configuration)?;
                package_formats.insert(name.clone(), fmt);
            }
        }
        let changelog = ChangelogConfig {
            format,
            file: str_key(changelog_table, "file")
                .map(str::to_string)
                .unwrap_or(defaults.changelog.file),
            required: bool_key(changelog_table, "required").unwrap_or(false),
            package_formats,
        };

        let git_table = section(&value, "git");
        let git = GitConfig {
            remote: str_key(git_table, "remote")
                .map(str::to_string)
                .unwrap_or(defaults.git.remote),
            release_branches: string_list(git_table, "git.release_branches", "release_branches")?
                .unwrap_or(defaults.git.release_branches),
            tag_prefix: str_key(git_table, "tag_prefix")
                .map(str::to_string)
                .unwrap_or_default(),
            tag_template: str_key(git_table, "tag_template")
                .map(str::to_string)
                .unwrap_or(defaults.git.tag_template),
            commit_message: str_key(git_table, "commit_message")
                .map(str::to_string)
                .unwrap_or(defaults.git.commit_message),
            push: bool_key(git_table, "push").unwrap_or(true),
            force: bool_key(git_table, "force").unwrap_or(false),
        };
        if !git.tag_template.contains("${version}") {
            return Err(CadenceError::Configuration(
                "git.tag_template must contain ${version}".into(),
            ));
        }

        let registry_table = section(&value, "registry");
        let registry = RegistryConfig {
            publish: bool_key(registry_table, "publish").unwrap_or(true),
            registry: str_key(registry_table, "registry").map(str::to_string),
            access: str_key(registry_table, "access").map(str::to_string),
            tag: str_key(registry_table, "tag").map(str::to_string),
        };

        let checks_table = section(&value, "checks");
        let parse_checks = |key: &str| -> Result<Vec<CheckName>> {
            string_list(checks_table, &format!("checks.{key}"), key)?
                .unwrap_or_default()
                .iter()
                .map(|s| s.parse::<CheckName>().map_err(CadenceError::Configuration))
                .collect()
        };
        let checks = CheckSelection {
            only: parse_checks("only")?,
            skip: parse_checks("skip")?,
        };

        let ignore = string_list(section(&value, "packages"), "packages.ignore", "ignore")?
            .unwrap_or_default();

        Ok(Self {
            strategy,
            range_policy,
            changelog,
            git,
            registry,
            checks,
            ignore,
        })
    }
}

/// Substitute `${key}` placeholders. Unknown placeholders are left untouched.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

fn section<'a>(value: &'a toml::Value, name: &str) -> Option<&'a toml::Table> {
    value.get(name).and_then(toml::Value::as_table)
}

fn str_key<'a>(table: Option<&'a toml::Table>, key: &str) -> Option<&'a str> {
    table.and_then(|t| t.get(key)).and_then(toml::Value::as_str)
}

fn bool_key(table: Option<&toml::Table>, key: &str) -> Option<bool> {
    table.and_then(|t| t.get(key)).and_then(toml::Value::as_bool)
}

fn string_list(
    table: Option<&toml::Table>,
    label: &str,
    key: &str,
) -> Result<Option<Vec<String>>> {
    let Some(value) = table.and_then(|t| t.get(key)) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| CadenceError::Configuration(format!("{label} must be an array of strings")))?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                CadenceError::Configuration(format!(
                    "{label} must be an array of strings, found: {item}"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}
