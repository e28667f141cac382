//! npm registry adapter: HTTP lookups against the registry API, and the
//! package manager CLI for auth, packing and publishing.

use crate::adapters::{OutdatedDependency, Registry};
use crate::config::RegistryConfig;
use crate::errors::{CadenceError, Result};
use crate::process::{run, run_unchecked};
use crate::types::Package;
use reqwest::StatusCode;
use semver::Version;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    pub fn program(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }
}

/// [`Registry`] for the npm registry and its package managers.
#[derive(Debug, Clone)]
pub struct NpmRegistry {
    root: PathBuf,
    client: reqwest::Client,
}

impl NpmRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|e| CadenceError::external("http client", e.to_string()))?;
        Ok(Self {
            root: root.into(),
            client,
        })
    }
}

impl Registry for NpmRegistry {
    async fn validate_auth(&self, config: &RegistryConfig) -> Result<()> {
        let mut args = vec!["whoami"];
        if let Some(registry) = config.registry.as_deref() {
            args.extend(["--registry", registry]);
        }
        let user = run("npm", &args, &self.root).await?;
        tracing::debug!(user = %user.trim(), "registry auth ok");
        Ok(())
    }

    async fn latest_version(
        &self,
        name: &str,
        config: &RegistryConfig,
    ) -> Result<Option<Version>> {
        let url = build_registry_url(config.registry.as_deref(), name)?;
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/vnd.npm.install-v1+json")
            .send()
            .await
            .map_err(|e| CadenceError::external(format!("GET {url}"), e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.trim().chars().take(400).collect();
            return Err(CadenceError::external(
                format!("GET {url}"),
                format!("registry returned {status}: {snippet}"),
            ));
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| CadenceError::external(format!("GET {url}"), e.to_string()))?;
        parse_latest_version(&body)
    }

    async fn publish(&self, package: &Package, config: &RegistryConfig) -> Result<()> {
        if package.private {
            return Err(CadenceError::InvalidData(format!(
                "package '{}' is private and cannot be published",
                package.name
            )));
        }
        let manager = detect_package_manager(&package.path);
        let args = publish_args(package, config);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        info!(package = %package.name, manager = manager.program(), "publishing");
        run(manager.program(), &args, &package.path).await.map(|_| ())
    }

    async fn pack(&self, package: &Package) -> Result<Vec<String>> {
        let output = run("npm", &["pack", "--dry-run", "--json"], &package.path).await?;
        parse_pack_files(&output)
    }

    async fn dependency_updates(&self, package: &Package) -> Result<Vec<OutdatedDependency>> {
        let output = run_unchecked("npm", &["outdated", "--json"], &package.path).await?;
        parse_outdated(&output)
    }
}

fn publish_args(package: &Package, config: &RegistryConfig) -> Vec<String> {
    let mut args = vec!["publish".to_string()];
    if let Some(registry) = &config.registry {
        args.extend(["--registry".to_string(), registry.clone()]);
    }
    match &config.access {
        Some(access) => args.extend(["--access".to_string(), access.clone()]),
        None if package.name.starts_with('@') => {
            args.extend(["--access".to_string(), "public".to_string()])
        }
        None => {}
    }
    if let Some(tag) = &config.tag {
        args.extend(["--tag".to_string(), tag.clone()]);
    }
    args
}

fn parse_latest_version(body: &JsonValue) -> Result<Option<Version>> {
    let Some(latest) = body
        .get("dist-tags")
        .and_then(|tags| tags.get("latest"))
        .and_then(JsonValue::as_str)
    else {
        return Ok(None);
    };
    Version::parse(latest)
        .map(Some)
        .map_err(|e| CadenceError::InvalidData(format!("registry latest '{latest}': {e}")))
}

fn parse_pack_files(output: &str) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    struct PackFile {
        path: String,
    }
    #[derive(Deserialize)]
    struct PackResult {
        #[serde(default)]
        files: Vec<PackFile>,
    }

    let results: Vec<PackResult> = serde_json::from_str(output.trim())?;
    Ok(results
        .into_iter()
        .flat_map(|r| r.files)
        .map(|f| f.path)
        .collect())
}

fn parse_outdated(output: &str) -> Result<Vec<OutdatedDependency>> {
    #[derive(Deserialize)]
    struct Entry {
        current: Option<String>,
        latest: Option<String>,
    }

    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let entries: BTreeMap<String, Entry> = serde_json::from_str(trimmed)?;
    Ok(entries
        .into_iter()
        .filter_map(|(name, entry)| {
            let latest = entry.latest?;
            let current = entry.current.unwrap_or_else(|| "missing".to_string());
            (current != latest).then_some(OutdatedDependency {
                name,
                current,
                latest,
            })
        })
        .collect())
}

fn build_registry_url(base: Option<&str>, package_name: &str) -> Result<reqwest::Url> {
    let trimmed = base
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_NPM_REGISTRY);
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let base_url = reqwest::Url::parse(&normalized).map_err(|e| {
        CadenceError::Configuration(format!("invalid registry URL '{trimmed}': {e}"))
    })?;
    base_url
        .join(&encode_package_name(package_name))
        .map_err(|e| {
            CadenceError::Configuration(format!(
                "failed to construct registry URL for '{package_name}': {e}"
            ))
        })
}

fn encode_package_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'0'..=b'9' | b'a'..=b'z' | b'-' | b'_' | b'.' | b'~' => encoded.push(b as char),
            b'@' => encoded.push_str("%40"),
            b'/' => encoded.push_str("%2F"),
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

/// Package manager from the nearest `packageManager` field or lockfile, npm by default.
pub fn detect_package_manager(dir: &Path) -> PackageManager {
    for ancestor in dir.ancestors() {
        if let Some(manager) = fs::read_to_string(ancestor.join("package.json"))
            .ok()
            .and_then(|text| serde_json::from_str::<JsonValue>(&text).ok())
            .and_then(|m| {
                m.get("packageManager")
                    .and_then(JsonValue::as_str)
                    .and_then(parse_package_manager_field)
            })
        {
            return manager;
        }
        if ancestor.join("pnpm-lock.yaml").exists() {
            return PackageManager::Pnpm;
        }
        if ancestor.join("bun.lockb").exists() || ancestor.join("bun.lock").exists() {
            return PackageManager::Bun;
        }
        if ancestor.join("yarn.lock").exists() {
            return PackageManager::Yarn;
        }
        if ancestor.join("package-lock.json").exists()
            || ancestor.join("npm-shrinkwrap.json").exists()
        {
            return PackageManager::Npm;
        }
    }
    PackageManager::Npm
}

fn parse_package_manager_field(field: &str) -> Option<PackageManager> {
    let trimmed = field.trim();
    let (tool, _) = trimmed.split_once('@').unwrap_or((trimmed, ""));
    match tool {
        "pnpm" => Some(PackageManager::Pnpm),
        "npm" => Some(PackageManager::Npm),
        "yarn" => Some(PackageManager::Yarn),
        "bun" => Some(PackageManager::Bun),
        _ => None,
    }
}
