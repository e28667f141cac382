//! Pre-release checks.
//!
//! Checks are a fixed registry of named checks. Which ones run is decided by a
//! [`CheckSelection`]: a non-empty `only` list wins over `skip`.

use crate::adapters::{Registry, VersionControl};
use crate::config::Config;
use crate::errors::CadenceError;
use crate::git;
use crate::types::{Package, VersionBumpPlan};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckName {
    WorkingTree,
    Branch,
    Upstream,
    RegistryAuth,
    VersionUnique,
    /// Advisory: reports outdated dependencies but never fails.
    DependencyUpdates,
}

/// Whether a check runs once per run or once per released package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckScope {
    Workspace,
    Package,
}

impl CheckName {
    pub const ALL: [CheckName; 6] = [
        Self::WorkingTree,
        Self::Branch,
        Self::Upstream,
        Self::RegistryAuth,
        Self::VersionUnique,
        Self::DependencyUpdates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkingTree => "working-tree",
            Self::Branch => "branch",
            Self::Upstream => "upstream",
            Self::RegistryAuth => "registry-auth",
            Self::VersionUnique => "version-unique",
            Self::DependencyUpdates => "dependency-updates",
        }
    }

    pub fn scope(&self) -> CheckScope {
        match self {
            Self::VersionUnique | Self::DependencyUpdates => CheckScope::Package,
            _ => CheckScope::Workspace,
        }
    }
}

impl FromStr for CheckName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|n| n.as_str()).collect();
                format!("unknown check '{s}' (known: {})", known.join(", "))
            })
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSelection {
    pub only: Vec<CheckName>,
    pub skip: Vec<CheckName>,
}

impl CheckSelection {
    pub fn includes(&self, name: CheckName) -> bool {
        if !self.only.is_empty() {
            return self.only.contains(&name);
        }
        !self.skip.contains(&name)
    }

    /// Layers per-invocation flags over the configured selection.
    pub fn overridden_by(&self, flags: &CheckSelection) -> CheckSelection {
        let only = if flags.only.is_empty() {
            self.only.clone()
        } else {
            flags.only.clone()
        };
        let mut skip = self.skip.clone();
        for name in &flags.skip {
            if !skip.contains(name) {
                skip.push(*name);
            }
        }
        CheckSelection { only, skip }
    }
}

#[derive(Debug)]
pub enum CheckOutcome {
    Passed,
    Skipped(String),
    Warning(String),
    Failed(CadenceError),
}

#[derive(Debug)]
pub struct CheckReport {
    pub check: CheckName,
    /// `None` for workspace-wide checks.
    pub package: Option<String>,
    pub outcome: CheckOutcome,
}

impl CheckReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, CheckOutcome::Failed(_))
    }
}

/// Returns the first failure, consuming the reports.
pub fn first_failure(reports: Vec<CheckReport>) -> Option<CadenceError> {
    reports.into_iter().find_map(|r| match r.outcome {
        CheckOutcome::Failed(err) => Some(err),
        _ => None,
    })
}

/// Runs the selected checks against the adapters.
pub struct Validator<'a, G, R> {
    git: &'a G,
    registry: &'a R,
    config: &'a Config,
    selection: CheckSelection,
}

impl<'a, G: VersionControl, R: Registry> Validator<'a, G, R> {
    pub fn new(git: &'a G, registry: &'a R, config: &'a Config, selection: CheckSelection) -> Self {
        Self {
            git,
            registry,
            config,
            selection,
        }
    }

    /// Workspace-wide checks. `publishing` is false when nothing will be published.
    pub async fn workspace_checks(&self, publishing: bool) -> Vec<CheckReport> {
        let mut reports = Vec::new();
        for check in CheckName::ALL
            .into_iter()
            .filter(|c| c.scope() == CheckScope::Workspace)
        {
            let outcome = if !self.selection.includes(check) {
                CheckOutcome::Skipped("disabled".into())
            } else {
                match check {
                    CheckName::WorkingTree => self.working_tree().await,
                    CheckName::Branch => self.branch().await,
                    CheckName::Upstream => self.upstream().await,
                    CheckName::RegistryAuth if !publishing => {
                        CheckOutcome::Skipped("nothing to publish".into())
                    }
                    CheckName::RegistryAuth => self.registry_auth().await,
                    CheckName::VersionUnique | CheckName::DependencyUpdates => continue,
                }
            };
            debug!(check = %check, ?outcome, "check finished");
            reports.push(CheckReport {
                check,
                package: None,
                outcome,
            });
        }
        reports
    }

    /// Checks for one planned release.
    pub async fn package_checks(
        &self,
        package: &Package,
        plan: &VersionBumpPlan,
    ) -> Vec<CheckReport> {
        let mut reports = Vec::new();
        for check in CheckName::ALL
            .into_iter()
            .filter(|c| c.scope() == CheckScope::Package)
        {
            let outcome = if !self.selection.includes(check) {
                CheckOutcome::Skipped("disabled".into())
            } else if package.private || !self.config.registry.publish {
                CheckOutcome::Skipped("not published".into())
            } else {
                match check {
                    CheckName::VersionUnique => self.version_unique(package, plan).await,
                    _ => self.dependency_updates(package).await,
                }
            };
            debug!(check = %check, package = %package.name, ?outcome, "check finished");
            reports.push(CheckReport {
                check,
                package: Some(package.name.clone()),
                outcome,
            });
        }
        reports
    }

    async fn working_tree(&self) -> CheckOutcome {
        match self.git.status().await {
            Ok(lines) if lines.is_empty() => CheckOutcome::Passed,
            Ok(lines) => CheckOutcome::Failed(CadenceError::validation(
                CheckName::WorkingTree.as_str(),
                format!(
                    "working tree has {} uncommitted change(s), first: {}",
                    lines.len(),
                    lines[0].trim()
                ),
                "commit or stash your changes before releasing",
            )),
            Err(err) => CheckOutcome::Failed(err),
        }
    }

    async fn branch(&self) -> CheckOutcome {
        let branch = match git::current_branch(self.git).await {
            Ok(branch) => branch,
            Err(err) => return CheckOutcome::Failed(err),
        };
        if self.config.git.is_release_branch(&branch) {
            return CheckOutcome::Passed;
        }
        CheckOutcome::Failed(CadenceError::validation(
            CheckName::Branch.as_str(),
            format!(
                "branch '{branch}' is not a release branch (allowed: {})",
                self.config.git.release_branches.join(", ")
            ),
            "switch to a release branch or add it to git.release_branches",
        ))
    }

    async fn upstream(&self) -> CheckOutcome {
        let Some(upstream) = git::upstream(self.git).await else {
            return CheckOutcome::Warning("branch has no upstream; it will be set on push".into());
        };
        let remote = &self.config.git.remote;
        if let Err(err) = self.git.fetch(remote).await {
            return CheckOutcome::Failed(CadenceError::validation(
                CheckName::Upstream.as_str(),
                format!("could not fetch {remote}: {err}"),
                "check network access and remote credentials",
            ));
        }
        match git::commits_behind(self.git).await {
            Ok(0) => CheckOutcome::Passed,
            Ok(behind) => CheckOutcome::Failed(CadenceError::validation(
                CheckName::Upstream.as_str(),
                format!("branch is {behind} commit(s) behind {upstream}"),
                "pull the latest changes (git pull --rebase) and retry",
            )),
            Err(err) => CheckOutcome::Failed(err),
        }
    }

    async fn registry_auth(&self) -> CheckOutcome {
        match self.registry.validate_auth(&self.config.registry).await {
            Ok(()) => CheckOutcome::Passed,
            Err(err) => CheckOutcome::Failed(CadenceError::validation(
                CheckName::RegistryAuth.as_str(),
                format!("registry authentication failed: {err}"),
                "log in with `npm login` or provide an auth token",
            )),
        }
    }

    async fn version_unique(&self, package: &Package, plan: &VersionBumpPlan) -> CheckOutcome {
        match self
            .registry
            .latest_version(&package.name, &self.config.registry)
            .await
        {
            Ok(Some(latest)) if plan.to_version <= latest => {
                CheckOutcome::Failed(CadenceError::validation(
                    CheckName::VersionUnique.as_str(),
                    format!(
                        "{}@{} is not newer than the published {latest}",
                        package.name, plan.to_version
                    ),
                    format!(
                        "release a higher version, e.g. --version {}=<version>",
                        package.name
                    ),
                ))
            }
            Ok(_) => CheckOutcome::Passed,
            Err(err) => CheckOutcome::Failed(CadenceError::validation(
                CheckName::VersionUnique.as_str(),
                format!("could not query the registry for {}: {err}", package.name),
                "check registry access or skip the version-unique check",
            )),
        }
    }

    async fn dependency_updates(&self, package: &Package) -> CheckOutcome {
        match self.registry.dependency_updates(package).await {
            Ok(outdated) if outdated.is_empty() => CheckOutcome::Passed,
            Ok(outdated) => CheckOutcome::Warning(format!(
                "{} outdated dependencies: {}",
                outdated.len(),
                outdated
                    .iter()
                    .map(|d| format!("{} {} -> {}", d.name, d.current, d.latest))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Err(err) => CheckOutcome::Warning(format!("could not check dependency updates: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGit, FakeRegistry};
    use crate::types::{BumpKind, BumpReason};
    use semver::Version;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn package(name: &str) -> Package {
        Package {
            name: name.into(),
            path: PathBuf::from(format!("/repo/packages/{name}")),
            relative_path: format!("packages/{name}"),
            version: Version::new(1, 0, 0),
            dependencies: BTreeMap::new(),
            private: false,
        }
    }

    fn plan(name: &str, to: &str) -> VersionBumpPlan {
        VersionBumpPlan::new(
            name,
            Version::new(1, 0, 0),
            Version::parse(to).unwrap(),
            BumpKind::Patch,
            BumpReason::DirectCommits,
        )
    }

    fn failed_checks(reports: &[CheckReport]) -> Vec<CheckName> {
        reports
            .iter()
            .filter(|r| r.is_failure())
            .map(|r| r.check)
            .collect()
    }

    #[test]
    fn only_overrides_skip() {
        let selection = CheckSelection {
            only: vec![CheckName::Branch],
            skip: vec![CheckName::Branch, CheckName::Upstream],
        };
        assert!(selection.includes(CheckName::Branch));
        assert!(!selection.includes(CheckName::WorkingTree));

        let skip_only = CheckSelection {
            only: vec![],
            skip: vec![CheckName::Upstream],
        };
        assert!(!skip_only.includes(CheckName::Upstream));
        assert!(skip_only.includes(CheckName::WorkingTree));
    }

    #[test]
    fn flags_layer_over_configuration() {
        let configured = CheckSelection {
            only: vec![],
            skip: vec![CheckName::Upstream],
        };
        let flags = CheckSelection {
            only: vec![],
            skip: vec![CheckName::RegistryAuth, CheckName::Upstream],
        };
        let merged = configured.overridden_by(&flags);
        assert_eq!(merged.skip, vec![CheckName::Upstream, CheckName::RegistryAuth]);
    }

    #[test]
    fn parses_check_names() {
        assert_eq!("working-tree".parse(), Ok(CheckName::WorkingTree));
        assert_eq!("registry_auth".parse(), Ok(CheckName::RegistryAuth));
        let err = "lint".parse::<CheckName>().unwrap_err();
        assert!(err.contains("known: working-tree"));
    }

    #[tokio::test]
    async fn clean_repository_passes_workspace_checks() {
        let git = FakeGit::new();
        let registry = FakeRegistry::new();
        let config = Config::default();
        let validator = Validator::new(&git, &registry, &config, CheckSelection::default());
        let reports = validator.workspace_checks(true).await;
        assert_eq!(reports.len(), 4);
        assert!(failed_checks(&reports).is_empty());
    }

    #[tokio::test]
    async fn reports_each_failing_check_with_remediation() {
        let git = FakeGit::new()
            .with_dirty_file(" M packages/a/index.js")
            .with_branch("feature/x")
            .with_upstream(Some("origin/feature/x"), 2);
        let registry = FakeRegistry::new();
        registry.deny_auth();
        let config = Config::default();
        let validator = Validator::new(&git, &registry, &config, CheckSelection::default());
        let reports = validator.workspace_checks(true).await;
        assert_eq!(
            failed_checks(&reports),
            vec![
                CheckName::WorkingTree,
                CheckName::Branch,
                CheckName::Upstream,
                CheckName::RegistryAuth
            ]
        );
        let err = first_failure(reports).unwrap();
        let msg = err.to_string();
        assert!(msg.contains("working-tree"));
        assert!(msg.contains("commit or stash"));
    }

    #[tokio::test]
    async fn missing_upstream_only_warns() {
        let git = FakeGit::new().with_upstream(None, 0);
        let registry = FakeRegistry::new();
        let config = Config::default();
        let selection = CheckSelection {
            only: vec![CheckName::Upstream],
            skip: vec![],
        };
        let validator = Validator::new(&git, &registry, &config, selection);
        let reports = validator.workspace_checks(false).await;
        let upstream = reports
            .iter()
            .find(|r| r.check == CheckName::Upstream)
            .unwrap();
        assert!(matches!(upstream.outcome, CheckOutcome::Warning(_)));
        assert!(
            reports
                .iter()
                .filter(|r| r.check != CheckName::Upstream)
                .all(|r| matches!(r.outcome, CheckOutcome::Skipped(_)))
        );
    }

    #[tokio::test]
    async fn version_must_be_newer_than_published() {
        let git = FakeGit::new();
        let registry = FakeRegistry::new()
            .with_latest("a", "1.0.1")
            .with_outdated("a", "react", "18.2.0", "19.0.0");
        let config = Config::default();
        let validator = Validator::new(&git, &registry, &config, CheckSelection::default());

        let reports = validator.package_checks(&package("a"), &plan("a", "1.0.1")).await;
        assert_eq!(failed_checks(&reports), vec![CheckName::VersionUnique]);
        let advisory = reports
            .iter()
            .find(|r| r.check == CheckName::DependencyUpdates)
            .unwrap();
        assert!(matches!(&advisory.outcome, CheckOutcome::Warning(w) if w.contains("react 18.2.0 -> 19.0.0")));

        let ok = validator.package_checks(&package("a"), &plan("a", "1.1.0")).await;
        assert!(failed_checks(&ok).is_empty());
    }

    #[tokio::test]
    async fn private_packages_skip_registry_checks() {
        let git = FakeGit::new();
        let registry = FakeRegistry::new().with_latest("a", "9.0.0");
        let config = Config::default();
        let validator = Validator::new(&git, &registry, &config, CheckSelection::default());
        let mut private = package("a");
        private.private = true;
        let reports = validator.package_checks(&private, &plan("a", "1.0.1")).await;
        assert!(
            reports
                .iter()
                .all(|r| matches!(r.outcome, CheckOutcome::Skipped(_)))
        );
        assert!(registry.calls().is_empty());
    }
}
