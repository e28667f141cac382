//! Version resolution: bump strategies, overrides and version arithmetic.

use crate::commits::Commit;
use crate::conventional::max_bump;
use crate::errors::{CadenceError, Result};
use crate::types::{BumpKind, BumpReason, Package, VersionBumpPlan, Workspace};
use semver::{BuildMetadata, Prerelease, Version};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// How versions are shared across the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BumpStrategy {
    /// Each package is versioned from its own commits.
    #[default]
    Independent,
    /// Every package moves to one shared version.
    Fixed,
}

impl FromStr for BumpStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "independent" => Ok(Self::Independent),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!(
                "unknown versioning strategy '{other}' (expected 'independent' or 'fixed')"
            )),
        }
    }
}

/// Apply `kind` to `current`.
///
/// A pre-release is first promoted to its release when that already satisfies the
/// bump (`2.0.0-rc.1` + major = `2.0.0`), so the result is always greater than
/// `current` for any kind other than `None`. Build metadata is dropped.
pub fn bump_version(current: &Version, kind: BumpKind) -> Version {
    let pre = !current.pre.is_empty();
    let (major, minor, patch) = (current.major, current.minor, current.patch);
    let (major, minor, patch) = match kind {
        BumpKind::None => return current.clone(),
        BumpKind::Patch if pre => (major, minor, patch),
        BumpKind::Patch => (major, minor, patch + 1),
        BumpKind::Minor if pre && patch == 0 => (major, minor, 0),
        BumpKind::Minor => (major, minor + 1, 0),
        BumpKind::Major if pre && minor == 0 && patch == 0 => (major, 0, 0),
        BumpKind::Major => (major + 1, 0, 0),
    };
    Version {
        major,
        minor,
        patch,
        pre: Prerelease::EMPTY,
        build: BuildMetadata::EMPTY,
    }
}

/// Infer the bump kind that turns `from` into `to`.
pub fn infer_bump(from: &Version, to: &Version) -> BumpKind {
    if to.major != from.major {
        BumpKind::Major
    } else if to.minor != from.minor {
        BumpKind::Minor
    } else if to != from {
        BumpKind::Patch
    } else {
        BumpKind::None
    }
}

/// Component-wise numeric comparison of dot-separated versions.
///
/// Each segment contributes its leading digits (`"0-beta"` reads as 0) and a
/// missing segment counts as 0, so `1.10` > `1.9` and `1.2` == `1.2.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |s: &str| -> Vec<u64> {
        s.trim()
            .trim_start_matches('v')
            .split('.')
            .map(|segment| {
                let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let (left, right) = (parse(a), parse(b));
    let len = left.len().max(right.len());
    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Proposed next version of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub version: Version,
    pub bump: BumpKind,
}

/// Next version of `package` from its matched `commits`.
///
/// An override is taken as-is and the commits are not classified.
pub fn propose_version(
    package: &Package,
    commits: &[Commit],
    override_version: Option<&Version>,
) -> Proposal {
    if let Some(version) = override_version {
        return Proposal {
            bump: infer_bump(&package.version, version),
            version: version.clone(),
        };
    }
    let bump = max_bump(commits);
    Proposal {
        version: bump_version(&package.version, bump),
        bump,
    }
}

/// Turns per-package commit history into the initial set of version plans.
#[derive(Debug, Clone, Default)]
pub struct VersionResolver {
    pub strategy: BumpStrategy,
    pub overrides: BTreeMap<String, Version>,
}

impl VersionResolver {
    pub fn new(strategy: BumpStrategy, overrides: BTreeMap<String, Version>) -> Self {
        Self {
            strategy,
            overrides,
        }
    }

    /// `history` maps each targeted package to the commits that matched it.
    ///
    /// Packages without a bump are left out; cascading is the propagator's job.
    pub fn resolve(
        &self,
        workspace: &Workspace,
        history: &BTreeMap<String, Vec<Commit>>,
    ) -> Result<Vec<VersionBumpPlan>> {
        for name in self.overrides.keys() {
            if workspace.find(name).is_none() {
                return Err(CadenceError::Configuration(format!(
                    "version override for unknown package '{name}'"
                )));
            }
        }

        match self.strategy {
            BumpStrategy::Independent => self.resolve_independent(workspace, history),
            BumpStrategy::Fixed => self.resolve_fixed(workspace, history),
        }
    }

    fn resolve_independent(
        &self,
        workspace: &Workspace,
        history: &BTreeMap<String, Vec<Commit>>,
    ) -> Result<Vec<VersionBumpPlan>> {
        let mut names: Vec<&String> = history.keys().chain(self.overrides.keys()).collect();
        names.sort();
        names.dedup();

        let mut plans = Vec::new();
        for name in names {
            let package = workspace.find(name).ok_or_else(|| {
                CadenceError::Configuration(format!("package '{name}' is not in the workspace"))
            })?;
            let commits = history.get(name).map(Vec::as_slice).unwrap_or_default();
            let override_version = self.overrides.get(name);
            let proposal = propose_version(package, commits, override_version);

            if override_version.is_none() && proposal.bump == BumpKind::None {
                debug!(package = %name, commits = commits.len(), "no releasable commits");
                continue;
            }

            let reason = if override_version.is_some() {
                BumpReason::Override
            } else {
                BumpReason::DirectCommits
            };
            plans.push(VersionBumpPlan::new(
                name.clone(),
                package.version.clone(),
                proposal.version,
                proposal.bump,
                reason,
            ));
        }
        Ok(plans)
    }

    fn resolve_fixed(
        &self,
        workspace: &Workspace,
        history: &BTreeMap<String, Vec<Commit>>,
    ) -> Result<Vec<VersionBumpPlan>> {
        let Some(base) = workspace.members.iter().map(|p| &p.version).max() else {
            return Ok(Vec::new());
        };

        let mut overrides = self.overrides.values();
        let shared = match overrides.next() {
            Some(first) => {
                if let Some(other) = overrides.find(|v| *v != first) {
                    return Err(CadenceError::Configuration(format!(
                        "fixed versioning needs a single version override, got {first} and {other}"
                    )));
                }
                first.clone()
            }
            None => {
                let bump = max_bump(history.values().flatten());
                if bump == BumpKind::None {
                    debug!("no releasable commits in the workspace");
                    return Ok(Vec::new());
                }
                bump_version(base, bump)
            }
        };

        Ok(workspace
            .members
            .iter()
            .map(|package| {
                let reason = if self.overrides.contains_key(&package.name) {
                    BumpReason::Override
                } else {
                    BumpReason::Fixed
                };
                VersionBumpPlan::new(
                    package.name.clone(),
                    package.version.clone(),
                    shared.clone(),
                    infer_bump(&package.version, &shared),
                    reason,
                )
            })
            .collect())
    }
}
