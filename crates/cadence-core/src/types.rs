use semver::Version;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// A workspace package as read from its `package.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    /// Absolute directory containing the manifest.
    pub path: PathBuf,
    /// Workspace-relative directory, `/`-separated (e.g. "packages/a"). Empty for the root.
    pub relative_path: String,
    pub version: Version,
    /// Every declared dependency (all dependency sections merged) mapped to its range.
    pub dependencies: BTreeMap<String, String>,
    /// `"private": true` packages are versioned and tagged but never published.
    pub private: bool,
}

impl Package {
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join("package.json")
    }

    /// Names of dependencies that are themselves members of `workspace`.
    pub fn workspace_dependencies<'a>(
        &'a self,
        workspace: &'a Workspace,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.dependencies
            .iter()
            .filter(|(name, _)| workspace.is_workspace_dependency(name))
            .map(|(name, range)| (name.as_str(), range.as_str()))
    }
}

/// Represents a workspace with its package members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub members: Vec<Package>,
}

impl Workspace {
    pub fn find(&self, name: &str) -> Option<&Package> {
        self.members.iter().find(|p| p.name == name)
    }

    /// A dependency is internal when a package of that name lives in this workspace.
    pub fn is_workspace_dependency(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.members.iter().map(|p| p.name.clone()).collect()
    }
}

/// Semantic version bump kinds, ordered by impact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum BumpKind {
    #[default]
    None,
    Patch,
    Minor,
    Major,
}

impl FromStr for BumpKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "patch" => Ok(Self::Patch),
            "minor" => Ok(Self::Minor),
            "major" => Ok(Self::Major),
            _ => Err(()),
        }
    }
}

impl BumpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

impl std::fmt::Display for BumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a package appears in the release plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BumpReason {
    /// Its own commits since the last release.
    DirectCommits,
    /// One of its workspace dependencies was bumped.
    Cascaded { dependency: String },
    /// The user supplied the version explicitly.
    Override,
    /// The fixed strategy moves every package to the shared version.
    Fixed,
}

impl std::fmt::Display for BumpReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectCommits => f.write_str("direct commits"),
            Self::Cascaded { dependency } => write!(f, "cascaded from dependency {dependency}"),
            Self::Override => f.write_str("explicit version override"),
            Self::Fixed => f.write_str("fixed versioning strategy"),
        }
    }
}

/// A declared dependency range rewritten so that it accepts the dependency's new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeUpdate {
    pub dependency: String,
    pub from_range: String,
    pub to_range: String,
    pub new_version: Version,
}

/// One planned version change for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBumpPlan {
    pub package: String,
    pub from_version: Version,
    pub to_version: Version,
    pub bump: BumpKind,
    pub reason: BumpReason,
    /// Ranges of bumped workspace dependencies that this package must rewrite.
    pub range_updates: Vec<RangeUpdate>,
}

impl VersionBumpPlan {
    pub fn new(
        package: impl Into<String>,
        from_version: Version,
        to_version: Version,
        bump: BumpKind,
        reason: BumpReason,
    ) -> Self {
        Self {
            package: package.into(),
            from_version,
            to_version,
            bump,
            reason,
            range_updates: Vec::new(),
        }
    }

    pub fn is_cascaded(&self) -> bool {
        matches!(self.reason, BumpReason::Cascaded { .. })
    }
}

/// Information about a dependency update during release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyUpdate {
    pub name: String,
    pub new_version: String,
}

/// Format dependency updates for changelog display,
/// e.g. "Updated dependencies: pkg1@1.2.0, pkg2@2.0.0"
pub fn format_dependency_updates_message(updates: &[DependencyUpdate]) -> Option<String> {
    if updates.is_empty() {
        return None;
    }

    let dep_list = updates
        .iter()
        .map(|dep| format!("{}@{}", dep.name, dep.new_version))
        .collect::<Vec<_>>()
        .join(", ");

    Some(format!("Updated dependencies: {}", dep_list))
}
