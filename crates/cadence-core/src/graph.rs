//! Workspace dependency graph and bump propagation.

use crate::errors::{CadenceError, Result};
use crate::types::{BumpKind, BumpReason, RangeUpdate, VersionBumpPlan, Workspace};
use crate::version::bump_version;
use semver::{Version, VersionReq};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::str::FromStr;
use tracing::debug;

/// How a dependent's declared range is rewritten when the dependency is bumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Keep the `^` / `~` / `workspace:` shape and move it to the new version.
    #[default]
    Preserve,
    /// Replace the range with the exact new version.
    Pin,
}

impl FromStr for RangePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "preserve" => Ok(Self::Preserve),
            "pin" => Ok(Self::Pin),
            other => Err(format!(
                "unknown range policy '{other}' (expected 'preserve' or 'pin')"
            )),
        }
    }
}

/// Edges between workspace packages, with the ranges they were declared with.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    versions: BTreeMap<String, Version>,
    /// package -> workspace dependency -> declared range
    ranges: BTreeMap<String, BTreeMap<String, String>>,
    /// dependency -> packages depending on it
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn from_workspace(workspace: &Workspace) -> Self {
        let mut graph = Self::default();
        for package in &workspace.members {
            graph
                .versions
                .insert(package.name.clone(), package.version.clone());
            let ranges = graph.ranges.entry(package.name.clone()).or_default();
            for (dep, range) in package.workspace_dependencies(workspace) {
                if dep == package.name {
                    continue;
                }
                ranges.insert(dep.to_string(), range.to_string());
                graph
                    .dependents
                    .entry(dep.to_string())
                    .or_default()
                    .insert(package.name.clone());
            }
        }
        graph
    }

    pub fn contains(&self, name: &str) -> bool {
        self.versions.contains_key(name)
    }

    /// Workspace packages `name` depends on.
    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.ranges
            .get(name)
            .into_iter()
            .flat_map(|deps| deps.keys().map(String::as_str))
    }

    /// Workspace packages that depend on `name`.
    pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(name)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Fails with a configuration error naming the packages caught in a cycle.
    pub fn ensure_acyclic(&self) -> Result<()> {
        let all: BTreeSet<String> = self.versions.keys().cloned().collect();
        self.topo_order(&all).map(|_| ())
    }

    /// Kahn ordering of `include`, dependencies before dependents.
    pub fn topo_order(&self, include: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut forward: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for name in include {
            indegree.insert(name.as_str(), 0);
            forward.entry(name.as_str()).or_default();
        }

        for name in include {
            for dep in self.dependencies_of(name) {
                if include.contains(dep) {
                    forward.entry(dep).or_default().push(name.as_str());
                    if let Some(d) = indegree.get_mut(name.as_str()) {
                        *d += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter_map(|(k, &d)| (d == 0).then_some(*k))
            .collect();
        let mut out: Vec<String> = Vec::with_capacity(include.len());

        while let Some(n) = queue.pop_front() {
            out.push(n.to_string());
            for &m in forward.get(n).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(m) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(m);
                    }
                }
            }
        }

        if out.len() != include.len() {
            let stuck: Vec<&str> = indegree
                .iter()
                .filter_map(|(k, &d)| (d > 0).then_some(*k))
                .collect();
            return Err(CadenceError::Configuration(format!(
                "dependency cycle detected among workspace packages: {}",
                stuck.join(", ")
            )));
        }
        Ok(out)
    }

    /// Complete `initial` with every package that transitively depends on a bumped one.
    ///
    /// Cascaded packages get a patch bump. Range updates are recomputed from the
    /// declared ranges on every call, so expanding an expanded set changes nothing.
    /// The result is in dependency order.
    pub fn expand(
        &self,
        initial: &[VersionBumpPlan],
        policy: RangePolicy,
    ) -> Result<Vec<VersionBumpPlan>> {
        self.ensure_acyclic()?;

        let mut plans: BTreeMap<String, VersionBumpPlan> = BTreeMap::new();
        for plan in initial {
            if !self.contains(&plan.package) {
                return Err(CadenceError::Configuration(format!(
                    "cannot plan a release for '{}': not a workspace package",
                    plan.package
                )));
            }
            plans.insert(plan.package.clone(), plan.clone());
        }

        let mut queue: VecDeque<String> = plans.keys().cloned().collect();
        while let Some(bumped) = queue.pop_front() {
            for dependent in self.dependents_of(&bumped) {
                if plans.contains_key(dependent) {
                    continue;
                }
                let Some(current) = self.versions.get(dependent) else {
                    continue;
                };
                debug!(package = %dependent, dependency = %bumped, "cascading bump");
                plans.insert(
                    dependent.to_string(),
                    VersionBumpPlan::new(
                        dependent,
                        current.clone(),
                        bump_version(current, BumpKind::Patch),
                        BumpKind::Patch,
                        BumpReason::Cascaded {
                            dependency: bumped.clone(),
                        },
                    ),
                );
                queue.push_back(dependent.to_string());
            }
        }

        let new_versions: BTreeMap<String, Version> = plans
            .iter()
            .map(|(name, plan)| (name.clone(), plan.to_version.clone()))
            .collect();
        for (name, plan) in plans.iter_mut() {
            plan.range_updates = self.range_updates(name, &new_versions, policy);
        }

        let names: BTreeSet<String> = plans.keys().cloned().collect();
        let order = self.topo_order(&names)?;
        Ok(order
            .into_iter()
            .filter_map(|name| plans.remove(&name))
            .collect())
    }

    fn range_updates(
        &self,
        package: &str,
        new_versions: &BTreeMap<String, Version>,
        policy: RangePolicy,
    ) -> Vec<RangeUpdate> {
        let Some(ranges) = self.ranges.get(package) else {
            return Vec::new();
        };
        ranges
            .iter()
            .filter_map(|(dep, range)| {
                let new_version = new_versions.get(dep)?;
                let to_range = update_range(range, new_version, policy)?;
                Some(RangeUpdate {
                    dependency: dep.clone(),
                    from_range: range.clone(),
                    to_range,
                    new_version: new_version.clone(),
                })
            })
            .collect()
    }
}

/// Rewrite `range` so it accepts `new_version`, or `None` when it should stay as written.
///
/// Protocol specifiers (`file:`, `link:`, `git:`, URLs...) and `*` are never touched.
/// Under [`RangePolicy::Preserve`] caret and tilde prefixes are kept and a
/// comparator range that already matches the new version is left alone. npm
/// comparator sets (`>=1.0.0 <2.0.0`), hyphen ranges and `||` alternatives count
/// as matching when any alternative does.
pub fn update_range(range: &str, new_version: &Version, policy: RangePolicy) -> Option<String> {
    let new_version_str = new_version.to_string();
    let trimmed = range.trim();
    if trimmed.is_empty() {
        return Some(new_version_str);
    }

    if let Some(suffix) = trimmed.strip_prefix("workspace:") {
        let rewritten = match (suffix, policy) {
            ("*", _) => return None,
            (_, RangePolicy::Pin) => format!("workspace:{new_version_str}"),
            (s, RangePolicy::Preserve) if s.starts_with('^') => {
                format!("workspace:^{new_version_str}")
            }
            (s, RangePolicy::Preserve) if s.starts_with('~') => {
                format!("workspace:~{new_version_str}")
            }
            (_, RangePolicy::Preserve) => format!("workspace:{new_version_str}"),
        };
        return (rewritten != trimmed).then_some(rewritten);
    }

    if matches!(trimmed, "*" | "x" | "latest") {
        return None;
    }

    const PROTOCOLS: [&str; 8] = [
        "file:", "link:", "npm:", "git:", "git+", "http:", "https:", "github:",
    ];
    if PROTOCOLS.iter().any(|p| trimmed.starts_with(p)) {
        return None;
    }

    let rewritten = match policy {
        RangePolicy::Pin => new_version_str,
        RangePolicy::Preserve => {
            if is_compound(trimmed) {
                if npm_range_matches(trimmed, new_version) == Some(true) {
                    return None;
                }
                format!("^{new_version_str}")
            } else if trimmed.starts_with('^') {
                format!("^{new_version_str}")
            } else if trimmed.starts_with('~') {
                format!("~{new_version_str}")
            } else if Version::parse(trimmed).is_ok() {
                new_version_str
            } else {
                match VersionReq::parse(trimmed) {
                    Ok(req) if req.matches(new_version) => return None,
                    _ => format!("^{new_version_str}"),
                }
            }
        }
    };
    (rewritten != trimmed).then_some(rewritten)
}

fn is_compound(range: &str) -> bool {
    range.contains("||") || range.contains(char::is_whitespace) || range.contains(',')
}

/// Whether an npm range accepts `version`. `None` when an alternative can't be parsed.
fn npm_range_matches(range: &str, version: &Version) -> Option<bool> {
    let mut matched = false;
    for alternative in range.split("||") {
        let req = comparator_set(alternative.trim())?;
        matched |= req.matches(version);
    }
    Some(matched)
}

/// Converts one npm comparator set into a [`VersionReq`].
fn comparator_set(set: &str) -> Option<VersionReq> {
    if set.is_empty() || matches!(set, "*" | "x" | "X") {
        return Some(VersionReq::STAR);
    }

    let tokens: Vec<&str> = set
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    // `1.0.0 - 2.0.0`
    if let [low, "-", high] = tokens.as_slice() {
        return VersionReq::parse(&format!(">={low}, <={high}")).ok();
    }

    // Operators may be separated from their version (`>= 1.0.0`).
    let mut comparators = Vec::new();
    let mut pending_op = String::new();
    for token in tokens {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~')) {
            pending_op.push_str(token);
            continue;
        }
        let op = std::mem::take(&mut pending_op);
        // A bare npm version is exact, not caret.
        if op.is_empty() && Version::parse(token).is_ok() {
            comparators.push(format!("={token}"));
        } else {
            comparators.push(format!("{op}{token}"));
        }
    }
    if !pending_op.is_empty() {
        return None;
    }
    VersionReq::parse(&comparators.join(", ")).ok()
}
