//! The release pipeline.
//!
//! A run plans every affected package, then walks them in dependency order.
//! Each package goes through its own state machine:
//!
//! ```text
//! Pending -> Validated -> VersionComputed -> ChangelogWritten
//!         -> Committed -> Tagged -> Pushed -> Published -> Done
//! ```
//!
//! Nothing is mutated before `Committed`. A failure at `Committed` or `Tagged`
//! is rolled back (files restored, commit soft-reset). `Pushed` and `Published`
//! failures are never rolled back: they surface as
//! [`CadenceError::PartialFailure`] with the residue left behind.

use crate::adapters::{ChangelogStore, ManifestStore, PushOptions, Registry, VersionControl};
use crate::changelog::ChangelogSynthesizer;
use crate::checks::{CheckOutcome, CheckReport, CheckSelection, Validator};
use crate::commits::{Commit, CommitFilter, CommitHistory};
use crate::config::Config;
use crate::errors::{CadenceError, Result};
use crate::filters::filter_members;
use crate::git;
use crate::graph::DependencyGraph;
use crate::manifest::update_manifest;
use crate::markdown::short_hash;
use crate::types::{DependencyUpdate, Package, VersionBumpPlan, Workspace};
use crate::version::VersionResolver;
use chrono::NaiveDate;
use semver::Version;
use similar::TextDiff;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-invocation inputs, separate from the file configuration.
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    pub dry_run: bool,
    /// Replace existing tags instead of failing.
    pub force: bool,
    pub overrides: BTreeMap<String, Version>,
    /// Packages to release; empty means every package with relevant commits.
    pub targets: Vec<String>,
    /// Date written into changelog headings.
    pub date: NaiveDate,
    /// Check flags layered over `[checks]`.
    pub checks: CheckSelection,
}

impl ReleaseOptions {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            dry_run: false,
            force: false,
            overrides: BTreeMap::new(),
            targets: Vec::new(),
            date,
            checks: CheckSelection::default(),
        }
    }

    pub fn mode(&self) -> ReleaseMode {
        if self.dry_run {
            ReleaseMode::DryRun
        } else {
            ReleaseMode::Live
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    DryRun,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReleaseStep {
    Pending,
    Validated,
    VersionComputed,
    ChangelogWritten,
    Committed,
    Tagged,
    Pushed,
    Published,
    Done,
}

impl fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Validated => "validate",
            Self::VersionComputed => "version",
            Self::ChangelogWritten => "changelog",
            Self::Committed => "commit",
            Self::Tagged => "tag",
            Self::Pushed => "push",
            Self::Published => "publish",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a live run would have done for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    pub package: String,
    pub from_version: Version,
    pub to_version: Version,
    pub tag: String,
    pub commit_message: String,
    pub would_push: bool,
    pub would_publish: bool,
    /// Whether an existing tag would be replaced (`force`).
    pub replaces_tag: bool,
    pub manifest_diff: String,
    pub changelog_diff: String,
    /// Tarball contents, when the package would be published.
    pub pack_files: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedPackage {
    pub package: String,
    pub version: Version,
    pub tag: String,
    pub commit: String,
    pub pushed: bool,
    pub published: bool,
    pub warnings: Vec<String>,
}

/// Result of one package's state machine. The variant is fixed by the
/// [`ReleaseMode`] chosen at the start of the run.
#[derive(Debug)]
pub enum PackageOutcome {
    DryRun(DryRunReport),
    Released(ReleasedPackage),
    Failed {
        package: String,
        /// The step that failed.
        step: ReleaseStep,
        error: CadenceError,
    },
}

impl PackageOutcome {
    pub fn package(&self) -> &str {
        match self {
            Self::DryRun(report) => &report.package,
            Self::Released(released) => &released.package,
            Self::Failed { package, .. } => package,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug)]
pub struct ReleaseSummary {
    pub mode: ReleaseMode,
    pub plans: Vec<VersionBumpPlan>,
    pub checks: Vec<CheckReport>,
    /// One outcome per plan, in release order.
    pub outcomes: Vec<PackageOutcome>,
}

impl ReleaseSummary {
    pub fn failures(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome(&self, package: &str) -> Option<&PackageOutcome> {
        self.outcomes.iter().find(|o| o.package() == package)
    }
}

/// The full set of version changes for a run.
#[derive(Debug, Clone)]
pub struct ReleasePlan {
    /// Members left after ignore filters.
    pub workspace: Workspace,
    /// Expanded plans, dependencies before dependents.
    pub plans: Vec<VersionBumpPlan>,
    /// Commits that matched each targeted package since its last release.
    pub history: BTreeMap<String, Vec<Commit>>,
}

impl ReleasePlan {
    pub fn plan_for(&self, package: &str) -> Option<&VersionBumpPlan> {
        self.plans.iter().find(|p| p.package == package)
    }
}

/// Result of `validate` on its own: every check, plus changelog problems per package.
#[derive(Debug)]
pub struct ValidationSummary {
    pub checks: Vec<CheckReport>,
    pub changelog_problems: BTreeMap<String, Vec<String>>,
}

impl ValidationSummary {
    pub fn is_success(&self) -> bool {
        !self.checks.iter().any(CheckReport::is_failure)
            && self.changelog_problems.values().all(Vec::is_empty)
    }
}

#[derive(Debug)]
pub enum PublishStatus {
    Published,
    AlreadyPublished,
    Private,
    Failed(CadenceError),
}

#[derive(Debug)]
pub struct PublishResult {
    pub package: String,
    pub version: Version,
    pub status: PublishStatus,
}

/// Everything a package release produces before touching the repository.
struct PreparedRelease {
    package: Package,
    plan: VersionBumpPlan,
    manifest_path: PathBuf,
    /// Workspace-relative paths for reports.
    manifest_label: String,
    changelog_label: String,
    original_manifest: String,
    manifest: String,
    changelog_path: PathBuf,
    original_changelog: Option<String>,
    changelog: String,
    tag: String,
    tag_taken: bool,
    commit_message: String,
    will_publish: bool,
    warnings: Vec<String>,
}

/// What a failed package left behind, for rollback and reporting.
struct Residue {
    previous_head: String,
    committed: bool,
    commit: Option<String>,
    tag: Option<String>,
    /// An existing tag deleted to make room for the release tag, with its old target.
    replaced_tag: Option<(String, String)>,
}

/// Adapters and configuration for one run. The working directory is whatever
/// the adapters were built with; nothing here reads process state.
pub struct ReleaseContext<'a, G, R, M, C> {
    git: &'a G,
    registry: &'a R,
    manifests: &'a M,
    changelogs: &'a C,
    config: &'a Config,
}

impl<'a, G, R, M, C> ReleaseContext<'a, G, R, M, C>
where
    G: VersionControl,
    R: Registry,
    M: ManifestStore,
    C: ChangelogStore,
{
    pub fn new(
        git: &'a G,
        registry: &'a R,
        manifests: &'a M,
        changelogs: &'a C,
        config: &'a Config,
    ) -> Self {
        Self {
            git,
            registry,
            manifests,
            changelogs,
            config,
        }
    }

    /// Workspace members, minus ignored packages.
    pub fn load_workspace(&self, root: &Path) -> Result<Workspace> {
        let workspace = Workspace {
            root: root.to_path_buf(),
            members: self.manifests.list_workspace_packages()?,
        };
        Ok(filter_members(&workspace, &self.config.ignore))
    }

    /// Reads history, resolves versions and expands them over the graph.
    pub async fn plan(&self, root: &Path, options: &ReleaseOptions) -> Result<ReleasePlan> {
        let workspace = self.load_workspace(root)?;
        for target in &options.targets {
            if workspace.find(target).is_none() {
                return Err(CadenceError::Configuration(format!(
                    "unknown or ignored package '{target}'"
                )));
            }
        }

        let reader = CommitHistory::new(self.git);
        let mut history = BTreeMap::new();
        for package in &workspace.members {
            if !options.targets.is_empty() && !options.targets.contains(&package.name) {
                continue;
            }
            let tag = reader.latest_tag(&package.name, &self.config.git).await?;
            let commits = reader
                .commits_since(tag.as_deref(), &CommitFilter::for_package(package))
                .await?;
            debug!(
                package = %package.name,
                since = tag.as_deref().unwrap_or("<none>"),
                commits = commits.len(),
                "read history"
            );
            history.insert(package.name.clone(), commits);
        }

        let resolver = VersionResolver::new(self.config.strategy, options.overrides.clone());
        let initial = resolver.resolve(&workspace, &history)?;
        let graph = DependencyGraph::from_workspace(&workspace);
        let plans = graph.expand(&initial, self.config.range_policy)?;
        info!(planned = plans.len(), "release plan ready");

        Ok(ReleasePlan {
            workspace,
            plans,
            history,
        })
    }

    /// Runs the pipeline for every planned package.
    ///
    /// Workspace-wide check failures abort the run before any package starts.
    pub async fn release(&self, root: &Path, options: &ReleaseOptions) -> Result<ReleaseSummary> {
        let plan = self.plan(root, options).await?;
        let mode = options.mode();
        let selection = self.config.checks.overridden_by(&options.checks);
        let validator = Validator::new(self.git, self.registry, self.config, selection);

        let publishing = self.config.registry.publish
            && plan.plans.iter().any(|p| {
                plan.workspace
                    .find(&p.package)
                    .is_some_and(|pkg| !pkg.private)
            });
        let mut checks = validator.workspace_checks(publishing).await;
        if let Some(pos) = checks.iter().position(CheckReport::is_failure)
            && let CheckOutcome::Failed(err) = checks.swap_remove(pos).outcome
        {
            return Err(err);
        }

        let graph = DependencyGraph::from_workspace(&plan.workspace);
        let mut failed: BTreeSet<String> = BTreeSet::new();
        let mut outcomes = Vec::with_capacity(plan.plans.len());

        for bump in &plan.plans {
            let outcome = match graph
                .dependencies_of(&bump.package)
                .find(|dep| failed.contains(*dep))
            {
                Some(dependency) => PackageOutcome::Failed {
                    package: bump.package.clone(),
                    step: ReleaseStep::Pending,
                    error: CadenceError::DependencyFailed {
                        package: bump.package.clone(),
                        dependency: dependency.to_string(),
                    },
                },
                None => self.release_package(&plan, bump, &validator, options).await,
            };

            match &outcome {
                PackageOutcome::Failed {
                    package,
                    step,
                    error,
                } => {
                    warn!(%package, %step, error = %error, "release failed");
                    failed.insert(package.clone());
                }
                PackageOutcome::Released(released) => {
                    info!(package = %released.package, version = %released.version, "released");
                }
                PackageOutcome::DryRun(report) => {
                    debug!(package = %report.package, tag = %report.tag, "dry run projected");
                }
            }
            outcomes.push(outcome);
        }

        Ok(ReleaseSummary {
            mode,
            plans: plan.plans,
            checks,
            outcomes,
        })
    }

    /// Runs every check and validates changelogs, without planning a release.
    pub async fn validate(
        &self,
        root: &Path,
        options: &ReleaseOptions,
    ) -> Result<ValidationSummary> {
        let plan = self.plan(root, options).await?;
        let selection = self.config.checks.overridden_by(&options.checks);
        let validator = Validator::new(self.git, self.registry, self.config, selection);

        let publishing = self.config.registry.publish;
        let mut checks = validator.workspace_checks(publishing).await;
        let mut changelog_problems = BTreeMap::new();
        for bump in &plan.plans {
            let Some(package) = plan.workspace.find(&bump.package) else {
                continue;
            };
            checks.extend(validator.package_checks(package, bump).await);
            let path = package.path.join(&self.config.changelog.file);
            let content = self.changelogs.read(&path)?;
            let synthesizer = self.synthesizer_for(package);
            changelog_problems.insert(
                package.name.clone(),
                synthesizer.validate(content.as_deref(), self.config.changelog.required),
            );
        }
        Ok(ValidationSummary {
            checks,
            changelog_problems,
        })
    }

    /// Renders the next changelog section of `package` without writing it.
    /// With `unreleased_only`, returns the pending Unreleased notes instead.
    pub async fn preview_changelog(
        &self,
        root: &Path,
        package: &str,
        options: &ReleaseOptions,
        unreleased_only: bool,
    ) -> Result<String> {
        let plan = self.plan(root, options).await?;
        let member = plan
            .workspace
            .find(package)
            .ok_or_else(|| CadenceError::NotFound(format!("package '{package}'")))?;
        let synthesizer = self.synthesizer_for(member);
        let existing = self
            .changelogs
            .read(&member.path.join(&self.config.changelog.file))?
            .unwrap_or_default();
        let unreleased = synthesizer.extract_unreleased(&existing);
        if unreleased_only {
            return Ok(unreleased.join("\n"));
        }

        let bump = plan.plan_for(package).ok_or_else(|| {
            CadenceError::Changelog(format!("{package} has no changes to release"))
        })?;
        let commits = plan.history.get(package).map(Vec::as_slice).unwrap_or(&[]);
        let entry = synthesizer.entry(
            &bump.to_version,
            options.date,
            commits,
            &dependency_updates(bump),
            &unreleased,
        );
        Ok(synthesizer.render(&entry))
    }

    /// Publishes packages whose release commit and tag already exist, e.g. after
    /// a publish failure. Versions already on the registry are skipped.
    pub async fn publish_only(&self, root: &Path, packages: &[String]) -> Result<Vec<PublishResult>> {
        let workspace = self.load_workspace(root)?;
        let graph = DependencyGraph::from_workspace(&workspace);
        let wanted: BTreeSet<String> = if packages.is_empty() {
            workspace.members.iter().map(|p| p.name.clone()).collect()
        } else {
            for name in packages {
                if workspace.find(name).is_none() {
                    return Err(CadenceError::NotFound(format!("package '{name}'")));
                }
            }
            packages.iter().cloned().collect()
        };

        let mut results = Vec::new();
        for name in graph.topo_order(&wanted)? {
            let Some(package) = workspace.find(&name) else {
                continue;
            };
            let status = if package.private {
                PublishStatus::Private
            } else {
                self.publish_if_new(package).await
            };
            if let PublishStatus::Failed(err) = &status {
                warn!(package = %name, error = %err, "publish failed");
            }
            results.push(PublishResult {
                package: name.clone(),
                version: package.version.clone(),
                status,
            });
        }
        Ok(results)
    }

    async fn publish_if_new(&self, package: &Package) -> PublishStatus {
        match self
            .registry
            .latest_version(&package.name, &self.config.registry)
            .await
        {
            Ok(Some(latest)) if latest >= package.version => return PublishStatus::AlreadyPublished,
            Ok(_) => {}
            Err(err) => return PublishStatus::Failed(err),
        }
        match self.registry.publish(package, &self.config.registry).await {
            Ok(()) => PublishStatus::Published,
            Err(err) => PublishStatus::Failed(err),
        }
    }

    fn synthesizer_for(&self, package: &Package) -> ChangelogSynthesizer {
        ChangelogSynthesizer::new(
            self.config.changelog.format_for(&package.name),
            package.name.clone(),
        )
    }

    async fn release_package(
        &self,
        plan: &ReleasePlan,
        bump: &VersionBumpPlan,
        validator: &Validator<'_, G, R>,
        options: &ReleaseOptions,
    ) -> PackageOutcome {
        let failed = |step, error| PackageOutcome::Failed {
            package: bump.package.clone(),
            step,
            error,
        };
        let Some(package) = plan.workspace.find(&bump.package) else {
            return failed(
                ReleaseStep::Pending,
                CadenceError::NotFound(format!("package '{}'", bump.package)),
            );
        };

        let mut warnings = Vec::new();
        for report in validator.package_checks(package, bump).await {
            match report.outcome {
                CheckOutcome::Failed(err) => return failed(ReleaseStep::Validated, err),
                CheckOutcome::Warning(w) => warnings.push(format!("{}: {w}", report.check)),
                CheckOutcome::Passed | CheckOutcome::Skipped(_) => {}
            }
        }

        let prepared = match self.prepare(plan, package, bump, options, warnings).await {
            Ok(prepared) => prepared,
            Err((step, err)) => return failed(step, err),
        };

        if prepared.tag_taken && !(options.force || self.config.git.force) {
            return failed(
                ReleaseStep::Tagged,
                CadenceError::tag_exists(&prepared.tag, &self.config.git.remote),
            );
        }

        match options.mode() {
            ReleaseMode::DryRun => PackageOutcome::DryRun(self.project(prepared).await),
            ReleaseMode::Live => match self.apply(prepared).await {
                Ok(released) => PackageOutcome::Released(released),
                Err((step, err)) => failed(step, err),
            },
        }
    }

    /// Computes the new manifest and changelog in memory.
    async fn prepare(
        &self,
        plan: &ReleasePlan,
        package: &Package,
        bump: &VersionBumpPlan,
        options: &ReleaseOptions,
        mut warnings: Vec<String>,
    ) -> std::result::Result<PreparedRelease, (ReleaseStep, CadenceError)> {
        let manifest_path = package.manifest_path();
        let original_manifest = self
            .manifests
            .read_package_json(&manifest_path)
            .map_err(|e| (ReleaseStep::VersionComputed, e))?;
        let manifest = update_manifest(
            &manifest_path,
            &original_manifest,
            Some(&bump.to_version),
            &bump.range_updates,
        )
        .map_err(|e| (ReleaseStep::VersionComputed, e))?;

        let synthesizer = self.synthesizer_for(package);
        let changelog_path = package.path.join(&self.config.changelog.file);
        let original_changelog = self
            .changelogs
            .read(&changelog_path)
            .map_err(|e| (ReleaseStep::ChangelogWritten, e))?;
        let problems =
            synthesizer.validate(original_changelog.as_deref(), self.config.changelog.required);
        if !problems.is_empty() {
            if self.config.changelog.required {
                return Err((
                    ReleaseStep::Validated,
                    CadenceError::validation(
                        "changelog",
                        format!("{}: {}", changelog_path.display(), problems.join("; ")),
                        "fix the changelog or set changelog.required = false",
                    ),
                ));
            }
            warnings.push(format!("changelog: {}", problems.join("; ")));
        }

        let existing = original_changelog.as_deref().unwrap_or_default();
        let unreleased = synthesizer.extract_unreleased(existing);
        let commits = plan
            .history
            .get(&package.name)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let entry = synthesizer.entry(
            &bump.to_version,
            options.date,
            commits,
            &dependency_updates(bump),
            &unreleased,
        );
        let changelog = synthesizer.merge(&synthesizer.clear_unreleased(existing), &entry);

        let version = bump.to_version.to_string();
        let tag = self.config.git.tag_name(&package.name, &version);
        let tag_taken = git::tag_exists(self.git, &tag)
            .await
            .map_err(|e| (ReleaseStep::Tagged, e))?;

        Ok(PreparedRelease {
            package: package.clone(),
            plan: bump.clone(),
            manifest_label: display_path(&plan.workspace.root, &manifest_path),
            changelog_label: display_path(&plan.workspace.root, &changelog_path),
            manifest_path,
            original_manifest,
            manifest,
            changelog_path,
            original_changelog,
            changelog,
            commit_message: self.config.git.commit_message(&package.name, &version),
            tag,
            tag_taken,
            will_publish: self.config.registry.publish && !package.private,
            warnings,
        })
    }

    async fn project(&self, prepared: PreparedRelease) -> DryRunReport {
        let mut warnings = prepared.warnings;
        let pack_files = if prepared.will_publish {
            self.registry
                .pack(&prepared.package)
                .await
                .unwrap_or_else(|err| {
                    warnings.push(format!("pack: {err}"));
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        DryRunReport {
            package: prepared.package.name,
            from_version: prepared.plan.from_version,
            to_version: prepared.plan.to_version,
            tag: prepared.tag,
            commit_message: prepared.commit_message,
            would_push: self.config.git.push,
            would_publish: prepared.will_publish,
            replaces_tag: prepared.tag_taken,
            manifest_diff: unified_diff(
                &prepared.manifest_label,
                &prepared.original_manifest,
                &prepared.manifest,
            ),
            changelog_diff: unified_diff(
                &prepared.changelog_label,
                prepared.original_changelog.as_deref().unwrap_or_default(),
                &prepared.changelog,
            ),
            pack_files,
            warnings,
        }
    }

    /// Commits, tags, pushes and publishes one prepared release.
    async fn apply(
        &self,
        prepared: PreparedRelease,
    ) -> std::result::Result<ReleasedPackage, (ReleaseStep, CadenceError)> {
        let name = prepared.package.name.clone();
        let previous_head = git::head_commit(self.git)
            .await
            .map_err(|e| (ReleaseStep::Committed, e))?;
        let mut residue = Residue {
            previous_head,
            committed: false,
            commit: None,
            tag: None,
            replaced_tag: None,
        };

        // Committed
        if let Err(err) = self.commit(&prepared).await {
            return Err((
                ReleaseStep::Committed,
                self.roll_back(&prepared, &residue, err).await,
            ));
        }
        residue.committed = true;
        let commit = match git::head_commit(self.git).await {
            Ok(hash) => hash,
            Err(err) => {
                return Err((
                    ReleaseStep::Committed,
                    self.roll_back(&prepared, &residue, err).await,
                ));
            }
        };
        info!(package = %name, commit = short_hash(&commit), "release commit created");
        residue.commit = Some(commit.clone());

        // Tagged
        if let Err(err) = self.tag(&prepared, &mut residue).await {
            return Err((
                ReleaseStep::Tagged,
                self.roll_back(&prepared, &residue, err).await,
            ));
        }
        residue.tag = Some(prepared.tag.clone());

        // Pushed
        let pushed = if self.config.git.push {
            if let Err(err) = self.push().await {
                return Err((
                    ReleaseStep::Pushed,
                    self.partial_failure(
                        &name,
                        &residue,
                        false,
                        err,
                        format!(
                            "push manually with `git push --follow-tags {}`, then run `cadence publish {name}`",
                            self.config.git.remote
                        ),
                    ),
                ));
            }
            true
        } else {
            false
        };

        // Published
        let published = if prepared.will_publish {
            let mut released = prepared.package.clone();
            released.version = prepared.plan.to_version.clone();
            if let Err(err) = self.registry.publish(&released, &self.config.registry).await {
                return Err((
                    ReleaseStep::Published,
                    self.partial_failure(
                        &name,
                        &residue,
                        pushed,
                        err,
                        format!("retry with `cadence publish {name}`"),
                    ),
                ));
            }
            true
        } else {
            false
        };

        Ok(ReleasedPackage {
            package: name,
            version: prepared.plan.to_version,
            tag: prepared.tag,
            commit,
            pushed,
            published,
            warnings: prepared.warnings,
        })
    }

    async fn commit(&self, prepared: &PreparedRelease) -> Result<()> {
        self.manifests
            .write_package_json(&prepared.manifest_path, &prepared.manifest)?;
        self.changelogs
            .write(&prepared.changelog_path, &prepared.changelog)?;

        let manifest = prepared.manifest_path.to_string_lossy();
        let changelog = prepared.changelog_path.to_string_lossy();
        self.git.raw(&["add", &*manifest, &*changelog]).await?;
        self.git.commit(&prepared.commit_message).await
    }

    async fn tag(&self, prepared: &PreparedRelease, residue: &mut Residue) -> Result<()> {
        if prepared.tag_taken {
            let target = git::tag_target(self.git, &prepared.tag).await?;
            info!(tag = %prepared.tag, target = short_hash(&target), "replacing existing tag");
            git::delete_tag(self.git, &prepared.tag, &self.config.git.remote).await?;
            residue.replaced_tag = Some((prepared.tag.clone(), target));
        }
        let message = format!(
            "Release {}@{}",
            prepared.package.name, prepared.plan.to_version
        );
        self.git.add_annotated_tag(&prepared.tag, &message).await
    }

    async fn push(&self) -> Result<()> {
        let branch = git::current_branch(self.git).await?;
        let set_upstream = git::upstream(self.git).await.is_none();
        self.git
            .push(
                &self.config.git.remote,
                &branch,
                PushOptions {
                    follow_tags: true,
                    set_upstream,
                },
            )
            .await
    }

    /// Undoes a failed commit or tag step. Returns the error to report: the
    /// original cause, or a partial failure if the rollback itself failed or a
    /// tag was deleted to make room for the release tag.
    async fn roll_back(
        &self,
        prepared: &PreparedRelease,
        residue: &Residue,
        cause: CadenceError,
    ) -> CadenceError {
        let mut leftovers = Vec::new();
        let mut hints = Vec::new();

        if residue.committed
            && let Err(err) = self.git.reset_soft(&residue.previous_head).await
        {
            warn!(error = %err, "could not reset the release commit");
            leftovers.push(format!(
                "release commit on top of {}",
                short_hash(&residue.previous_head)
            ));
        }

        if let Err(err) = self
            .manifests
            .write_package_json(&prepared.manifest_path, &prepared.original_manifest)
        {
            leftovers.push(format!(
                "{} modified ({err})",
                prepared.manifest_path.display()
            ));
        }
        let restored = match &prepared.original_changelog {
            Some(text) => self.changelogs.write(&prepared.changelog_path, text),
            None => self.changelogs.remove(&prepared.changelog_path),
        };
        if let Err(err) = restored {
            leftovers.push(format!(
                "{} modified ({err})",
                prepared.changelog_path.display()
            ));
        }

        let manifest = prepared.manifest_path.to_string_lossy();
        let changelog = prepared.changelog_path.to_string_lossy();
        if let Err(err) = self
            .git
            .raw(&["reset", "-q", "--", &*manifest, &*changelog])
            .await
        {
            debug!(error = %err, "could not unstage release files");
        }

        if !leftovers.is_empty() {
            hints.push(format!(
                "restore the working tree with `git reset --hard {}`",
                short_hash(&residue.previous_head)
            ));
        }
        if let Some((tag, target)) = &residue.replaced_tag {
            leftovers.push(format!(
                "tag {tag} deleted (was at {})",
                short_hash(target)
            ));
            hints.push(format!(
                "recreate it with `git tag {tag} {target}` and `git push {} {tag}`",
                self.config.git.remote
            ));
        }

        if leftovers.is_empty() {
            info!(package = %prepared.package.name, "rolled back");
            return cause;
        }
        CadenceError::PartialFailure {
            package: prepared.package.name.clone(),
            residue: leftovers,
            cause: Box::new(cause),
            hint: hints.join(", then "),
        }
    }

    fn partial_failure(
        &self,
        package: &str,
        residue: &Residue,
        pushed: bool,
        cause: CadenceError,
        hint: String,
    ) -> CadenceError {
        let mut state = Vec::new();
        if let Some(commit) = &residue.commit {
            state.push(format!("commit {} created", short_hash(commit)));
        }
        if let Some(tag) = &residue.tag {
            state.push(format!("tag {tag} created"));
        }
        state.push(if pushed {
            "pushed to the remote".to_string()
        } else {
            "nothing pushed".to_string()
        });
        CadenceError::PartialFailure {
            package: package.to_string(),
            residue: state,
            cause: Box::new(cause),
            hint,
        }
    }
}

fn dependency_updates(plan: &VersionBumpPlan) -> Vec<DependencyUpdate> {
    plan.range_updates
        .iter()
        .map(|update| DependencyUpdate {
            name: update.dependency.clone(),
            new_version: update.new_version.to_string(),
        })
        .collect()
}

fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn unified_diff(path: &str, before: &str, after: &str) -> String {
    if before == after {
        return String::new();
    }
    let diff = TextDiff::from_lines(before, after);
    let from = format!("a/{path}");
    let to = format!("b/{path}");
    diff.unified_diff().header(&from, &to).to_string()
}
