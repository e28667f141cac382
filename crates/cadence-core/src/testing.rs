//! In-memory adapters for driving the planner and the pipeline without git,
//! npm or a filesystem. Every mutating call is recorded so tests can assert on
//! exactly what a run did.

use crate::adapters::{
    ChangelogStore, ManifestStore, OutdatedDependency, PushOptions, Registry, VersionControl,
};
use crate::commits::Commit;
use crate::config::RegistryConfig;
use crate::errors::{CadenceError, Result};
use crate::manifest::parse_package;
use crate::types::Package;
use rustc_hash::FxHashMap;
use semver::Version;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Operations a [`FakeGit`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GitOp {
    Status,
    Fetch,
    Add,
    Commit,
    Tag,
    DeleteTag,
    DeleteRemoteTag,
    Push,
    Reset,
    /// `rev-parse HEAD`.
    HeadCommit,
}

#[derive(Debug, Default)]
struct GitState {
    branch: String,
    head: String,
    commit_counter: u64,
    /// Newest first.
    history: Vec<Commit>,
    /// Tag name -> number of history entries newer than the tag.
    tags: BTreeMap<String, usize>,
    remote_tags: BTreeSet<String>,
    upstream: Option<String>,
    behind: u64,
    status: Vec<String>,
    failures: BTreeSet<GitOp>,
    /// Failures that switch on once a commit succeeds.
    armed: BTreeSet<GitOp>,
    mutations: Vec<String>,
}

/// Scriptable [`VersionControl`] double.
#[derive(Debug)]
pub struct FakeGit {
    state: RefCell<GitState>,
}

impl Default for FakeGit {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGit {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(GitState {
                branch: "main".into(),
                head: format!("{:040x}", 1),
                commit_counter: 1,
                upstream: Some("origin/main".into()),
                ..GitState::default()
            }),
        }
    }

    /// Adds a commit on top of history.
    pub fn with_commit(self, subject: &str, files: &[&str]) -> Self {
        self.with_commit_body(subject, "", files)
    }

    pub fn with_commit_body(self, subject: &str, body: &str, files: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.commit_counter += 1;
            let hash = format!("{:040x}", state.commit_counter);
            state.head = hash.clone();
            state
                .history
                .insert(0, Commit::synthetic(&hash, subject, body, files));
            for newer in state.tags.values_mut() {
                *newer += 1;
            }
        }
        self
    }

    /// Tags the current HEAD, locally and on the remote.
    pub fn with_tag(self, name: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.tags.insert(name.to_string(), 0);
            state.remote_tags.insert(name.to_string());
        }
        self
    }

    pub fn with_branch(self, branch: &str) -> Self {
        self.state.borrow_mut().branch = branch.to_string();
        self
    }

    pub fn with_upstream(self, upstream: Option<&str>, behind: u64) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.upstream = upstream.map(str::to_string);
            state.behind = behind;
        }
        self
    }

    pub fn with_dirty_file(self, line: &str) -> Self {
        self.state.borrow_mut().status.push(line.to_string());
        self
    }

    pub fn fail_on(&self, op: GitOp) {
        self.state.borrow_mut().failures.insert(op);
    }

    /// Makes `op` fail, but only after the next successful commit.
    pub fn fail_after_commit(&self, op: GitOp) {
        self.state.borrow_mut().armed.insert(op);
    }

    /// Every state-changing call, in order (e.g. `commit <msg>`, `tag a@1.0.1`).
    pub fn mutations(&self) -> Vec<String> {
        self.state.borrow().mutations.clone()
    }

    pub fn head(&self) -> String {
        self.state.borrow().head.clone()
    }

    pub fn local_tags(&self) -> Vec<String> {
        self.state.borrow().tags.keys().cloned().collect()
    }

    pub fn remote_tags(&self) -> Vec<String> {
        self.state.borrow().remote_tags.iter().cloned().collect()
    }

    fn check(&self, op: GitOp, command: &str) -> Result<()> {
        if self.state.borrow().failures.contains(&op) {
            return Err(CadenceError::external(
                format!("git {command}"),
                format!("simulated {op:?} failure"),
            ));
        }
        Ok(())
    }

    fn record(&self, entry: String) {
        self.state.borrow_mut().mutations.push(entry);
    }

    fn render_log(commits: &[Commit]) -> String {
        commits
            .iter()
            .map(|c| {
                format!(
                    "\u{1e}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}\n\n{}\n",
                    c.hash,
                    c.authored_date.to_rfc3339(),
                    c.subject,
                    c.body,
                    c.changed_files
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            })
            .collect()
    }
}

impl VersionControl for FakeGit {
    async fn status(&self) -> Result<Vec<String>> {
        self.check(GitOp::Status, "status")?;
        Ok(self.state.borrow().status.clone())
    }

    async fn fetch(&self, _remote: &str) -> Result<()> {
        self.check(GitOp::Fetch, "fetch")
    }

    async fn tags(&self) -> Result<Vec<String>> {
        Ok(self.local_tags())
    }

    async fn add_annotated_tag(&self, name: &str, _message: &str) -> Result<()> {
        self.check(GitOp::Tag, "tag")?;
        let mut state = self.state.borrow_mut();
        if state.tags.contains_key(name) {
            return Err(CadenceError::external(
                "git tag",
                format!("tag '{name}' already exists"),
            ));
        }
        state.tags.insert(name.to_string(), 0);
        state.mutations.push(format!("tag {name}"));
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.check(GitOp::Commit, "commit")?;
        let mut state = self.state.borrow_mut();
        state.commit_counter += 1;
        let hash = format!("{:040x}", state.commit_counter);
        state.head = hash.clone();
        state
            .history
            .insert(0, Commit::synthetic(&hash, message, "", &[]));
        for newer in state.tags.values_mut() {
            *newer += 1;
        }
        state.mutations.push(format!("commit {message}"));
        let armed = std::mem::take(&mut state.armed);
        state.failures.extend(armed);
        Ok(())
    }

    async fn push(&self, remote: &str, branch: &str, options: PushOptions) -> Result<()> {
        self.check(GitOp::Push, "push")?;
        let mut state = self.state.borrow_mut();
        if options.follow_tags {
            let local: Vec<String> = state.tags.keys().cloned().collect();
            state.remote_tags.extend(local);
        }
        if options.set_upstream {
            state.upstream = Some(format!("{remote}/{branch}"));
        }
        state.mutations.push(format!(
            "push {remote} {branch}{}{}",
            if options.follow_tags { " --follow-tags" } else { "" },
            if options.set_upstream { " --set-upstream" } else { "" },
        ));
        Ok(())
    }

    async fn raw(&self, args: &[&str]) -> Result<String> {
        match args {
            ["log", ..] => {
                let state = self.state.borrow();
                match args.iter().find(|a| a.contains("..")) {
                    None => Ok(Self::render_log(&state.history)),
                    Some(range) => {
                        let tag = range.split("..").next().unwrap_or_default();
                        let newer = state.tags.get(tag).copied().ok_or_else(|| {
                            CadenceError::external(
                                "git log",
                                format!("unknown revision '{tag}'"),
                            )
                        })?;
                        Ok(Self::render_log(&state.history[..newer]))
                    }
                }
            }
            ["rev-parse", "--abbrev-ref", "HEAD"] => Ok(format!("{}\n", self.state.borrow().branch)),
            ["rev-parse", "HEAD"] => {
                self.check(GitOp::HeadCommit, "rev-parse HEAD")?;
                Ok(format!("{}\n", self.state.borrow().head))
            }
            ["rev-parse", rev] if rev.ends_with("^{commit}") => {
                let tag = rev.trim_end_matches("^{commit}");
                let state = self.state.borrow();
                state
                    .tags
                    .get(tag)
                    .and_then(|newer| state.history.get(*newer))
                    .map(|commit| format!("{}\n", commit.hash))
                    .ok_or_else(|| {
                        CadenceError::external(
                            "git rev-parse",
                            format!("unknown revision '{rev}'"),
                        )
                    })
            }
            ["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"] => {
                self.state.borrow().upstream.clone().ok_or_else(|| {
                    CadenceError::external("git rev-parse", "no upstream configured")
                })
            }
            ["rev-list", "--count", _] => Ok(format!("{}\n", self.state.borrow().behind)),
            ["add", files @ ..] => {
                self.check(GitOp::Add, "add")?;
                self.record(format!("add {}", files.join(" ")));
                Ok(String::new())
            }
            ["tag", "-d", name] => {
                self.check(GitOp::DeleteTag, "tag -d")?;
                let mut state = self.state.borrow_mut();
                if state.tags.remove(*name).is_none() {
                    return Err(CadenceError::external(
                        "git tag -d",
                        format!("tag '{name}' not found"),
                    ));
                }
                state.mutations.push(format!("delete-tag {name}"));
                Ok(String::new())
            }
            ["push", _remote, "--delete", reference] => {
                self.check(GitOp::DeleteRemoteTag, "push --delete")?;
                let name = reference.trim_start_matches("refs/tags/");
                let mut state = self.state.borrow_mut();
                if !state.remote_tags.remove(name) {
                    return Err(CadenceError::external(
                        "git push --delete",
                        format!("remote ref does not exist: {reference}"),
                    ));
                }
                state.mutations.push(format!("delete-remote-tag {name}"));
                Ok(String::new())
            }
            _ => Ok(String::new()),
        }
    }

    async fn reset_soft(&self, hash: &str) -> Result<()> {
        self.check(GitOp::Reset, "reset")?;
        let mut state = self.state.borrow_mut();
        if let Some(pos) = state.history.iter().position(|c| c.hash == hash) {
            state.history.drain(..pos);
            for newer in state.tags.values_mut() {
                *newer = newer.saturating_sub(pos);
            }
        }
        state.head = hash.to_string();
        state.mutations.push(format!("reset --soft {hash}"));
        Ok(())
    }
}

/// Scriptable [`Registry`] double.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    latest: RefCell<FxHashMap<String, Version>>,
    auth_ok: Cell<bool>,
    failing_publish: RefCell<BTreeSet<String>>,
    outdated: RefCell<FxHashMap<String, Vec<OutdatedDependency>>>,
    published: RefCell<Vec<String>>,
    calls: RefCell<Vec<String>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        let registry = Self::default();
        registry.auth_ok.set(true);
        registry
    }

    pub fn with_latest(self, name: &str, version: &str) -> Self {
        if let Ok(version) = Version::parse(version) {
            self.latest.borrow_mut().insert(name.to_string(), version);
        }
        self
    }

    pub fn with_outdated(self, package: &str, dependency: &str, current: &str, latest: &str) -> Self {
        self.outdated
            .borrow_mut()
            .entry(package.to_string())
            .or_default()
            .push(OutdatedDependency {
                name: dependency.to_string(),
                current: current.to_string(),
                latest: latest.to_string(),
            });
        self
    }

    pub fn deny_auth(&self) {
        self.auth_ok.set(false);
    }

    pub fn fail_publish(&self, package: &str) {
        self.failing_publish.borrow_mut().insert(package.to_string());
    }

    pub fn allow_publish(&self, package: &str) {
        self.failing_publish.borrow_mut().remove(package);
    }

    /// `name@version` of every successful publish, in order.
    pub fn published(&self) -> Vec<String> {
        self.published.borrow().clone()
    }

    /// Every call made, including read-only ones.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Registry for FakeRegistry {
    async fn validate_auth(&self, _config: &RegistryConfig) -> Result<()> {
        self.calls.borrow_mut().push("validate_auth".into());
        if self.auth_ok.get() {
            Ok(())
        } else {
            Err(CadenceError::external("npm whoami", "ENEEDAUTH"))
        }
    }

    async fn latest_version(
        &self,
        name: &str,
        _config: &RegistryConfig,
    ) -> Result<Option<Version>> {
        self.calls.borrow_mut().push(format!("latest_version {name}"));
        Ok(self.latest.borrow().get(name).cloned())
    }

    async fn publish(&self, package: &Package, _config: &RegistryConfig) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("publish {}", package.name));
        if self.failing_publish.borrow().contains(&package.name) {
            return Err(CadenceError::external(
                format!("npm publish {}", package.name),
                "E503 Service Unavailable",
            ));
        }
        self.published
            .borrow_mut()
            .push(format!("{}@{}", package.name, package.version));
        self.latest
            .borrow_mut()
            .insert(package.name.clone(), package.version.clone());
        Ok(())
    }

    async fn pack(&self, package: &Package) -> Result<Vec<String>> {
        self.calls.borrow_mut().push(format!("pack {}", package.name));
        Ok(vec!["package.json".into(), "index.js".into()])
    }

    async fn dependency_updates(&self, package: &Package) -> Result<Vec<OutdatedDependency>> {
        self.calls
            .borrow_mut()
            .push(format!("dependency_updates {}", package.name));
        Ok(self
            .outdated
            .borrow()
            .get(&package.name)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory files serving as both [`ManifestStore`] and [`ChangelogStore`].
#[derive(Debug)]
pub struct MemoryStore {
    root: PathBuf,
    files: RefCell<BTreeMap<PathBuf, String>>,
    manifests: RefCell<Vec<PathBuf>>,
    writes: RefCell<Vec<PathBuf>>,
    failing_writes: RefCell<BTreeSet<PathBuf>>,
}

impl MemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: RefCell::new(BTreeMap::new()),
            manifests: RefCell::new(Vec::new()),
            writes: RefCell::new(Vec::new()),
            failing_writes: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Adds `packages/<name>/package.json` with the given internal dependencies.
    pub fn with_package(self, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        let dependencies = deps
            .iter()
            .map(|(dep, range)| format!("    \"{dep}\": \"{range}\""))
            .collect::<Vec<_>>()
            .join(",\n");
        let text = format!(
            "{{\n  \"name\": \"{name}\",\n  \"version\": \"{version}\",\n  \"dependencies\": {{\n{dependencies}\n  }}\n}}\n"
        );
        self.with_manifest(&format!("packages/{name}"), &text)
    }

    /// Adds a manifest with raw `text` in the workspace-relative `dir`.
    pub fn with_manifest(self, dir: &str, text: &str) -> Self {
        let path = self.root.join(dir).join("package.json");
        self.manifests.borrow_mut().push(path.clone());
        self.files.borrow_mut().insert(path, text.to_string());
        self
    }

    /// Adds any file, relative to the root.
    pub fn with_file(self, rel: &str, text: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(self.root.join(rel), text.to_string());
        self
    }

    pub fn file(&self, rel: &str) -> Option<String> {
        self.files.borrow().get(&self.root.join(rel)).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        self.files.borrow().clone()
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.borrow().clone()
    }

    pub fn fail_writes_to(&self, rel: &str) {
        self.failing_writes.borrow_mut().insert(self.root.join(rel));
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if self.failing_writes.borrow().contains(path) {
            return Err(CadenceError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{}: simulated write failure", path.display()),
            )));
        }
        self.writes.borrow_mut().push(path.to_path_buf());
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }
}

impl ManifestStore for MemoryStore {
    fn read_package_json(&self, path: &Path) -> Result<String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| CadenceError::NotFound(path.display().to_string()))
    }

    fn write_package_json(&self, path: &Path, contents: &str) -> Result<()> {
        self.write_file(path, contents)
    }

    fn list_workspace_packages(&self) -> Result<Vec<Package>> {
        self.manifests
            .borrow()
            .iter()
            .map(|path| {
                let dir = path.parent().unwrap_or(&self.root);
                let text = self.read_package_json(path)?;
                parse_package(&self.root, dir, &text)
            })
            .collect()
    }
}

impl ChangelogStore for MemoryStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.files.borrow().get(path).cloned())
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        self.write_file(path, contents)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.writes.borrow_mut().push(path.to_path_buf());
        self.files.borrow_mut().remove(path);
        Ok(())
    }
}
