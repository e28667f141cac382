//! Capability interfaces the release engine consumes, plus the default
//! implementations backed by system `git`, the npm toolchain and the local
//! filesystem.
//!
//! The engine never talks to git, npm or the disk directly: everything goes
//! through these traits so that planning and the release pipeline can be driven
//! by in-memory fakes in tests. Version control and registry calls are `async`
//! because they spawn processes or hit the network; the pipeline awaits them one
//! at a time. Manifest and changelog stores are plain synchronous file access.
#![allow(async_fn_in_trait)]

pub mod fs;
pub mod git;
pub mod npm;

pub use fs::{FsChangelogStore, FsManifestStore};
pub use git::SystemGit;
pub use npm::NpmRegistry;

use crate::config::RegistryConfig;
use crate::errors::Result;
use crate::types::Package;
use semver::Version;
use std::path::Path;

/// Options for [`VersionControl::push`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Push annotated tags reachable from the pushed commits.
    pub follow_tags: bool,
    /// Set the pushed branch's upstream (`-u`).
    pub set_upstream: bool,
}

/// Version-control operations used by the history reader, the checks and the pipeline.
pub trait VersionControl {
    /// Porcelain status lines; empty means a clean working tree.
    async fn status(&self) -> Result<Vec<String>>;
    async fn fetch(&self, remote: &str) -> Result<()>;
    async fn tags(&self) -> Result<Vec<String>>;
    async fn add_annotated_tag(&self, name: &str, message: &str) -> Result<()>;
    async fn commit(&self, message: &str) -> Result<()>;
    async fn push(&self, remote: &str, branch: &str, options: PushOptions) -> Result<()>;
    /// Runs an arbitrary subcommand and returns its stdout.
    async fn raw(&self, args: &[&str]) -> Result<String>;
    async fn reset_soft(&self, hash: &str) -> Result<()>;
}

/// A dependency with a newer version available on the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedDependency {
    pub name: String,
    pub current: String,
    pub latest: String,
}

/// Package registry operations.
pub trait Registry {
    async fn validate_auth(&self, config: &RegistryConfig) -> Result<()>;
    /// Latest published version, or `None` when the package was never published.
    async fn latest_version(&self, name: &str, config: &RegistryConfig)
    -> Result<Option<Version>>;
    async fn publish(&self, package: &Package, config: &RegistryConfig) -> Result<()>;
    /// Files that would end up in the published tarball.
    async fn pack(&self, package: &Package) -> Result<Vec<String>>;
    async fn dependency_updates(&self, package: &Package) -> Result<Vec<OutdatedDependency>>;
}

/// Reads and writes package manifests and lists the workspace members.
pub trait ManifestStore {
    fn read_package_json(&self, path: &Path) -> Result<String>;
    fn write_package_json(&self, path: &Path, contents: &str) -> Result<()>;
    fn list_workspace_packages(&self) -> Result<Vec<Package>>;
}

/// Reads and writes changelog files.
pub trait ChangelogStore {
    /// `None` when the file does not exist.
    fn read(&self, path: &Path) -> Result<Option<String>>;
    fn write(&self, path: &Path, contents: &str) -> Result<()>;
    /// Removes a file created by a release that is being rolled back.
    fn remove(&self, path: &Path) -> Result<()>;
}
