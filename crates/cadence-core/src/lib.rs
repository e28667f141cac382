pub mod adapters;
pub mod changelog;
pub mod checks;
pub mod commits;
pub mod config;
pub mod conventional;
pub mod errors;
pub mod filters;
pub mod git;
pub mod graph;
pub mod manifest;
pub mod markdown;
pub mod pipeline;
pub mod process;
pub mod types;
pub mod version;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Sent with every registry request.
pub const USER_AGENT: &str = concat!("cadence/", env!("CARGO_PKG_VERSION"));

// Re-export commonly used items
pub use adapters::{
    ChangelogStore, FsChangelogStore, FsManifestStore, ManifestStore, NpmRegistry, Registry,
    SystemGit, VersionControl,
};
pub use changelog::{ChangelogEntry, ChangelogFormat, ChangelogSynthesizer};
pub use checks::{CheckName, CheckOutcome, CheckReport, CheckSelection, Validator};
pub use commits::{Commit, CommitFilter, CommitHistory};
pub use config::Config;
pub use conventional::{Classification, CommitKind, classify};
pub use errors::{CadenceError, Result, WorkspaceError};
pub use graph::{DependencyGraph, RangePolicy, update_range};
pub use pipeline::{
    DryRunReport, PackageOutcome, PublishResult, PublishStatus, ReleaseContext, ReleaseMode,
    ReleaseOptions, ReleasePlan, ReleaseStep, ReleaseSummary, ReleasedPackage, ValidationSummary,
};
pub use types::{BumpKind, BumpReason, Package, RangeUpdate, VersionBumpPlan, Workspace};
pub use version::{BumpStrategy, VersionResolver, bump_version, propose_version};

#[cfg(test)]
mod pipeline_tests;
