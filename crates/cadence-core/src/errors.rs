use std::io;
use std::path::Path;

/// Canonical result type for Cadence code
pub type Result<T> = std::result::Result<T, CadenceError>;

/// Common error type for Cadence operations
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Fatal before any mutation: cyclic graph, missing field, bad config value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A pre-release check rejected the package. Nothing was mutated.
    #[error("Validation failed ({check}): {message}\n  hint: {remediation}")]
    Validation {
        check: String,
        message: String,
        remediation: String,
    },

    #[error("`{command}` failed: {message}")]
    ExternalCommand { command: String, message: String },

    /// The tag for this release already exists and `force` was not set.
    #[error("Tag '{tag}' already exists.\n  To release again, delete it first:\n{remediation}")]
    TagExists { tag: String, remediation: String },

    /// A mutating step failed after the release commit was created.
    #[error("Release of {package} partially failed: {cause}\n  state: {}\n  hint: {hint}", residue.join("; "))]
    PartialFailure {
        package: String,
        residue: Vec<String>,
        cause: Box<CadenceError>,
        hint: String,
    },

    /// A workspace dependency of this package failed in the same batch.
    #[error("Skipped {package}: dependency '{dependency}' failed to release")]
    DependencyFailed { package: String, dependency: String },

    #[error("Changelog error: {0}")]
    Changelog(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CadenceError {
    pub fn validation(
        check: impl Into<String>,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::Validation {
            check: check.into(),
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    pub fn external(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCommand {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Builds the "tag already exists" error with manual deletion steps.
    pub fn tag_exists(tag: &str, remote: &str) -> Self {
        Self::TagExists {
            tag: tag.to_string(),
            remediation: format!(
                "    git tag -d {tag}\n    git push {remote} --delete refs/tags/{tag}\n  or re-run with --force"
            ),
        }
    }

    /// True when a mutation happened before the failure and residue remains.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, Self::PartialFailure { .. })
    }

    /// True for failures an operator can fix and retry without code changes.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TagExists { .. } | Self::Validation { .. } | Self::DependencyFailed { .. } => {
                true
            }
            Self::PartialFailure { cause, .. } => cause.is_recoverable(),
            _ => false,
        }
    }
}

/// Errors that can occur when working with workspaces
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("No package.json workspace found")]
    NotFound,
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("Invalid workspace: {0}")]
    InvalidWorkspace(String),
}

/// Helper to create an IO error with file path context
pub fn io_error_with_path<P: AsRef<Path>>(error: io::Error, path: P) -> io::Error {
    io::Error::new(
        error.kind(),
        format!("{}: {}", path.as_ref().display(), error),
    )
}
