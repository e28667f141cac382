//! Conventional-commit classification.
//!
//! Classification is a pure function of a [`Commit`]: a breaking-change marker
//! in the body (or `!` after the type) always wins, then the commit type decides,
//! and anything that does not look like `type(scope): description` is `Other`.

use crate::commits::Commit;
use crate::types::BumpKind;
use regex::Regex;
use std::sync::LazyLock;

static SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<type>[A-Za-z][A-Za-z0-9-]*)(?:\((?P<scope>[^()]*)\))?(?P<bang>!)?:\s*(?P<desc>.*\S)\s*$")
        .expect("valid subject pattern")
});

static BREAKING_FOOTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^BREAKING[ -]CHANGE:").expect("valid breaking-change pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommitKind {
    Breaking,
    Feature,
    Fix,
    Chore,
    Other,
}

impl CommitKind {
    /// Severity this kind contributes to a package's bump.
    pub fn bump(self) -> BumpKind {
        match self {
            Self::Breaking => BumpKind::Major,
            Self::Feature => BumpKind::Minor,
            Self::Fix => BumpKind::Patch,
            Self::Chore | Self::Other => BumpKind::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: CommitKind,
    /// Lowercased conventional type, `None` for unclassifiable subjects.
    pub commit_type: Option<String>,
    pub scope: Option<String>,
    /// Subject without the `type(scope):` prefix.
    pub description: String,
}

pub fn classify(commit: &Commit) -> Classification {
    let subject = commit.subject.trim();
    let body_breaking = BREAKING_FOOTER.is_match(&commit.body);

    let Some(caps) = SUBJECT.captures(subject) else {
        return Classification {
            kind: if body_breaking {
                CommitKind::Breaking
            } else {
                CommitKind::Other
            },
            commit_type: None,
            scope: None,
            description: subject.to_string(),
        };
    };

    let commit_type = caps
        .name("type")
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let scope = caps
        .name("scope")
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    let description = caps
        .name("desc")
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let kind = if body_breaking || caps.name("bang").is_some() {
        CommitKind::Breaking
    } else {
        match commit_type.as_str() {
            "feat" | "feature" => CommitKind::Feature,
            "fix" | "perf" => CommitKind::Fix,
            _ => CommitKind::Chore,
        }
    };

    Classification {
        kind,
        commit_type: Some(commit_type),
        scope,
        description,
    }
}

/// Highest bump any of `commits` calls for.
pub fn max_bump<'a>(commits: impl IntoIterator<Item = &'a Commit>) -> BumpKind {
    commits
        .into_iter()
        .map(|c| classify(c).kind.bump())
        .max()
        .unwrap_or_default()
}
