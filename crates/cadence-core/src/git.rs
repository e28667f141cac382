//! Queries and small mutations built on [`VersionControl::raw`].

use crate::adapters::VersionControl;
use crate::errors::{CadenceError, Result};
use tracing::warn;

/// Name of the checked-out branch. Fails on a detached HEAD.
pub async fn current_branch<G: VersionControl>(git: &G) -> Result<String> {
    let output = git.raw(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    let branch = output.trim().trim_start_matches("refs/heads/").to_string();

    if branch.is_empty() || branch == "HEAD" {
        return Err(CadenceError::validation(
            "branch",
            "unable to determine current git branch (detached HEAD)",
            "check out a release branch before releasing",
        ));
    }

    Ok(branch)
}

pub async fn head_commit<G: VersionControl>(git: &G) -> Result<String> {
    Ok(git.raw(&["rev-parse", "HEAD"]).await?.trim().to_string())
}

/// Upstream of the current branch (e.g. `origin/main`), `None` when not tracking.
pub async fn upstream<G: VersionControl>(git: &G) -> Option<String> {
    git.raw(&["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"])
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Number of upstream commits missing locally.
pub async fn commits_behind<G: VersionControl>(git: &G) -> Result<u64> {
    let output = git.raw(&["rev-list", "--count", "HEAD..@{u}"]).await?;
    output.trim().parse().map_err(|_| {
        CadenceError::InvalidData(format!(
            "unexpected `git rev-list --count` output: {}",
            output.trim()
        ))
    })
}

pub async fn tag_exists<G: VersionControl>(git: &G, tag: &str) -> Result<bool> {
    Ok(git.tags().await?.iter().any(|t| t == tag))
}

/// Commit a tag points at.
pub async fn tag_target<G: VersionControl>(git: &G, tag: &str) -> Result<String> {
    let rev = format!("{tag}^{{commit}}");
    let hash = git.raw(&["rev-parse", &rev]).await?.trim().to_string();
    if hash.is_empty() {
        return Err(CadenceError::InvalidData(format!(
            "could not resolve tag '{tag}'"
        )));
    }
    Ok(hash)
}

/// Deletes `tag` locally (must succeed) and on `remote` (best effort).
pub async fn delete_tag<G: VersionControl>(git: &G, tag: &str, remote: &str) -> Result<()> {
    git.raw(&["tag", "-d", tag]).await?;
    let remote_ref = format!("refs/tags/{tag}");
    if let Err(err) = git.raw(&["push", remote, "--delete", &remote_ref]).await {
        warn!(%tag, %remote, error = %err, "could not delete remote tag, continuing");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGit, GitOp};

    #[tokio::test]
    async fn reads_branch_head_and_upstream() {
        let git = FakeGit::new()
            .with_commit("chore: init", &["README.md"])
            .with_branch("release/2.x")
            .with_upstream(Some("origin/release/2.x"), 3);
        assert_eq!(current_branch(&git).await.unwrap(), "release/2.x");
        assert_eq!(head_commit(&git).await.unwrap(), git.head());
        assert_eq!(upstream(&git).await.as_deref(), Some("origin/release/2.x"));
        assert_eq!(commits_behind(&git).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn detached_head_is_a_branch_validation_error() {
        let git = FakeGit::new().with_branch("HEAD");
        let err = current_branch(&git).await.unwrap_err();
        assert!(matches!(err, CadenceError::Validation { ref check, .. } if check == "branch"));
    }

    #[tokio::test]
    async fn missing_upstream_is_none() {
        let git = FakeGit::new().with_upstream(None, 0);
        assert_eq!(upstream(&git).await, None);
    }

    #[tokio::test]
    async fn delete_tag_tolerates_remote_failures_only() {
        let git = FakeGit::new().with_tag("a@1.0.0").with_tag("b@1.0.0");
        git.fail_on(GitOp::DeleteRemoteTag);
        delete_tag(&git, "a@1.0.0", "origin").await.unwrap();
        assert!(!tag_exists(&git, "a@1.0.0").await.unwrap());
        assert!(git.remote_tags().contains(&"a@1.0.0".to_string()));

        git.fail_on(GitOp::DeleteTag);
        assert!(delete_tag(&git, "b@1.0.0", "origin").await.is_err());
        assert!(tag_exists(&git, "b@1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn tag_target_resolves_the_tagged_commit() {
        let git = FakeGit::new().with_commit("feat: one", &["a.js"]).with_tag("a@1.0.0");
        let tagged = git.head();
        let git = git.with_commit("fix: two", &["a.js"]);
        assert_eq!(tag_target(&git, "a@1.0.0").await.unwrap(), tagged);
        assert!(tag_target(&git, "a@9.9.9").await.is_err());
    }
}
