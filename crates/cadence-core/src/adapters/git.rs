use crate::adapters::{PushOptions, VersionControl};
use crate::errors::Result;
use crate::process::run;
use std::path::{Path, PathBuf};

/// [`VersionControl`] backed by the system `git` binary, run in a fixed directory.
#[derive(Debug, Clone)]
pub struct SystemGit {
    cwd: PathBuf,
}

impl SystemGit {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        run("git", args, &self.cwd).await
    }
}

impl VersionControl for SystemGit {
    async fn status(&self) -> Result<Vec<String>> {
        let output = self.git(&["status", "--porcelain"]).await?;
        Ok(output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn fetch(&self, remote: &str) -> Result<()> {
        self.git(&["fetch", remote, "--tags"]).await.map(|_| ())
    }

    async fn tags(&self) -> Result<Vec<String>> {
        let output = self.git(&["tag", "--list"]).await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn add_annotated_tag(&self, name: &str, message: &str) -> Result<()> {
        self.git(&["tag", "-a", name, "-m", message]).await.map(|_| ())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "-m", message]).await.map(|_| ())
    }

    async fn push(&self, remote: &str, branch: &str, options: PushOptions) -> Result<()> {
        let mut args = vec!["push"];
        if options.set_upstream {
            args.push("--set-upstream");
        }
        if options.follow_tags {
            args.push("--follow-tags");
        }
        args.extend([remote, branch]);
        self.git(&args).await.map(|_| ())
    }

    async fn raw(&self, args: &[&str]) -> Result<String> {
        self.git(args).await
    }

    async fn reset_soft(&self, hash: &str) -> Result<()> {
        self.git(&["reset", "--soft", hash]).await.map(|_| ())
    }
}
