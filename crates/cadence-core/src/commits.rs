//! Commit history reader.
//!
//! Turns `git log` output into [`Commit`] records and filters them down to the
//! commits relevant to one package. Everything that parses log text lives here so
//! that version and graph logic can be exercised with synthetic commits.

use crate::adapters::VersionControl;
use crate::config::GitConfig;
use crate::errors::Result;
use crate::types::Package;
use crate::version::compare_versions;
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeSet;
use tracing::{debug, warn};

const RECORD_SEPARATOR: char = '\u{1e}';
const FIELD_SEPARATOR: char = '\u{1f}';
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%aI%x1f%s%x1f%b%x1f";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub hash: String,
    pub authored_date: DateTime<FixedOffset>,
    pub subject: String,
    pub body: String,
    /// Workspace-relative paths touched by the commit.
    pub changed_files: BTreeSet<String>,
}

impl Commit {
    /// Builds a commit without a repository, dated at the Unix epoch.
    #[cfg(any(test, feature = "testing"))]
    pub fn synthetic(hash: &str, subject: &str, body: &str, files: &[&str]) -> Self {
        Self {
            hash: hash.to_string(),
            authored_date: DateTime::UNIX_EPOCH.fixed_offset(),
            subject: subject.to_string(),
            body: body.to_string(),
            changed_files: files.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Selects the commits relevant to one package.
///
/// The two predicates are OR-ed; a filter with neither keeps every commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitFilter {
    /// Workspace-relative directory; empty matches every file.
    pub path: Option<String>,
    /// Matches when `(<name>)` appears in the subject or body.
    pub package_name: Option<String>,
}

impl CommitFilter {
    pub fn for_package(package: &Package) -> Self {
        Self {
            path: Some(package.relative_path.clone()),
            package_name: Some(package.name.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.package_name.is_none()
    }

    pub fn matches(&self, commit: &Commit) -> bool {
        if self.is_empty() {
            return true;
        }

        let path_match = self.path.as_deref().is_some_and(|prefix| {
            commit
                .changed_files
                .iter()
                .any(|file| path_has_prefix(file, prefix))
        });
        if path_match {
            return true;
        }

        self.package_name.as_deref().is_some_and(|name| {
            let marker = format!("({name})");
            commit.subject.contains(&marker) || commit.body.contains(&marker)
        })
    }
}

/// Segment-aware prefix test: `packages/a` matches `packages/a/x.ts` but not `packages/ab/x.ts`.
fn path_has_prefix(file: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() || prefix == "." {
        return true;
    }
    let file = file.strip_prefix("./").unwrap_or(file);
    file == prefix
        || file
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Parses the output of `git log` run with [`LOG_FORMAT`] and `--name-only`.
///
/// Records missing a hash, date or subject are skipped.
pub fn parse_log(output: &str) -> Vec<Commit> {
    output
        .split(RECORD_SEPARATOR)
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let commit = parse_record(record);
            if commit.is_none() {
                debug!(record = %record.trim(), "skipping malformed log record");
            }
            commit
        })
        .collect()
}

fn parse_record(record: &str) -> Option<Commit> {
    let mut fields = record.splitn(5, FIELD_SEPARATOR);
    let hash = fields.next()?.trim();
    let date = fields.next()?.trim();
    let subject = fields.next()?.trim();
    let body = fields.next().unwrap_or_default().trim();
    let files = fields.next().unwrap_or_default();

    if hash.is_empty() || subject.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let authored_date = DateTime::parse_from_rfc3339(date).ok()?;

    Some(Commit {
        hash: hash.to_string(),
        authored_date,
        subject: subject.to_string(),
        body: body.to_string(),
        changed_files: files
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

/// Reads commit history through a [`VersionControl`] adapter.
pub struct CommitHistory<'a, G> {
    git: &'a G,
}

impl<'a, G: VersionControl> CommitHistory<'a, G> {
    pub fn new(git: &'a G) -> Self {
        Self { git }
    }

    /// Every commit reachable from HEAD, newest first.
    pub async fn all_commits(&self) -> Result<Vec<Commit>> {
        let output = self.git.raw(&["log", LOG_FORMAT, "--name-only"]).await?;
        Ok(parse_log(&output))
    }

    /// Commits after `tag` (all commits when `tag` is `None`), newest first.
    ///
    /// A tag that cannot be resolved is logged and treated as absent.
    pub async fn commits_since(
        &self,
        tag: Option<&str>,
        filter: &CommitFilter,
    ) -> Result<Vec<Commit>> {
        let commits = match tag {
            None => self.all_commits().await?,
            Some(tag) => {
                let range = format!("{tag}..HEAD");
                match self
                    .git
                    .raw(&["log", LOG_FORMAT, "--name-only", &range])
                    .await
                {
                    Ok(output) => parse_log(&output),
                    Err(err) => {
                        warn!(%tag, error = %err, "could not read history since tag, using full history");
                        self.all_commits().await?
                    }
                }
            }
        };

        Ok(commits.into_iter().filter(|c| filter.matches(c)).collect())
    }

    /// The highest existing release tag of `package`, if any.
    pub async fn latest_tag(&self, package: &str, git: &GitConfig) -> Result<Option<String>> {
        let tags = self.git.tags().await?;
        Ok(latest_release_tag(&tags, &git.tag_prefix_for(package)))
    }
}

/// Picks the tag with the highest version among those starting with `prefix`.
pub fn latest_release_tag(tags: &[String], prefix: &str) -> Option<String> {
    tags.iter()
        .filter_map(|tag| {
            let version = tag.strip_prefix(prefix)?;
            version
                .starts_with(|c: char| c.is_ascii_digit())
                .then_some((tag, version))
        })
        .max_by(|(_, a), (_, b)| compare_versions(a, b))
        .map(|(tag, _)| tag.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGit;

    fn log_record(hash: &str, subject: &str, body: &str, files: &[&str]) -> String {
        format!(
            "\u{1e}{hash}\u{1f}2024-03-01T10:00:00+01:00\u{1f}{subject}\u{1f}{body}\u{1f}\n\n{}\n",
            files.join("\n")
        )
    }

    #[test]
    fn parses_records_with_files() {
        let output = format!(
            "{}{}",
            log_record("aaa111", "fix(a): patch bug", "details\n", &["packages/a/src/x.ts"]),
            log_record("bbb222", "feat: thing", "", &["packages/b/index.ts", "README.md"]),
        );
        let commits = parse_log(&output);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "aaa111");
        assert_eq!(commits[0].subject, "fix(a): patch bug");
        assert_eq!(commits[0].body, "details");
        assert!(commits[0].changed_files.contains("packages/a/src/x.ts"));
        assert_eq!(commits[1].changed_files.len(), 2);
        assert_eq!(
            commits[0].authored_date.to_rfc3339(),
            "2024-03-01T10:00:00+01:00"
        );
    }

    #[test]
    fn skips_malformed_records() {
        let output = format!(
            "{}\u{1e}\u{1f}2024-03-01T10:00:00Z\u{1f}no hash\u{1f}\u{1f}\n\u{1e}ccc333\u{1f}not-a-date\u{1f}subject\u{1f}\u{1f}\n\u{1e}ddd444\u{1f}2024-03-01T10:00:00Z\u{1f}\u{1f}\u{1f}\n",
            log_record("aaa111", "fix: ok", "", &[])
        );
        let commits = parse_log(&output);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, "aaa111");
    }

    #[test]
    fn path_filter_is_segment_aware() {
        let filter = CommitFilter {
            path: Some("packages/a".into()),
            package_name: Some("a".into()),
        };
        let in_a = Commit::synthetic("1", "chore: x", "", &["packages/a/src/x.ts"]);
        let in_b = Commit::synthetic("2", "fix: patch bug", "", &["packages/b/src/y.ts"]);
        let in_ab = Commit::synthetic("3", "fix: y", "", &["packages/ab/index.ts"]);
        assert!(filter.matches(&in_a));
        assert!(!filter.matches(&in_b));
        assert!(!filter.matches(&in_ab));
    }

    #[test]
    fn package_marker_matches_subject_or_body() {
        let filter = CommitFilter {
            path: Some("packages/a".into()),
            package_name: Some("a".into()),
        };
        let subject = Commit::synthetic("1", "fix(a): patch bug", "", &["packages/b/y.ts"]);
        let body = Commit::synthetic("2", "fix: shared", "also touches (a)", &[]);
        assert!(filter.matches(&subject));
        assert!(filter.matches(&body));
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let filter = CommitFilter::default();
        assert!(filter.matches(&Commit::synthetic("1", "x", "", &[])));
        let root = CommitFilter {
            path: Some(String::new()),
            package_name: None,
        };
        assert!(root.matches(&Commit::synthetic("1", "x", "", &["any/file"])));
    }

    #[test]
    fn latest_tag_uses_numeric_ordering() {
        let tags: Vec<String> = ["a@1.9.0", "a@1.10.0", "a@1.2.0", "ab@9.0.0", "b@3.0.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(latest_release_tag(&tags, "a@"), Some("a@1.10.0".into()));
        assert_eq!(latest_release_tag(&tags, "c@"), None);
    }

    #[tokio::test]
    async fn without_a_tag_commits_since_is_the_full_history() {
        let git = FakeGit::new()
            .with_commit("feat: one", &["packages/a/index.js"])
            .with_tag("a@1.0.0")
            .with_commit("fix: two", &["packages/b/index.js"])
            .with_commit("docs: three", &["README.md"]);
        let history = CommitHistory::new(&git);
        let filter = CommitFilter::default();

        let all = history.all_commits().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(history.commits_since(None, &filter).await.unwrap(), all);

        // Unknown tags fall back to the full history too.
        assert_eq!(
            history.commits_since(Some("a@9.9.9"), &filter).await.unwrap(),
            all
        );

        let since = history.commits_since(Some("a@1.0.0"), &filter).await.unwrap();
        let subjects: Vec<_> = since.iter().map(|c| c.subject.as_str()).collect();
        assert_eq!(subjects, vec!["docs: three", "fix: two"]);
    }
}
