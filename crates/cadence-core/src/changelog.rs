//! Changelog synthesis: grouping classified commits into a version section,
//! rendering it, and merging it into an existing changelog.
//!
//! Sections are headed `## [<version>] - <YYYY-MM-DD>` in both formats. Merging
//! replaces an existing section for the same version in place, so re-running a
//! release for the same version never duplicates history.

use crate::commits::Commit;
use crate::conventional::{CommitKind, classify};
use crate::markdown::{compose_markdown_with_affixes, format_markdown_list_item, short_hash};
use crate::types::{DependencyUpdate, format_dependency_updates_message};
use chrono::NaiveDate;
use semver::Version;
use std::str::FromStr;

const UNRELEASED: &str = "unreleased";
const VERSION_BUMP_ONLY: &str = "Version bump only";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangelogFormat {
    /// Flat sections grouped by commit type.
    #[default]
    Conventional,
    /// Added / Changed / Fixed sections as described on keepachangelog.com.
    KeepAChangelog,
}

impl FromStr for ChangelogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conventional" => Ok(Self::Conventional),
            "keep-a-changelog" | "keepachangelog" => Ok(Self::KeepAChangelog),
            other => Err(format!(
                "unknown changelog format '{other}' (expected 'conventional' or 'keep-a-changelog')"
            )),
        }
    }
}

impl ChangelogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conventional => "conventional",
            Self::KeepAChangelog => "keep-a-changelog",
        }
    }

    /// Section titles in rendering order.
    fn section_titles(&self) -> &'static [&'static str] {
        match self {
            Self::Conventional => &[
                "Breaking Changes",
                "Features",
                "Bug Fixes",
                "Dependencies",
                "Other Changes",
            ],
            Self::KeepAChangelog => &["Added", "Changed", "Fixed"],
        }
    }

    fn title_for(&self, kind: CommitKind) -> Option<&'static str> {
        match (self, kind) {
            (_, CommitKind::Chore) => None,
            (Self::Conventional, CommitKind::Breaking) => Some("Breaking Changes"),
            (Self::Conventional, CommitKind::Feature) => Some("Features"),
            (Self::Conventional, CommitKind::Fix) => Some("Bug Fixes"),
            (Self::Conventional, CommitKind::Other) => Some("Other Changes"),
            (Self::KeepAChangelog, CommitKind::Feature) => Some("Added"),
            (Self::KeepAChangelog, CommitKind::Fix) => Some("Fixed"),
            (Self::KeepAChangelog, CommitKind::Breaking | CommitKind::Other) => Some("Changed"),
        }
    }

    fn dependencies_title(&self) -> &'static str {
        match self {
            Self::Conventional => "Dependencies",
            Self::KeepAChangelog => "Changed",
        }
    }

    fn fallback_title(&self) -> &'static str {
        match self {
            Self::Conventional => "Other Changes",
            Self::KeepAChangelog => "Changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogSection {
    pub title: String,
    /// Item texts without the list marker.
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub version: Version,
    pub date: NaiveDate,
    pub sections: Vec<ChangelogSection>,
}

impl ChangelogEntry {
    pub fn heading(&self) -> String {
        format!("## [{}] - {}", self.version, self.date.format("%Y-%m-%d"))
    }

    pub fn section(&self, title: &str) -> Option<&ChangelogSection> {
        self.sections.iter().find(|s| s.title == title)
    }
}

/// Renders and merges changelog sections for one package.
#[derive(Debug, Clone)]
pub struct ChangelogSynthesizer {
    format: ChangelogFormat,
    package: String,
}

impl ChangelogSynthesizer {
    pub fn new(format: ChangelogFormat, package: impl Into<String>) -> Self {
        Self {
            format,
            package: package.into(),
        }
    }

    pub fn format(&self) -> ChangelogFormat {
        self.format
    }

    /// Groups `commits` (plus any Unreleased notes) into an entry for `version`.
    ///
    /// Chores are left out. An entry with nothing to say still records the bump.
    pub fn entry(
        &self,
        version: &Version,
        date: NaiveDate,
        commits: &[Commit],
        dependency_updates: &[DependencyUpdate],
        unreleased: &[String],
    ) -> ChangelogEntry {
        let mut sections: Vec<ChangelogSection> = self
            .format
            .section_titles()
            .iter()
            .map(|title| ChangelogSection {
                title: title.to_string(),
                items: Vec::new(),
            })
            .collect();

        self.fold_unreleased(&mut sections, unreleased);

        for commit in commits {
            let classification = classify(commit);
            let Some(title) = self.format.title_for(classification.kind) else {
                continue;
            };
            let mut prefix = String::new();
            if self.format == ChangelogFormat::KeepAChangelog
                && classification.kind == CommitKind::Breaking
            {
                prefix.push_str("**Breaking:** ");
            }
            if let Some(scope) = &classification.scope {
                prefix.push_str(&format!("**{scope}:** "));
            }
            let line = compose_markdown_with_affixes(
                &classification.description,
                &prefix,
                &format!(" ({})", short_hash(&commit.hash)),
            );
            section_mut(&mut sections, title).items.push(line);
        }

        if let Some(message) = format_dependency_updates_message(dependency_updates) {
            section_mut(&mut sections, self.format.dependencies_title())
                .items
                .push(message);
        }

        sections.retain(|s| !s.items.is_empty());
        if sections.is_empty() {
            sections.push(ChangelogSection {
                title: self.format.fallback_title().to_string(),
                items: vec![VERSION_BUMP_ONLY.to_string()],
            });
        }

        ChangelogEntry {
            version: version.clone(),
            date,
            sections,
        }
    }

    fn fold_unreleased(&self, sections: &mut Vec<ChangelogSection>, lines: &[String]) {
        let mut title = self.format.fallback_title().to_string();
        let mut last: Option<(String, usize)> = None;
        for line in lines {
            if let Some(heading) = line.strip_prefix("### ") {
                title = heading.trim().to_string();
                last = None;
                continue;
            }
            if let Some(item) = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
            {
                let section = section_mut(sections, &title);
                section.items.push(item.trim().to_string());
                last = Some((title.clone(), section.items.len() - 1));
                continue;
            }
            if line.starts_with("  ") {
                if let Some((t, idx)) = &last {
                    if let Some(item) = section_mut(sections, t).items.get_mut(*idx) {
                        item.push('\n');
                        item.push_str(line.trim());
                        continue;
                    }
                }
            }
            let section = section_mut(sections, &title);
            section.items.push(line.trim().to_string());
            last = Some((title.clone(), section.items.len() - 1));
        }
    }

    /// Renders one version section, ending with a single newline.
    pub fn render(&self, entry: &ChangelogEntry) -> String {
        let mut out = entry.heading();
        out.push('\n');
        for section in &entry.sections {
            out.push_str(&format!("\n### {}\n\n", section.title));
            for item in &section.items {
                out.push_str(&format_markdown_list_item(item));
            }
        }
        out
    }

    /// Header written to a changelog created from scratch.
    pub fn preamble(&self) -> String {
        match self.format {
            ChangelogFormat::Conventional => format!("# {}\n", self.package),
            ChangelogFormat::KeepAChangelog => format!(
                "# {}\n\n\
                 All notable changes to this project will be documented in this file.\n\n\
                 The format is based on [Keep a Changelog](https://keepachangelog.com/en/1.1.0/),\n\
                 and this project adheres to [Semantic Versioning](https://semver.org/spec/v2.0.0.html).\n\n\
                 ## [Unreleased]\n",
                self.package
            ),
        }
    }

    /// Merge `entry` into `existing`.
    ///
    /// A section for the same version is replaced where it stands. Otherwise the
    /// entry goes right after the Unreleased section, or above the newest version.
    pub fn merge(&self, existing: &str, entry: &ChangelogEntry) -> String {
        let existing = existing.trim_start_matches('\u{feff}');
        let base = if existing.trim().is_empty() {
            self.preamble()
        } else {
            existing.to_string()
        };
        let lines: Vec<&str> = base.lines().collect();
        let version = entry.version.to_string();
        let headings = headings(&lines);

        let (start, end) = match headings
            .iter()
            .position(|(_, token)| token_matches_version(token, &version))
        {
            Some(pos) => (headings[pos].0, next_heading(&headings, pos, lines.len())),
            None => {
                let at = match headings.iter().position(|(_, t)| is_unreleased(t)) {
                    Some(pos) => next_heading(&headings, pos, lines.len()),
                    None => headings.first().map_or(lines.len(), |(idx, _)| *idx),
                };
                (at, at)
            }
        };

        splice(&lines, start, end, Some(&self.render(entry)))
    }

    /// Lines of the Unreleased section, blank lines dropped. Never mutates.
    pub fn extract_unreleased(&self, content: &str) -> Vec<String> {
        let lines: Vec<&str> = content.lines().collect();
        let headings = headings(&lines);
        let Some(pos) = headings.iter().position(|(_, t)| is_unreleased(t)) else {
            return Vec::new();
        };
        let start = headings[pos].0 + 1;
        let end = next_heading(&headings, pos, lines.len());
        lines[start..end]
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.trim_end().to_string())
            .collect()
    }

    /// Empties the Unreleased section, keeping its heading.
    pub fn clear_unreleased(&self, content: &str) -> String {
        let lines: Vec<&str> = content.lines().collect();
        let headings = headings(&lines);
        let Some(pos) = headings.iter().position(|(_, t)| is_unreleased(t)) else {
            return content.to_string();
        };
        let start = headings[pos].0 + 1;
        let end = next_heading(&headings, pos, lines.len());
        splice(&lines, start, end, None)
    }

    /// Problems that make `content` invalid; empty when valid. Never mutates.
    pub fn validate(&self, content: Option<&str>, required: bool) -> Vec<String> {
        let Some(content) = content else {
            return if required {
                vec!["changelog is missing".to_string()]
            } else {
                Vec::new()
            };
        };

        let mut problems = Vec::new();
        let lines: Vec<&str> = content.trim_start_matches('\u{feff}').lines().collect();
        if !lines.iter().any(|l| l.starts_with("# ")) {
            problems.push("missing a top-level '# ' title".to_string());
        }

        let headings = headings(&lines);
        if self.format == ChangelogFormat::KeepAChangelog
            && !headings.iter().any(|(_, t)| is_unreleased(t))
        {
            problems.push("missing the '## [Unreleased]' section".to_string());
        }

        if let Some((_, token)) = headings.iter().find(|(_, t)| !is_unreleased(t)) {
            let raw = token.strip_prefix('v').unwrap_or(token);
            if Version::parse(raw).is_err() {
                problems.push(format!(
                    "latest section '{token}' is not a valid semver version"
                ));
            }
        }

        problems
    }
}

fn section_mut<'a>(sections: &'a mut Vec<ChangelogSection>, title: &str) -> &'a mut ChangelogSection {
    let idx = match sections.iter().position(|s| s.title == title) {
        Some(idx) => idx,
        None => {
            sections.push(ChangelogSection {
                title: title.to_string(),
                items: Vec::new(),
            });
            sections.len() - 1
        }
    };
    &mut sections[idx]
}

/// `## ` headings as (line index, version token).
fn headings<'a>(lines: &[&'a str]) -> Vec<(usize, &'a str)> {
    lines
        .iter()
        .copied()
        .enumerate()
        .filter_map(|(idx, line)| heading_token(line).map(|token| (idx, token)))
        .collect()
}

fn heading_token(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("## ")?.trim();
    if let Some(inner) = rest.strip_prefix('[') {
        return inner.split(']').next().map(str::trim);
    }
    rest.split_whitespace().next()
}

fn next_heading(headings: &[(usize, &str)], pos: usize, len: usize) -> usize {
    headings.get(pos + 1).map_or(len, |(idx, _)| *idx)
}

fn is_unreleased(token: &str) -> bool {
    token.eq_ignore_ascii_case(UNRELEASED)
}

fn token_matches_version(token: &str, version: &str) -> bool {
    token.strip_prefix('v').unwrap_or(token) == version
}

/// Replace `lines[start..end]` with `block`, separating the parts by one blank line.
fn splice(lines: &[&str], start: usize, end: usize, block: Option<&str>) -> String {
    let before = trim_blank_edges(&lines[..start]);
    let after = trim_blank_edges(&lines[end..]);
    let mut parts: Vec<String> = Vec::new();
    if !before.is_empty() {
        parts.push(before.join("\n"));
    }
    if let Some(block) = block {
        parts.push(block.trim_end().to_string());
    }
    if !after.is_empty() {
        parts.push(after.join("\n"));
    }
    let mut out = parts.join("\n\n");
    out.push('\n');
    out
}

fn trim_blank_edges<'a>(lines: &'a [&'a str]) -> &'a [&'a str] {
    let keep = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(0, |idx| idx + 1);
    let skip = lines[..keep]
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(keep);
    &lines[skip..keep]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn commits() -> Vec<Commit> {
        vec![
            Commit::synthetic("aaaaaaa111", "feat(cli): add --json", "", &[]),
            Commit::synthetic("bbbbbbb222", "fix: patch bug", "", &[]),
            Commit::synthetic("ccccccc333", "chore: bump deps", "", &[]),
            Commit::synthetic("ddddddd444", "refactor!: drop node 16", "", &[]),
            Commit::synthetic("eeeeeee555", "Tweak wording", "", &[]),
        ]
    }

    fn conventional() -> ChangelogSynthesizer {
        ChangelogSynthesizer::new(ChangelogFormat::Conventional, "a")
    }

    fn kac() -> ChangelogSynthesizer {
        ChangelogSynthesizer::new(ChangelogFormat::KeepAChangelog, "a")
    }

    #[test]
    fn renders_conventional_sections() {
        let synth = conventional();
        let deps = [DependencyUpdate {
            name: "b".into(),
            new_version: "2.0.0".into(),
        }];
        let entry = synth.entry(&v("2.0.0"), date(), &commits(), &deps, &[]);
        let text = synth.render(&entry);
        assert_eq!(
            text,
            "## [2.0.0] - 2024-03-01\n\
             \n### Breaking Changes\n\n- drop node 16 (ddddddd)\n\
             \n### Features\n\n- **cli:** add --json (aaaaaaa)\n\
             \n### Bug Fixes\n\n- patch bug (bbbbbbb)\n\
             \n### Dependencies\n\n- Updated dependencies: b@2.0.0\n\
             \n### Other Changes\n\n- Tweak wording (eeeeeee)\n"
        );
    }

    #[test]
    fn renders_keep_a_changelog_sections() {
        let synth = kac();
        let entry = synth.entry(&v("2.0.0"), date(), &commits(), &[], &[]);
        let titles: Vec<_> = entry.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Added", "Changed", "Fixed"]);
        let changed = entry.section("Changed").unwrap();
        assert_eq!(changed.items[0], "**Breaking:** drop node 16 (ddddddd)");
    }

    #[test]
    fn empty_entry_records_version_bump() {
        let synth = conventional();
        let only_chores = [Commit::synthetic("aaaaaaa", "chore: x", "", &[])];
        let entry = synth.entry(&v("1.0.1"), date(), &only_chores, &[], &[]);
        assert_eq!(entry.sections.len(), 1);
        assert_eq!(entry.sections[0].items, vec![VERSION_BUMP_ONLY.to_string()]);
    }

    #[test]
    fn merge_into_empty_creates_preamble() {
        let synth = conventional();
        let entry = synth.entry(&v("1.0.1"), date(), &commits()[1..2], &[], &[]);
        let merged = synth.merge("", &entry);
        assert_eq!(
            merged,
            "# a\n\n## [1.0.1] - 2024-03-01\n\n### Bug Fixes\n\n- patch bug (bbbbbbb)\n"
        );
    }

    #[test]
    fn merge_inserts_above_previous_versions() {
        let synth = conventional();
        let existing = "# a\n\n## [1.0.0] - 2024-01-01\n\n### Features\n\n- first\n";
        let entry = synth.entry(&v("1.0.1"), date(), &commits()[1..2], &[], &[]);
        let merged = synth.merge(existing, &entry);
        let new_idx = merged.find("## [1.0.1]").unwrap();
        let old_idx = merged.find("## [1.0.0]").unwrap();
        assert!(new_idx < old_idx);
        assert!(merged.ends_with("- first\n"));
    }

    #[test]
    fn merge_is_idempotent_for_same_version() {
        let synth = kac();
        let existing = synth.preamble();
        let entry = synth.entry(&v("1.1.0"), date(), &commits(), &[], &[]);
        let once = synth.merge(&existing, &entry);
        let twice = synth.merge(&once, &entry);
        assert_eq!(once, twice);
        assert_eq!(once.matches("## [1.1.0]").count(), 1);
    }

    #[test]
    fn merge_replaces_stale_section_in_place() {
        let synth = conventional();
        let existing = "# a\n\n## [1.0.1] - 2024-02-01\n\n### Bug Fixes\n\n- stale (0000000)\n\n## [1.0.0] - 2024-01-01\n\n- first\n";
        let entry = synth.entry(&v("1.0.1"), date(), &commits()[1..2], &[], &[]);
        let merged = synth.merge(existing, &entry);
        assert!(!merged.contains("stale"));
        assert!(merged.contains("## [1.0.1] - 2024-03-01"));
        assert!(merged.contains("## [1.0.0] - 2024-01-01"));
    }

    #[test]
    fn unreleased_is_read_without_mutation_then_folded() {
        let synth = kac();
        let existing = format!(
            "{}\n### Added\n\n- Manual note\n  spanning lines\n\n### Security\n\n- Patched CVE\n",
            synth.preamble()
        );
        let notes = synth.extract_unreleased(&existing);
        assert_eq!(
            notes,
            vec![
                "### Added",
                "- Manual note",
                "  spanning lines",
                "### Security",
                "- Patched CVE"
            ]
        );

        let entry = synth.entry(&v("1.1.0"), date(), &commits()[..1], &[], &notes);
        let added = entry.section("Added").unwrap();
        assert_eq!(added.items[0], "Manual note\nspanning lines");
        assert_eq!(added.items[1], "**cli:** add --json (aaaaaaa)");
        assert!(entry.section("Security").is_some());

        let cleared = synth.clear_unreleased(&existing);
        let merged = synth.merge(&cleared, &entry);
        assert!(synth.extract_unreleased(&merged).is_empty());
        let unreleased_idx = merged.find("## [Unreleased]").unwrap();
        let version_idx = merged.find("## [1.1.0]").unwrap();
        assert!(unreleased_idx < version_idx);
        assert!(merged.contains("  spanning lines"));
    }

    #[test]
    fn validates_missing_and_malformed_changelogs() {
        let synth = kac();
        assert!(synth.validate(None, false).is_empty());
        assert_eq!(synth.validate(None, true), vec!["changelog is missing"]);

        let bad = "# a\n\n## [Unreleased]\n\n## [next] - 2024-01-01\n";
        let problems = synth.validate(Some(bad), true);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("'next'"));

        let no_unreleased = "# a\n\n## [1.0.0] - 2024-01-01\n";
        assert_eq!(synth.validate(Some(no_unreleased), true).len(), 1);
        assert!(conventional().validate(Some(no_unreleased), true).is_empty());

        let untitled = "## 1.0.0\n";
        assert_eq!(conventional().validate(Some(untitled), false).len(), 1);
    }

    #[test]
    fn parses_format_names() {
        assert_eq!(
            "keep-a-changelog".parse::<ChangelogFormat>(),
            Ok(ChangelogFormat::KeepAChangelog)
        );
        assert!("rst".parse::<ChangelogFormat>().is_err());
    }
}
