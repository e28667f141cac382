use crate::config::Config;
use crate::errors::CadenceError;
use crate::pipeline::{
    DryRunReport, PackageOutcome, PublishStatus, ReleaseContext, ReleaseMode, ReleaseOptions,
    ReleaseStep, ReleaseSummary, ReleasedPackage,
};
use crate::testing::{FakeGit, FakeRegistry, GitOp, MemoryStore};
use crate::types::BumpReason;
use crate::version::BumpStrategy;
use chrono::NaiveDate;
use semver::Version;
use std::path::Path;

const ROOT: &str = "/repo";

fn root() -> &'static Path {
    Path::new(ROOT)
}

fn options() -> ReleaseOptions {
    ReleaseOptions::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
}

fn dry_run_options() -> ReleaseOptions {
    ReleaseOptions {
        dry_run: true,
        ..options()
    }
}

/// `a` and `c` standalone, `b` depending on `a`.
fn workspace() -> MemoryStore {
    MemoryStore::new(ROOT)
        .with_package("a", "1.0.0", &[])
        .with_package("b", "1.0.0", &[("a", "^1.0.0")])
        .with_package("c", "1.0.0", &[])
}

/// One released commit, every package tagged at 1.0.0.
fn released_history() -> FakeGit {
    FakeGit::new()
        .with_commit(
            "chore: initial import",
            &["packages/a/index.js", "packages/b/index.js", "packages/c/index.js"],
        )
        .with_tag("a@1.0.0")
        .with_tag("b@1.0.0")
        .with_tag("c@1.0.0")
}

fn released<'a>(summary: &'a ReleaseSummary, package: &str) -> &'a ReleasedPackage {
    match summary.outcome(package) {
        Some(PackageOutcome::Released(released)) => released,
        other => panic!("expected {package} to be released, got {other:?}"),
    }
}

fn projected<'a>(summary: &'a ReleaseSummary, package: &str) -> &'a DryRunReport {
    match summary.outcome(package) {
        Some(PackageOutcome::DryRun(report)) => report,
        other => panic!("expected a dry-run report for {package}, got {other:?}"),
    }
}

fn failure<'a>(summary: &'a ReleaseSummary, package: &str) -> (ReleaseStep, &'a CadenceError) {
    match summary.outcome(package) {
        Some(PackageOutcome::Failed { step, error, .. }) => (*step, error),
        other => panic!("expected {package} to fail, got {other:?}"),
    }
}

#[tokio::test]
async fn releases_a_patch_from_a_fix_commit() {
    let git = released_history().with_commit("fix: patch bug", &["packages/a/src/x.ts"]);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.mode, ReleaseMode::Live);
    let a = released(&summary, "a");
    assert_eq!(a.version, Version::new(1, 0, 1));
    assert_eq!(a.tag, "a@1.0.1");
    assert!(a.pushed);
    assert!(a.published);

    let manifest = store.file("packages/a/package.json").unwrap();
    assert!(manifest.contains("\"version\": \"1.0.1\""));
    let changelog = store.file("packages/a/CHANGELOG.md").unwrap();
    assert!(changelog.starts_with("# a\n"));
    assert!(changelog.contains("## [1.0.1] - 2024-05-01"));
    assert!(changelog.contains("### Bug Fixes"));
    assert!(changelog.contains("patch bug"));

    assert_eq!(
        git.mutations(),
        vec![
            "add /repo/packages/a/package.json /repo/packages/a/CHANGELOG.md".to_string(),
            "commit chore(release): release a@1.0.1".to_string(),
            "tag a@1.0.1".to_string(),
            "push origin main --follow-tags".to_string(),
        ]
    );
    assert_eq!(registry.published(), vec!["a@1.0.1".to_string()]);
}

#[tokio::test]
async fn breaking_change_cascades_to_dependents() {
    let git = released_history().with_commit("feat!: drop the legacy api", &["packages/a/lib.js"]);
    let registry = FakeRegistry::new();
    let store = workspace();
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    assert!(summary.is_success());
    let order: Vec<_> = summary.plans.iter().map(|p| p.package.as_str()).collect();
    assert_eq!(order, vec!["a", "b"]);
    assert!(summary.plans[1].is_cascaded());
    assert_eq!(
        summary.plans[1].reason,
        BumpReason::Cascaded {
            dependency: "a".into()
        }
    );
    assert_eq!(released(&summary, "a").version, Version::new(2, 0, 0));
    assert_eq!(released(&summary, "b").version, Version::new(1, 0, 1));

    let b_manifest = store.file("packages/b/package.json").unwrap();
    assert!(b_manifest.contains("\"version\": \"1.0.1\""));
    assert!(b_manifest.contains("\"a\": \"^2.0.0\""));
    let b_changelog = store.file("packages/b/CHANGELOG.md").unwrap();
    assert!(b_changelog.contains("Updated dependencies: a@2.0.0"));

    assert_eq!(
        registry.published(),
        vec!["a@2.0.0".to_string(), "b@1.0.1".to_string()]
    );
    assert!(store.file("packages/c/CHANGELOG.md").is_none());
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let git = released_history().with_commit("fix: patch bug", &["packages/a/src/x.ts"]);
    let registry = FakeRegistry::new();
    let store = workspace();
    let config = Config::default();
    let before = store.snapshot();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &dry_run_options()).await.unwrap();

    assert_eq!(summary.mode, ReleaseMode::DryRun);
    assert!(git.mutations().is_empty());
    assert!(store.writes().is_empty());
    assert_eq!(store.snapshot(), before);
    assert!(registry.published().is_empty());
    assert!(!registry.calls().iter().any(|c| c.starts_with("publish")));

    let a = projected(&summary, "a");
    assert_eq!(a.tag, "a@1.0.1");
    assert_eq!(a.commit_message, "chore(release): release a@1.0.1");
    assert!(a.would_push);
    assert!(a.would_publish);
    assert!(!a.replaces_tag);
    assert!(a.changelog_diff.contains("b/packages/a/CHANGELOG.md"));
    assert!(a.changelog_diff.contains("+## [1.0.1] - 2024-05-01"));
    assert!(a.manifest_diff.contains("+  \"version\": \"1.0.1\","));
    assert_eq!(a.pack_files, vec!["package.json", "index.js"]);

    let b = projected(&summary, "b");
    assert!(b.manifest_diff.contains("+    \"a\": \"^1.0.1\""));
}

#[tokio::test]
async fn existing_tag_fails_without_force() {
    let git = released_history()
        .with_commit("fix: patch bug", &["packages/a/src/x.ts"])
        .with_tag("a@1.0.1");
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let config = Config::default();
    let before = store.snapshot();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let mut opts = options();
    opts.overrides.insert("a".into(), Version::new(1, 0, 1));
    let summary = ctx.release(root(), &opts).await.unwrap();

    let (step, err) = failure(&summary, "a");
    assert_eq!(step, ReleaseStep::Tagged);
    assert!(matches!(err, CadenceError::TagExists { .. }));
    let msg = err.to_string();
    assert!(msg.contains("already exists"));
    assert!(msg.contains("git tag -d a@1.0.1"));
    assert!(git.mutations().is_empty());
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn force_replaces_an_existing_tag() {
    let git = released_history()
        .with_commit("fix: patch bug", &["packages/a/src/x.ts"])
        .with_tag("a@1.0.1");
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let mut opts = options();
    opts.force = true;
    opts.overrides.insert("a".into(), Version::new(1, 0, 1));
    let summary = ctx.release(root(), &opts).await.unwrap();

    assert!(summary.is_success());
    let mutations = git.mutations();
    let position = |entry: &str| mutations.iter().position(|m| m == entry).unwrap();
    assert!(position("delete-tag a@1.0.1") < position("tag a@1.0.1"));
    assert!(position("delete-remote-tag a@1.0.1") < position("tag a@1.0.1"));
    assert!(git.local_tags().contains(&"a@1.0.1".to_string()));
}

#[tokio::test]
async fn remote_tag_deletion_failure_is_tolerated() {
    let git = released_history()
        .with_commit("fix: patch bug", &["packages/a/src/x.ts"])
        .with_tag("a@1.0.1");
    git.fail_on(GitOp::DeleteRemoteTag);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let mut config = Config::default();
    config.git.force = true;
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let mut opts = options();
    opts.overrides.insert("a".into(), Version::new(1, 0, 1));
    let summary = ctx.release(root(), &opts).await.unwrap();

    assert!(summary.is_success());
    let mutations = git.mutations();
    assert!(mutations.contains(&"delete-tag a@1.0.1".to_string()));
    assert!(!mutations.iter().any(|m| m.starts_with("delete-remote-tag")));
}

#[tokio::test]
async fn local_tag_deletion_failure_rolls_back_the_commit() {
    let git = released_history()
        .with_commit("fix: patch bug", &["packages/a/src/x.ts"])
        .with_tag("a@1.0.1");
    git.fail_on(GitOp::DeleteTag);
    let head = git.head();
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let before = store.snapshot();
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let mut opts = options();
    opts.force = true;
    opts.overrides.insert("a".into(), Version::new(1, 0, 1));
    let summary = ctx.release(root(), &opts).await.unwrap();

    let (step, err) = failure(&summary, "a");
    assert_eq!(step, ReleaseStep::Tagged);
    assert!(!err.is_partial_failure());
    assert_eq!(git.head(), head);
    assert_eq!(
        git.mutations().last().unwrap(),
        &format!("reset --soft {head}")
    );
    assert_eq!(store.snapshot(), before);
    assert!(registry.published().is_empty());
}

#[tokio::test]
async fn forced_tag_failure_reports_the_deleted_tag() {
    let git = released_history()
        .with_commit("fix: patch bug", &["packages/a/src/x.ts"])
        .with_tag("a@1.0.1");
    let old_target = git.head();
    git.fail_on(GitOp::Tag);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let before = store.snapshot();
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let mut opts = options();
    opts.force = true;
    opts.overrides.insert("a".into(), Version::new(1, 0, 1));
    let summary = ctx.release(root(), &opts).await.unwrap();

    let (step, err) = failure(&summary, "a");
    assert_eq!(step, ReleaseStep::Tagged);
    assert!(err.is_partial_failure());
    let msg = err.to_string();
    assert!(msg.contains(&format!("tag a@1.0.1 deleted (was at {})", &old_target[..7])));
    assert!(msg.contains(&format!("git tag a@1.0.1 {old_target}")));
    assert!(msg.contains("git push origin a@1.0.1"));
    assert!(!git.local_tags().contains(&"a@1.0.1".to_string()));

    // The commit is still rolled back.
    assert_eq!(git.head(), old_target);
    assert_eq!(store.snapshot(), before);
}

#[tokio::test]
async fn head_lookup_failure_after_commit_still_resets() {
    let git = released_history().with_commit("fix: patch bug", &["packages/a/src/x.ts"]);
    git.fail_after_commit(GitOp::HeadCommit);
    let head = git.head();
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let before = store.snapshot();
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    let (step, err) = failure(&summary, "a");
    assert_eq!(step, ReleaseStep::Committed);
    assert!(!err.is_partial_failure());
    assert_eq!(git.head(), head);
    assert_eq!(
        git.mutations().last().unwrap(),
        &format!("reset --soft {head}")
    );
    assert_eq!(store.snapshot(), before);
    assert!(git.local_tags().iter().all(|t| t != "a@1.0.1"));
}

#[tokio::test]
async fn commit_failure_restores_files() {
    let git = released_history().with_commit("fix: patch bug", &["packages/a/src/x.ts"]);
    git.fail_on(GitOp::Commit);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT)
        .with_package("a", "1.0.0", &[])
        .with_file("packages/a/CHANGELOG.md", "# a\n\n## [1.0.0] - 2024-01-01\n\n### Features\n\n- First cut\n");
    let before = store.snapshot();
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    let (step, err) = failure(&summary, "a");
    assert_eq!(step, ReleaseStep::Committed);
    assert!(matches!(err, CadenceError::ExternalCommand { .. }));
    assert_eq!(store.snapshot(), before);
    assert!(!git.mutations().iter().any(|m| m.starts_with("reset")));
}

#[tokio::test]
async fn push_failure_is_a_partial_failure_without_rollback() {
    let git = released_history().with_commit("fix: patch bug", &["packages/a/src/x.ts"]);
    git.fail_on(GitOp::Push);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    let (step, err) = failure(&summary, "a");
    assert_eq!(step, ReleaseStep::Pushed);
    assert!(err.is_partial_failure());
    let msg = err.to_string();
    assert!(msg.contains("tag a@1.0.1 created"));
    assert!(msg.contains("nothing pushed"));
    assert!(msg.contains("git push --follow-tags origin"));
    assert!(git.local_tags().contains(&"a@1.0.1".to_string()));
    assert!(!git.mutations().iter().any(|m| m.starts_with("reset")));
    assert!(registry.published().is_empty());
}

#[tokio::test]
async fn publish_failure_keeps_tag_and_can_be_retried() {
    let git = released_history().with_commit("fix: patch bug", &["packages/a/src/x.ts"]);
    let registry = FakeRegistry::new();
    registry.fail_publish("a");
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    let (step, err) = failure(&summary, "a");
    assert_eq!(step, ReleaseStep::Published);
    let msg = err.to_string();
    assert!(msg.contains("pushed to the remote"));
    assert!(msg.contains("cadence publish a"));
    assert!(git.remote_tags().contains(&"a@1.0.1".to_string()));

    registry.allow_publish("a");
    let results = ctx.publish_only(root(), &["a".to_string()]).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].status, PublishStatus::Published));
    assert_eq!(registry.published(), vec!["a@1.0.1".to_string()]);

    let again = ctx.publish_only(root(), &[]).await.unwrap();
    assert!(matches!(again[0].status, PublishStatus::AlreadyPublished));
}

#[tokio::test]
async fn failed_dependency_fails_its_dependents_only() {
    let git = released_history()
        .with_commit("fix: a bug", &["packages/a/src/x.ts"])
        .with_commit("fix: c bug", &["packages/c/src/y.ts"]);
    let registry = FakeRegistry::new();
    registry.fail_publish("a");
    let store = workspace();
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    assert!(!summary.is_success());
    assert_eq!(failure(&summary, "a").0, ReleaseStep::Published);
    let (step, err) = failure(&summary, "b");
    assert_eq!(step, ReleaseStep::Pending);
    assert!(matches!(
        err,
        CadenceError::DependencyFailed { dependency, .. } if dependency == "a"
    ));
    assert_eq!(released(&summary, "c").version, Version::new(1, 0, 1));
    assert_eq!(summary.failures().count(), 2);
}

#[tokio::test]
async fn version_already_on_registry_fails_validation_only_for_that_package() {
    let git = released_history()
        .with_commit("fix: a bug", &["packages/a/src/x.ts"])
        .with_commit("fix: c bug", &["packages/c/src/y.ts"]);
    let registry = FakeRegistry::new().with_latest("a", "1.0.1");
    let store = workspace();
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    let (step, err) = failure(&summary, "a");
    assert_eq!(step, ReleaseStep::Validated);
    assert!(err.to_string().contains("not newer than the published 1.0.1"));
    assert!(store.file("packages/a/CHANGELOG.md").is_none());
    assert!(matches!(
        failure(&summary, "b").1,
        CadenceError::DependencyFailed { .. }
    ));
    released(&summary, "c");
}

#[tokio::test]
async fn dirty_tree_aborts_before_any_package() {
    let git = released_history()
        .with_commit("fix: patch bug", &["packages/a/src/x.ts"])
        .with_dirty_file(" M packages/a/src/x.ts");
    let registry = FakeRegistry::new();
    let store = workspace();
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let err = ctx.release(root(), &options()).await.unwrap_err();

    assert!(matches!(err, CadenceError::Validation { ref check, .. } if check == "working-tree"));
    assert!(git.mutations().is_empty());
    assert!(store.writes().is_empty());

    let mut skipping = options();
    skipping.checks.skip.push(crate::checks::CheckName::WorkingTree);
    let summary = ctx.release(root(), &skipping).await.unwrap();
    assert!(summary.is_success());
}

#[tokio::test]
async fn fixed_strategy_moves_every_package_together() {
    let git = FakeGit::new()
        .with_commit("chore: initial import", &["packages/a/index.js"])
        .with_tag("a@1.0.0")
        .with_tag("c@1.2.0")
        .with_commit("feat(a): add streaming", &["packages/a/stream.js"]);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT)
        .with_package("a", "1.0.0", &[])
        .with_package("c", "1.2.0", &[]);
    let mut config = Config::default();
    config.strategy = BumpStrategy::Fixed;
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(released(&summary, "a").version, Version::new(1, 3, 0));
    assert_eq!(released(&summary, "c").version, Version::new(1, 3, 0));
    let c_changelog = store.file("packages/c/CHANGELOG.md").unwrap();
    assert!(c_changelog.contains("## [1.3.0] - 2024-05-01"));
    assert!(c_changelog.contains("Version bump only"));
}

#[tokio::test]
async fn unreleased_notes_move_into_the_new_version() {
    let git = released_history().with_commit("fix: patch bug", &["packages/a/src/x.ts"]);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT)
        .with_package("a", "1.0.0", &[])
        .with_file(
            "packages/a/CHANGELOG.md",
            "# a\n\n## [Unreleased]\n\n- Document the retry flag\n\n## [1.0.0] - 2024-01-01\n\n### Features\n\n- First cut\n",
        );
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    ctx.release(root(), &options()).await.unwrap();

    let changelog = store.file("packages/a/CHANGELOG.md").unwrap();
    let unreleased = changelog.find("## [Unreleased]").unwrap();
    let new_section = changelog.find("## [1.0.1]").unwrap();
    let note = changelog.find("Document the retry flag").unwrap();
    let previous = changelog.find("## [1.0.0]").unwrap();
    assert!(unreleased < new_section);
    assert!(new_section < note && note < previous);
    assert_eq!(changelog.matches("Document the retry flag").count(), 1);
}

#[tokio::test]
async fn private_packages_are_tagged_but_not_published() {
    let git = released_history().with_commit("fix: patch bug", &["packages/a/src/x.ts"]);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT).with_manifest(
        "packages/a",
        "{\n  \"name\": \"a\",\n  \"version\": \"1.0.0\",\n  \"private\": true\n}\n",
    );
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.release(root(), &options()).await.unwrap();

    let a = released(&summary, "a");
    assert!(!a.published);
    assert!(git.local_tags().contains(&"a@1.0.1".to_string()));
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn plan_honors_targets_and_ignore_patterns() {
    let git = released_history()
        .with_commit("fix: a bug", &["packages/a/src/x.ts"])
        .with_commit("fix: c bug", &["packages/c/src/y.ts"]);
    let registry = FakeRegistry::new();
    let store = workspace();
    let mut config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let mut only_c = options();
    only_c.targets = vec!["c".into()];
    let plan = ctx.plan(root(), &only_c).await.unwrap();
    let names: Vec<_> = plan.plans.iter().map(|p| p.package.as_str()).collect();
    assert_eq!(names, vec!["c"]);

    let mut unknown = options();
    unknown.targets = vec!["zeta".into()];
    let err = ctx.plan(root(), &unknown).await.unwrap_err();
    assert!(matches!(err, CadenceError::Configuration(_)));

    config.ignore = vec!["packages/c".into()];
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);
    let plan = ctx.plan(root(), &options()).await.unwrap();
    let names: Vec<_> = plan.plans.iter().map(|p| p.package.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn cyclic_workspace_is_a_configuration_error() {
    let git = released_history().with_commit("fix: a bug", &["packages/a/src/x.ts"]);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT)
        .with_package("a", "1.0.0", &[("b", "^1.0.0")])
        .with_package("b", "1.0.0", &[("a", "^1.0.0")]);
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let err = ctx.release(root(), &options()).await.unwrap_err();

    assert!(matches!(err, CadenceError::Configuration(_)));
    assert!(err.to_string().contains("cycle"));
    assert!(git.mutations().is_empty());
}

#[tokio::test]
async fn previews_the_next_changelog_section() {
    let git = released_history().with_commit("feat(cli): add --json output", &["packages/a/cli.js"]);
    let registry = FakeRegistry::new();
    let store = MemoryStore::new(ROOT)
        .with_package("a", "1.0.0", &[])
        .with_file(
            "packages/a/CHANGELOG.md",
            "# a\n\n## [Unreleased]\n\n- Faster startup\n",
        );
    let config = Config::default();
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let section = ctx
        .preview_changelog(root(), "a", &options(), false)
        .await
        .unwrap();
    assert!(section.starts_with("## [1.1.0] - 2024-05-01\n"));
    assert!(section.contains("**cli:** add --json output"));
    assert!(section.contains("Faster startup"));

    let notes = ctx
        .preview_changelog(root(), "a", &options(), true)
        .await
        .unwrap();
    assert_eq!(notes, "- Faster startup");
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn validate_reports_checks_and_changelog_problems() {
    let git = released_history()
        .with_commit("fix: patch bug", &["packages/a/src/x.ts"])
        .with_branch("feature/x");
    let registry = FakeRegistry::new().with_outdated("a", "react", "18.2.0", "19.0.0");
    let store = MemoryStore::new(ROOT).with_package("a", "1.0.0", &[]);
    let mut config = Config::default();
    config.changelog.required = true;
    let ctx = ReleaseContext::new(&git, &registry, &store, &store, &config);

    let summary = ctx.validate(root(), &options()).await.unwrap();

    assert!(!summary.is_success());
    assert!(
        summary
            .checks
            .iter()
            .any(|r| r.is_failure() && r.check == crate::checks::CheckName::Branch)
    );
    assert_eq!(
        summary.changelog_problems.get("a"),
        Some(&vec!["changelog is missing".to_string()])
    );
    assert!(git.mutations().is_empty());
}
