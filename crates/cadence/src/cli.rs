use cadence_core::CheckName;
use clap::{Args, Parser, Subcommand};
use semver::Version;
use std::path::PathBuf;

/// Cadence CLI – version, changelog, tag and publish JavaScript monorepo packages
#[derive(Debug, Parser)]
#[command(name = "cadence", version, about, long_about = None)]
pub struct Cli {
    /// Workspace root (defaults to the nearest workspace above the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Verbose logging, same as RUST_LOG=debug
    #[arg(long, global = true)]
    pub debug: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bump versions, write changelogs, commit, tag, push and publish
    Release(ReleaseArgs),

    /// Show the planned version bumps without touching anything
    Plan(PlanArgs),

    /// Run the pre-release checks and report every result
    Validate(ValidateArgs),

    /// Print the next changelog section of a package
    Changelog(ChangelogArgs),

    /// Publish already-tagged packages, e.g. after a failed publish step
    Publish(PublishArgs),
}

#[derive(Debug, Args, Default)]
pub struct CheckArgs {
    /// Run only these checks
    #[arg(long, num_args = 1.., value_name = "CHECK")]
    pub only: Vec<CheckName>,

    /// Skip these checks
    #[arg(long, num_args = 1.., value_name = "CHECK")]
    pub skip: Vec<CheckName>,
}

#[derive(Debug, Args, Default)]
#[command(after_long_help = "\
Examples:\n  cadence release --dry-run\n  cadence release pkg-a --version pkg-a=2.0.0 --yes\n\nBehavior:\n  - Packages are released in dependency order, one commit and tag each.\n  - A package whose dependency failed is skipped.\n  - Push and publish failures are reported with the state left behind; nothing is rolled back.")]
pub struct ReleaseArgs {
    /// Packages to release (defaults to every package with changes)
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Dry-run: show what would happen without writing, committing or publishing
    #[arg(long)]
    pub dry_run: bool,

    /// Replace release tags that already exist
    #[arg(long)]
    pub force: bool,

    /// Explicit version for a package, skipping commit classification
    #[arg(long = "version", value_name = "PACKAGE=VERSION", value_parser = parse_version_override)]
    pub versions: Vec<(String, Version)>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    #[command(flatten)]
    pub checks: CheckArgs,
}

#[derive(Debug, Args, Default)]
pub struct PlanArgs {
    /// Packages to plan (defaults to every package with changes)
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Explicit version for a package
    #[arg(long = "version", value_name = "PACKAGE=VERSION", value_parser = parse_version_override)]
    pub versions: Vec<(String, Version)>,
}

#[derive(Debug, Args, Default)]
pub struct ValidateArgs {
    /// Packages to validate (defaults to every package with changes)
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,

    #[command(flatten)]
    pub checks: CheckArgs,
}

#[derive(Debug, Args)]
pub struct ChangelogArgs {
    /// Package whose changelog to render
    pub package: String,

    /// Print the pending Unreleased notes instead
    #[arg(long)]
    pub unreleased: bool,
}

#[derive(Debug, Args, Default)]
pub struct PublishArgs {
    /// Packages to publish (defaults to every public package)
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<String>,
}

/// Parses `name=1.2.3`. Scoped names keep their leading `@`.
pub fn parse_version_override(value: &str) -> Result<(String, Version), String> {
    let (name, version) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected PACKAGE=VERSION, got '{value}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing package name in '{value}'"));
    }
    let version = Version::parse(version.trim().trim_start_matches('v'))
        .map_err(|e| format!("invalid version in '{value}': {e}"))?;
    Ok((name.to_string(), version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_with_everything() {
        let cli = Cli::try_parse_from([
            "cadence",
            "release",
            "pkg-a",
            "@scope/b",
            "--dry-run",
            "--force",
            "--version",
            "pkg-a=2.0.0",
            "--skip",
            "upstream",
            "registry-auth",
            "-y",
        ])
        .unwrap();
        match cli.command {
            Commands::Release(args) => {
                assert_eq!(args.packages, vec!["pkg-a", "@scope/b"]);
                assert!(args.dry_run);
                assert!(args.force);
                assert!(args.yes);
                assert_eq!(
                    args.versions,
                    vec![("pkg-a".to_string(), Version::new(2, 0, 0))]
                );
                assert_eq!(
                    args.checks.skip,
                    vec![CheckName::Upstream, CheckName::RegistryAuth]
                );
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn release_defaults_to_all_packages() {
        let cli = Cli::try_parse_from(["cadence", "release"]).unwrap();
        match cli.command {
            Commands::Release(args) => {
                assert!(args.packages.is_empty());
                assert!(!args.dry_run);
                assert!(args.versions.is_empty());
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_check() {
        assert!(Cli::try_parse_from(["cadence", "validate", "--only", "lint"]).is_err());
    }

    #[test]
    fn parses_validate_only() {
        let cli = Cli::try_parse_from(["cadence", "validate", "--only", "branch"]).unwrap();
        match cli.command {
            Commands::Validate(args) => assert_eq!(args.checks.only, vec![CheckName::Branch]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_changelog_unreleased() {
        let cli = Cli::try_parse_from(["cadence", "changelog", "pkg-a", "--unreleased"]).unwrap();
        match cli.command {
            Commands::Changelog(args) => {
                assert_eq!(args.package, "pkg-a");
                assert!(args.unreleased);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli =
            Cli::try_parse_from(["cadence", "publish", "pkg-a", "--cwd", "/repo", "--debug"])
                .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.cwd, Some(PathBuf::from("/repo")));
        match cli.command {
            Commands::Publish(args) => assert_eq!(args.packages, vec!["pkg-a"]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn version_override_parsing() {
        assert_eq!(
            parse_version_override("@scope/a=v1.2.3").unwrap(),
            ("@scope/a".to_string(), Version::new(1, 2, 3))
        );
        assert!(parse_version_override("a").is_err());
        assert!(parse_version_override("=1.0.0").is_err());
        assert!(parse_version_override("a=next").is_err());
    }
}
