mod changelog;
mod cli;
mod errors;
mod plan;
mod publish;
mod release;
mod ui;
mod validate;
mod workspace;

use cadence_core::{CheckSelection, ReleaseOptions};
use clap::Parser;
use cli::{CheckArgs, Cli, Commands};
use errors::CliError;
use semver::Version;
use std::process::ExitCode;
use workspace::Workspace;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            ui::log_error(&format!("Failed to start the async runtime: {e}"));
            return ExitCode::from(1);
        }
    };

    let ws = match Workspace::open(cli.cwd.as_deref()) {
        Ok(ws) => ws,
        Err(e) => {
            ui::log_error(&format!("Failed to open workspace: {e}"));
            return ExitCode::from(e.exit_code());
        }
    };

    let result = runtime.block_on(async {
        match &cli.command {
            Commands::Release(args) => release::run(&ws, args).await,
            Commands::Plan(args) => plan::run(&ws, args).await,
            Commands::Validate(args) => validate::run(&ws, args).await,
            Commands::Changelog(args) => changelog::run(&ws, args).await,
            Commands::Publish(args) => publish::run(&ws, args).await,
        }
    });

    match result {
        Ok(code) => code,
        Err(CliError::Cancelled) => {
            ui::log_warning("Release cancelled, nothing was changed.");
            ExitCode::from(1)
        }
        Err(e) => {
            ui::log_error(&e.to_string());
            ExitCode::from(e.exit_code())
        }
    }
}

/// `--debug` wins over `RUST_LOG`; otherwise only warnings are shown.
fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("cadence=debug,cadence_core=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Per-invocation options, dated today.
pub(crate) fn release_options(
    packages: &[String],
    versions: &[(String, Version)],
    checks: Option<&CheckArgs>,
) -> ReleaseOptions {
    let mut options = ReleaseOptions::new(chrono::Local::now().date_naive());
    options.targets = packages.to_vec();
    options.overrides = versions.iter().cloned().collect();
    if let Some(checks) = checks {
        options.checks = CheckSelection {
            only: checks.only.clone(),
            skip: checks.skip.clone(),
        };
    }
    options
}
