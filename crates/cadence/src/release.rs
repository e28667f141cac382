use crate::cli::ReleaseArgs;
use crate::errors::{CliError, Result};
use crate::plan::print_plans;
use crate::release_options;
use crate::ui;
use crate::validate::print_check;
use crate::workspace::Workspace;
use cadence_core::{CheckOutcome, DryRunReport, PackageOutcome, ReleaseSummary};
use std::process::ExitCode;

pub async fn run(ws: &Workspace, args: &ReleaseArgs) -> Result<ExitCode> {
    let mut options = release_options(&args.packages, &args.versions, Some(&args.checks));
    options.dry_run = args.dry_run;
    options.force = args.force;
    let ctx = ws.context();

    if !args.dry_run && !args.yes {
        let plan = ctx.plan(&ws.root, &options).await?;
        if plan.plans.is_empty() {
            println!("Nothing to release.");
            return Ok(ExitCode::SUCCESS);
        }
        print_plans(&plan.plans);
        if !ui::confirm("Release these packages?")? {
            return Err(CliError::Cancelled);
        }
    }

    let summary = ctx.release(&ws.root, &options).await?;
    if summary.plans.is_empty() {
        println!("Nothing to release.");
        return Ok(ExitCode::SUCCESS);
    }
    if args.dry_run || args.yes {
        print_plans(&summary.plans);
    }
    for report in &summary.checks {
        if matches!(report.outcome, CheckOutcome::Warning(_)) {
            print_check(report);
        }
    }

    report_outcomes(&summary);
    Ok(exit_code(&summary))
}

fn report_outcomes(summary: &ReleaseSummary) {
    for outcome in &summary.outcomes {
        match outcome {
            PackageOutcome::DryRun(report) => print_dry_run(report),
            PackageOutcome::Released(released) => {
                let mut done = vec!["committed".to_string(), format!("tagged {}", released.tag)];
                if released.pushed {
                    done.push("pushed".into());
                }
                if released.published {
                    done.push("published".into());
                }
                ui::log_success_list(
                    &format!("{}@{}", released.package, released.version),
                    &done,
                );
                for warning in &released.warnings {
                    ui::log_warning(warning);
                }
            }
            PackageOutcome::Failed {
                package,
                step,
                error,
            } => {
                ui::log_error(&format!("{package} failed at {step}: {error}"));
                if error.is_recoverable() {
                    ui::log_hint("Fix the problem above and re-run the release.");
                }
            }
        }
    }
}

fn print_dry_run(report: &DryRunReport) {
    println!();
    ui::log_success_value(
        &report.package,
        &format!("{} -> {} (dry run)", report.from_version, report.to_version),
    );
    println!("  commit:  {}", report.commit_message);
    let tag_note = if report.replaces_tag {
        " (replaces the existing tag)"
    } else {
        ""
    };
    println!("  tag:     {}{tag_note}", report.tag);
    println!("  push:    {}", if report.would_push { "yes" } else { "no" });
    println!(
        "  publish: {}",
        if report.would_publish { "yes" } else { "no" }
    );
    if !report.pack_files.is_empty() {
        println!("  files:   {}", ui::join_or_placeholder(&report.pack_files));
    }
    for warning in &report.warnings {
        ui::log_warning(warning);
    }
    ui::print_diff(&report.manifest_diff);
    ui::print_diff(&report.changelog_diff);
}

fn exit_code(summary: &ReleaseSummary) -> ExitCode {
    let mut failures = summary.failures().peekable();
    if failures.peek().is_none() {
        return ExitCode::SUCCESS;
    }
    let partial = failures.any(|outcome| {
        matches!(outcome, PackageOutcome::Failed { error, .. } if error.is_partial_failure())
    });
    ExitCode::from(if partial { 2 } else { 1 })
}
