use crate::cli::ValidateArgs;
use crate::errors::Result;
use crate::release_options;
use crate::ui;
use crate::workspace::Workspace;
use cadence_core::{CheckOutcome, CheckReport};
use std::process::ExitCode;

pub async fn run(ws: &Workspace, args: &ValidateArgs) -> Result<ExitCode> {
    let options = release_options(&args.packages, &[], Some(&args.checks));
    let summary = ws.context().validate(&ws.root, &options).await?;

    for report in &summary.checks {
        print_check(report);
    }
    for (package, problems) in &summary.changelog_problems {
        for problem in problems {
            ui::log_warning(&format!("changelog [{package}]: {problem}"));
        }
    }

    if summary.is_success() {
        ui::log_success_value("Validation", "all checks passed");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

pub fn print_check(report: &CheckReport) {
    let label = match &report.package {
        Some(package) => format!("{} [{package}]", report.check),
        None => report.check.to_string(),
    };
    match &report.outcome {
        CheckOutcome::Passed => ui::log_success_value(&label, "ok"),
        CheckOutcome::Skipped(reason) => println!("  {label}: skipped ({reason})"),
        CheckOutcome::Warning(message) => ui::log_warning(&format!("{label}: {message}")),
        CheckOutcome::Failed(err) => ui::log_error(&format!("{label}: {err}")),
    }
}
