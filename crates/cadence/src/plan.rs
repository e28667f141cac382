use crate::cli::PlanArgs;
use crate::errors::Result;
use crate::release_options;
use crate::workspace::Workspace;
use cadence_core::VersionBumpPlan;
use std::process::ExitCode;

pub async fn run(ws: &Workspace, args: &PlanArgs) -> Result<ExitCode> {
    let options = release_options(&args.packages, &args.versions, None);
    let plan = ws.context().plan(&ws.root, &options).await?;
    if plan.plans.is_empty() {
        println!("Nothing to release.");
    } else {
        print_plans(&plan.plans);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn print_plans(plans: &[VersionBumpPlan]) {
    println!("Planned releases:");
    for plan in plans {
        println!(
            "  {}: {} -> {} ({}, {})",
            plan.package, plan.from_version, plan.to_version, plan.bump, plan.reason
        );
        for update in &plan.range_updates {
            println!(
                "      {} {} -> {}",
                update.dependency, update.from_range, update.to_range
            );
        }
    }
}
