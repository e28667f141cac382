use crate::cli::PublishArgs;
use crate::errors::Result;
use crate::ui;
use crate::workspace::Workspace;
use cadence_core::PublishStatus;
use std::process::ExitCode;

pub async fn run(ws: &Workspace, args: &PublishArgs) -> Result<ExitCode> {
    let results = ws.context().publish_only(&ws.root, &args.packages).await?;

    let mut failed = false;
    for result in &results {
        let label = format!("{}@{}", result.package, result.version);
        match &result.status {
            PublishStatus::Published => ui::log_success_value("Published", &label),
            PublishStatus::AlreadyPublished => println!("  {label}: already published"),
            PublishStatus::Private => println!("  {label}: private, skipped"),
            PublishStatus::Failed(err) => {
                failed = true;
                ui::log_error(&format!("{label}: {err}"));
            }
        }
    }

    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
