use crate::cli::ChangelogArgs;
use crate::errors::Result;
use crate::release_options;
use crate::workspace::Workspace;
use std::process::ExitCode;

pub async fn run(ws: &Workspace, args: &ChangelogArgs) -> Result<ExitCode> {
    let options = release_options(&[], &[], None);
    let text = ws
        .context()
        .preview_changelog(&ws.root, &args.package, &options, args.unreleased)
        .await?;
    if text.is_empty() {
        println!("No Unreleased notes for {}.", args.package);
    } else {
        println!("{}", text.trim_end());
    }
    Ok(ExitCode::SUCCESS)
}
