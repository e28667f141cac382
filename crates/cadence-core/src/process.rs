use crate::errors::{CadenceError, Result};
use std::path::Path;
use tokio::process::Command;

/// Creates a `Command` that can resolve `.cmd` and `.bat` scripts on Windows.
///
/// npm, pnpm and yarn ship as batch scripts on Windows, which `Command` does not
/// resolve through PATHEXT, so the invocation goes through `cmd.exe /C` there.
pub fn command(program: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", program]);
        cmd
    } else {
        Command::new(program)
    }
}

/// Runs `program args..` in `cwd` and returns its stdout, or an
/// [`CadenceError::ExternalCommand`] carrying stderr when it exits non-zero.
pub async fn run(program: &str, args: &[&str], cwd: &Path) -> Result<String> {
    let rendered = render(program, args);
    tracing::debug!(command = %rendered, cwd = %cwd.display(), "running");

    let output = command(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| CadenceError::external(&rendered, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        };
        return Err(CadenceError::external(rendered, message));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Like [`run`] but returns stdout whatever the exit status, for tools such as
/// `npm outdated` that exit non-zero to report findings.
pub async fn run_unchecked(program: &str, args: &[&str], cwd: &Path) -> Result<String> {
    let rendered = render(program, args);
    tracing::debug!(command = %rendered, cwd = %cwd.display(), "running");

    let output = command(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .map_err(|e| CadenceError::external(&rendered, e.to_string()))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
