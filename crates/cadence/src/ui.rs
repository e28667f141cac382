use crate::errors::Result;
use dialoguer::{
    Confirm,
    console::{Style, style},
    theme::ColorfulTheme,
};

pub const SUCCESS_PREFIX: &str = "✔";
pub const WARNING_PREFIX: &str = "⚠";
pub const ERROR_PREFIX: &str = "✖";
pub const HINT_PREFIX: &str = "💡";
const EMPTY_SELECTION_PLACEHOLDER: &str = "(none)";

pub fn log_success_value(label: &str, value: &str) {
    let theme = success_output_theme();
    let line = format!(
        "{} {}{} {}",
        theme.success_prefix.clone(),
        theme.prompt_style.apply_to(label),
        theme.success_suffix.clone(),
        theme.values_style.apply_to(value),
    );
    println!("{line}");
}

pub fn log_success_list(label: &str, items: &[String]) {
    log_success_value(label, &join_or_placeholder(items));
}

pub fn log_warning(message: &str) {
    let prefix = style(WARNING_PREFIX.to_string()).for_stderr().yellow();
    let message_style = Style::new().for_stderr().yellow();
    eprintln!("{} {}", prefix, message_style.apply_to(message));
}

pub fn log_error(message: &str) {
    let prefix = style(ERROR_PREFIX.to_string()).for_stderr().red();
    let message_style = Style::new().for_stderr().red();
    eprintln!("{} {}", prefix, message_style.apply_to(message));
}

/// Prints a hint message to stderr with a distinct visual style.
pub fn log_hint(message: &str) {
    let prefix = style(HINT_PREFIX.to_string()).for_stderr().yellow();
    let message_style = Style::new().for_stderr().yellow();
    eprintln!("{} {}", prefix, message_style.apply_to(message));
}

/// Prints a unified diff, coloring added and removed lines.
pub fn print_diff(diff: &str) {
    for line in diff.lines() {
        let styled = if line.starts_with("+++") || line.starts_with("---") {
            style(line).bold()
        } else if line.starts_with('+') {
            style(line).green()
        } else if line.starts_with('-') {
            style(line).red()
        } else if line.starts_with("@@") {
            style(line).cyan()
        } else {
            style(line)
        };
        println!("{styled}");
    }
}

pub fn prompt_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("🧭".to_string()).cyan(),
        prompt_style: Style::new().for_stderr(),
        success_prefix: style(SUCCESS_PREFIX.to_string()).for_stderr(),
        success_suffix: style(":".to_string()).for_stderr(),
        values_style: Style::new().for_stderr(),
        ..ColorfulTheme::default()
    }
}

fn success_output_theme() -> ColorfulTheme {
    let mut theme = prompt_theme();
    theme.success_prefix = theme.success_prefix.clone().for_stdout();
    theme.success_suffix = theme.success_suffix.clone().for_stdout();
    theme.prompt_style = theme.prompt_style.clone().for_stdout();
    theme.values_style = theme.values_style.clone().for_stdout();
    theme
}

pub fn confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::with_theme(&prompt_theme())
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

pub fn join_or_placeholder(items: &[String]) -> String {
    if items.is_empty() {
        EMPTY_SELECTION_PLACEHOLDER.to_string()
    } else {
        items.join(", ")
    }
}
