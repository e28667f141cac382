//! Markdown helpers shared by the changelog renderers.

/// Format a Markdown list item for a changelog line.
///
/// Continuation lines are indented by two spaces so they stay part of the same
/// item, which also nests any list the message carries. Always ends with a newline.
pub fn format_markdown_list_item(message: &str) -> String {
    let mut out = String::new();
    let mut lines = message.lines();
    let Some(first) = lines.next() else {
        out.push_str("- \n");
        return out;
    };
    out.push_str("- ");
    out.push_str(first);
    out.push('\n');

    for line in lines {
        if line.trim().is_empty() {
            out.push('\n');
            continue;
        }
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }

    out
}

/// Compose a Markdown message with a prefix and suffix.
///
/// When the message ends with a code fence the suffix goes on its own line.
pub fn compose_markdown_with_affixes(message: &str, prefix: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return format!("{prefix}{message}");
    }

    if message.trim_end().ends_with("```") {
        format!("{prefix}{message}\n{suffix}")
    } else {
        format!("{prefix}{message}{suffix}")
    }
}

/// Short form of a commit hash used in rendered lines.
pub fn short_hash(hash: &str) -> &str {
    match hash.char_indices().nth(7) {
        Some((idx, _)) => &hash[..idx],
        None => hash,
    }
}
