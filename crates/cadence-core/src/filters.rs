use crate::types::{Package, Workspace};

/// True when `package` matches one of the ignore `patterns`, by name or by
/// workspace-relative path.
pub fn is_ignored(patterns: &[String], package: &Package) -> bool {
    patterns.iter().any(|pat| {
        wildcard_match(pat, &package.name) || wildcard_match(pat, &package.relative_path)
    })
}

/// A copy of `workspace` without the ignored members.
pub fn filter_members(workspace: &Workspace, patterns: &[String]) -> Workspace {
    Workspace {
        root: workspace.root.clone(),
        members: workspace
            .members
            .iter()
            .filter(|p| !is_ignored(patterns, p))
            .cloned()
            .collect(),
    }
}

/// Anchored, case-sensitive match where `*` stands for any sequence.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return true,
    };
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };

    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle.iter().filter(|p| !p.is_empty()) {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}
