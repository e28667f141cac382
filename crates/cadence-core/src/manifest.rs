//! `package.json` parsing and in-place edits.
//!
//! Edits never re-serialize the document: the version and dependency values are
//! located as byte spans in the original text and replaced there, so key order,
//! indentation and unrelated fields are left exactly as the author wrote them.

use crate::errors::{CadenceError, Result, WorkspaceError};
use crate::types::{Package, RangeUpdate};
use semver::Version;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use serde_json::value::RawValue;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const DEPENDENCY_SECTIONS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

/// Builds a [`Package`] from the manifest text found in `dir`.
pub fn parse_package(root: &Path, dir: &Path, text: &str) -> Result<Package> {
    let manifest_path = dir.join("package.json");
    let manifest: JsonValue = serde_json::from_str(text).map_err(|e| {
        WorkspaceError::InvalidManifest(format!("{}: {}", manifest_path.display(), e))
    })?;

    let name = manifest
        .get("name")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            WorkspaceError::InvalidManifest(format!(
                "missing name field in {}",
                manifest_path.display()
            ))
        })?
        .to_string();

    let raw_version = manifest
        .get("version")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| {
            WorkspaceError::InvalidManifest(format!(
                "missing version field in {}",
                manifest_path.display()
            ))
        })?;
    let version = Version::parse(raw_version.trim()).map_err(|e| {
        WorkspaceError::InvalidManifest(format!(
            "invalid version '{raw_version}' in {}: {e}",
            manifest_path.display()
        ))
    })?;

    let mut dependencies = BTreeMap::new();
    for section in DEPENDENCY_SECTIONS {
        let Some(deps) = manifest.get(section).and_then(JsonValue::as_object) else {
            continue;
        };
        for (dep, spec) in deps {
            if let Some(spec) = spec.as_str() {
                dependencies
                    .entry(dep.clone())
                    .or_insert_with(|| spec.to_string());
            }
        }
    }

    let relative_path = dir
        .strip_prefix(root)
        .unwrap_or(dir)
        .to_string_lossy()
        .replace('\\', "/");

    Ok(Package {
        name,
        path: dir.to_path_buf(),
        relative_path,
        version,
        dependencies,
        private: manifest
            .get("private")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
    })
}

/// Rewrite the `version` field (when given) and the dependency ranges named by
/// `range_updates` in the manifest text `input`.
///
/// A range is only replaced where it still reads `from_range`, in every
/// dependency section that declares it.
pub fn update_manifest(
    manifest_path: &Path,
    input: &str,
    new_version: Option<&Version>,
    range_updates: &[RangeUpdate],
) -> Result<String> {
    #[derive(Deserialize)]
    struct PackageJsonBorrowed<'a> {
        #[serde(borrow)]
        version: Option<&'a RawValue>,
        #[serde(borrow)]
        dependencies: Option<HashMap<String, &'a RawValue>>,
        #[serde(borrow, rename = "devDependencies")]
        dev_dependencies: Option<HashMap<String, &'a RawValue>>,
        #[serde(borrow, rename = "peerDependencies")]
        peer_dependencies: Option<HashMap<String, &'a RawValue>>,
        #[serde(borrow, rename = "optionalDependencies")]
        optional_dependencies: Option<HashMap<String, &'a RawValue>>,
    }

    let invalid = |message: String| {
        CadenceError::Workspace(WorkspaceError::InvalidManifest(format!(
            "{}: {message}",
            manifest_path.display()
        )))
    };

    let borrowed: PackageJsonBorrowed =
        serde_json::from_str(input).map_err(|e| invalid(format!("failed to parse: {e}")))?;

    let mut replacements: Vec<(usize, usize, String)> = Vec::new();

    if let Some(target) = new_version {
        let raw = borrowed
            .version
            .ok_or_else(|| invalid("missing a version field".into()))?;
        let current: String = serde_json::from_str(raw.get())
            .map_err(|e| invalid(format!("version field is not a string: {e}")))?;
        if current != target.to_string() {
            let (start, end) = raw_span(raw, input)?;
            replacements.push((start, end, json_string(&target.to_string())?));
        }
    }

    let sections = [
        borrowed.dependencies.as_ref(),
        borrowed.dev_dependencies.as_ref(),
        borrowed.peer_dependencies.as_ref(),
        borrowed.optional_dependencies.as_ref(),
    ];
    for update in range_updates {
        for map in sections.iter().flatten() {
            let Some(raw) = map.get(update.dependency.as_str()) else {
                continue;
            };
            let current: String = serde_json::from_str(raw.get()).map_err(|e| {
                invalid(format!(
                    "specifier for '{}' is not a string: {e}",
                    update.dependency
                ))
            })?;
            if current == update.from_range && current != update.to_range {
                let (start, end) = raw_span(raw, input)?;
                replacements.push((start, end, json_string(&update.to_range)?));
            }
        }
    }

    replacements.sort_by_key(|(start, _, _)| *start);
    let mut output = input.to_string();
    for (start, end, replacement) in replacements.into_iter().rev() {
        output.replace_range(start..end, &replacement);
    }
    Ok(output)
}

fn json_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Byte span of a `RawValue` within the JSON source it was borrowed from.
fn raw_span(raw: &RawValue, source: &str) -> Result<(usize, usize)> {
    let slice = raw.get();
    let base = source.as_ptr() as usize;
    let start = (slice.as_ptr() as usize)
        .checked_sub(base)
        .filter(|start| start + slice.len() <= source.len())
        .ok_or_else(|| {
            CadenceError::InvalidData("JSON value is not part of the manifest source".into())
        })?;
    Ok((start, start + slice.len()))
}
