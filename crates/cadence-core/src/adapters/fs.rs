//! On-disk manifest and changelog stores, with npm / pnpm / yarn workspace discovery.

use crate::adapters::{ChangelogStore, ManifestStore};
use crate::errors::{Result, WorkspaceError, io_error_with_path};
use crate::manifest::parse_package;
use crate::types::Package;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Reads `package.json` files below a workspace root.
#[derive(Debug, Clone)]
pub struct FsManifestStore {
    root: PathBuf,
}

impl FsManifestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ManifestStore for FsManifestStore {
    fn read_package_json(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path).map_err(|e| io_error_with_path(e, path))?)
    }

    fn write_package_json(&self, path: &Path, contents: &str) -> Result<()> {
        Ok(fs::write(path, contents).map_err(|e| io_error_with_path(e, path))?)
    }

    fn list_workspace_packages(&self) -> Result<Vec<Package>> {
        let dirs = discover_package_dirs(&self.root)?;
        let mut packages = Vec::with_capacity(dirs.len());
        let mut seen = BTreeSet::new();
        for dir in dirs {
            let manifest_path = dir.join("package.json");
            let text = self.read_package_json(&manifest_path)?;
            let package = parse_package(&self.root, &dir, &text)?;
            if !seen.insert(package.name.clone()) {
                return Err(WorkspaceError::InvalidWorkspace(format!(
                    "duplicate package name '{}' in {}",
                    package.name,
                    manifest_path.display()
                ))
                .into());
            }
            packages.push(package);
        }
        Ok(packages)
    }
}

/// Directories of every workspace member, root included when it is a named package.
pub fn discover_package_dirs(root: &Path) -> std::result::Result<Vec<PathBuf>, WorkspaceError> {
    let package_json_path = root.join("package.json");
    let root_manifest = if package_json_path.exists() {
        Some(load_package_json(&package_json_path)?)
    } else {
        None
    };

    let mut patterns: BTreeSet<String> = BTreeSet::new();
    if let Some(manifest) = &root_manifest {
        patterns.extend(extract_workspace_patterns(manifest)?);
    }
    patterns.extend(load_pnpm_workspace_patterns(&root.join("pnpm-workspace.yaml"))?);

    if root_manifest.is_none() && patterns.is_empty() {
        return Err(WorkspaceError::NotFound);
    }

    let mut package_dirs: BTreeSet<PathBuf> = BTreeSet::new();
    let (excludes, includes): (Vec<_>, Vec<_>) =
        patterns.iter().partition(|p| p.starts_with('!'));
    for pattern in includes {
        expand_member_pattern(root, pattern, &mut package_dirs)?;
    }
    for pattern in excludes {
        let mut excluded = BTreeSet::new();
        expand_member_pattern(root, &pattern[1..], &mut excluded)?;
        package_dirs.retain(|dir| !excluded.contains(dir));
    }

    let root_is_package = root_manifest
        .as_ref()
        .and_then(|m| m.get("name"))
        .and_then(JsonValue::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if root_is_package && (patterns.is_empty() || is_releasable_root(root_manifest.as_ref())) {
        package_dirs.insert(clean_path(root));
    }

    Ok(package_dirs.into_iter().collect())
}

/// A workspace root is only a member when it is versioned and not private.
fn is_releasable_root(manifest: Option<&JsonValue>) -> bool {
    let Some(manifest) = manifest else {
        return false;
    };
    let versioned = manifest.get("version").and_then(JsonValue::as_str).is_some();
    let private = manifest
        .get("private")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);
    versioned && !private
}

fn load_package_json(path: &Path) -> std::result::Result<JsonValue, WorkspaceError> {
    let text =
        fs::read_to_string(path).map_err(|e| WorkspaceError::Io(io_error_with_path(e, path)))?;
    serde_json::from_str(&text)
        .map_err(|e| WorkspaceError::InvalidManifest(format!("{}: {}", path.display(), e)))
}

/// `workspaces` as an array, or as `{ "packages": [...] }` (yarn classic).
fn extract_workspace_patterns(
    manifest: &JsonValue,
) -> std::result::Result<Vec<String>, WorkspaceError> {
    let items = match manifest.get("workspaces") {
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items,
        Some(JsonValue::Object(map)) => match map.get("packages") {
            None | Some(JsonValue::Null) => return Ok(Vec::new()),
            Some(JsonValue::Array(items)) => items,
            Some(_) => {
                return Err(WorkspaceError::InvalidWorkspace(
                    "workspaces.packages must be an array of strings".into(),
                ));
            }
        },
        Some(_) => {
            return Err(WorkspaceError::InvalidWorkspace(
                "workspaces field must be an array or object".into(),
            ));
        }
    };

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                WorkspaceError::InvalidWorkspace("workspaces entries must be strings".into())
            })
        })
        .collect()
}

fn load_pnpm_workspace_patterns(path: &Path) -> std::result::Result<Vec<String>, WorkspaceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let text =
        fs::read_to_string(path).map_err(|e| WorkspaceError::Io(io_error_with_path(e, path)))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text)
        .map_err(|e| WorkspaceError::InvalidManifest(format!("{}: {}", path.display(), e)))?;

    let Some(packages) = value.get("packages") else {
        return Ok(Vec::new());
    };
    if packages.is_null() {
        return Ok(Vec::new());
    }
    let seq = packages.as_sequence().ok_or_else(|| {
        WorkspaceError::InvalidWorkspace(
            "pnpm-workspace.yaml packages field must be a sequence of strings".into(),
        )
    })?;
    seq.iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                WorkspaceError::InvalidWorkspace(
                    "pnpm-workspace.yaml packages entries must be strings".into(),
                )
            })
        })
        .collect()
}

fn expand_member_pattern(
    root: &Path,
    pattern: &str,
    paths: &mut BTreeSet<PathBuf>,
) -> std::result::Result<(), WorkspaceError> {
    if !(pattern.contains('*') || pattern.contains('?') || pattern.contains('[')) {
        let candidate = clean_path(&root.join(pattern));
        if candidate.join("package.json").exists() {
            paths.insert(candidate);
            return Ok(());
        }
        return Err(WorkspaceError::InvalidWorkspace(format!(
            "workspace member '{pattern}' does not contain package.json"
        )));
    }

    let full_pattern = root.join(pattern);
    let matches = glob::glob(&full_pattern.to_string_lossy()).map_err(|e| {
        WorkspaceError::InvalidWorkspace(format!("invalid workspace pattern '{pattern}': {e}"))
    })?;
    for entry in matches {
        let path = entry.map_err(|e| WorkspaceError::InvalidWorkspace(format!("glob error: {e}")))?;
        if path.components().any(|c| c.as_os_str() == "node_modules") {
            continue;
        }
        if path.is_dir() {
            if path.join("package.json").exists() {
                paths.insert(clean_path(&path));
            }
        } else if path.file_name().is_some_and(|name| name == "package.json")
            && let Some(parent) = path.parent()
        {
            paths.insert(clean_path(parent));
        }
    }
    Ok(())
}

fn clean_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    result.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                ) {
                    result.pop();
                }
            }
            Component::Normal(_) | Component::RootDir | Component::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}

/// Changelog files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsChangelogStore;

impl ChangelogStore for FsChangelogStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error_with_path(e, path).into()),
        }
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        Ok(fs::write(path, contents).map_err(|e| io_error_with_path(e, path))?)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error_with_path(e, path).into()),
        }
    }
}
