use crate::errors::Result;
use cadence_core::config::CONFIG_DIR;
use cadence_core::{
    Config, FsChangelogStore, FsManifestStore, NpmRegistry, ReleaseContext, SystemGit,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Nearest ancestor of `start` that looks like a workspace root: it holds the
/// Cadence config, a `pnpm-workspace.yaml`, or a `package.json` declaring
/// `workspaces`. Falls back to `start` itself.
pub fn find_root(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| is_workspace_root(dir))
        .unwrap_or(start)
        .to_path_buf()
}

fn is_workspace_root(dir: &Path) -> bool {
    if dir.join(CONFIG_DIR).is_dir() || dir.join("pnpm-workspace.yaml").is_file() {
        return true;
    }
    fs::read_to_string(dir.join("package.json"))
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        .is_some_and(|manifest| manifest.get("workspaces").is_some())
}

/// Concrete adapters rooted at one workspace.
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    git: SystemGit,
    registry: NpmRegistry,
    manifests: FsManifestStore,
    changelogs: FsChangelogStore,
}

impl Workspace {
    pub fn open(cwd: Option<&Path>) -> Result<Self> {
        let start = match cwd {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let root = find_root(&start);
        let config = Config::load(&root)?;
        debug!(root = %root.display(), strategy = ?config.strategy, "opened workspace");
        Ok(Self {
            git: SystemGit::new(&root),
            registry: NpmRegistry::new(&root)?,
            manifests: FsManifestStore::new(&root),
            changelogs: FsChangelogStore,
            config,
            root,
        })
    }

    pub fn context(
        &self,
    ) -> ReleaseContext<'_, SystemGit, NpmRegistry, FsManifestStore, FsChangelogStore> {
        ReleaseContext::new(
            &self.git,
            &self.registry,
            &self.manifests,
            &self.changelogs,
            &self.config,
        )
    }
}
