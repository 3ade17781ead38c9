//! Canonical repo service (component C10).
//!
//! Manages the shared bare-ish clones under `projects_root` that every
//! workspace's worktrees are created from. Repos are shared *by name*
//! (spec section 9's "pointer graph vs identity" note): this service
//! never holds a reference to a clone, it only asks
//! [`crate::storage::WorkspaceStorage`] which active workspaces currently
//! reference a name before allowing a removal.

use canopy_git::{CancelToken, GitAdapter};

use crate::disk_usage::DiskUsageCache;
use crate::error::CanopyError;
use crate::storage::WorkspaceStorage;

/// A preview of what removing a canonical repo would affect, without
/// mutating anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovePreview {
    pub name: String,
    pub path: std::path::PathBuf,
    pub disk_usage_bytes: u64,
    pub workspaces_affected: Vec<String>,
}

/// Add/remove/sync canonical clones and report which workspaces use them.
pub struct CanonicalRepoService<'a> {
    git: &'a dyn GitAdapter,
    storage: &'a WorkspaceStorage,
    disk_usage: &'a DiskUsageCache,
    projects_root: std::path::PathBuf,
}

impl<'a> CanonicalRepoService<'a> {
    /// Construct a service over the given git backend and storage, rooted
    /// at `projects_root` (the same root the `GitAdapter` was constructed
    /// with).
    #[must_use]
    pub fn new(
        git: &'a dyn GitAdapter,
        storage: &'a WorkspaceStorage,
        disk_usage: &'a DiskUsageCache,
        projects_root: std::path::PathBuf,
    ) -> Self {
        Self {
            git,
            storage,
            disk_usage,
            projects_root,
        }
    }

    fn path_for(&self, name: &str) -> std::path::PathBuf {
        self.projects_root.join(name)
    }

    /// Enumerate canonical repo names under `projects_root`.
    pub fn list(&self) -> Result<Vec<String>, CanopyError> {
        self.git
            .list_canonical_repos()
            .map_err(|e| CanopyError::git_operation_failed("list_canonical_repos", e))
    }

    /// Clone `url`, deriving its canonical name, and return that name.
    pub fn add(&self, url: &str, name: &str, cancel: &CancelToken) -> Result<String, CanopyError> {
        self.git
            .clone_repo(url, name, cancel)
            .map(|repo| repo.name)
            .map_err(|e| CanopyError::git_operation_failed("clone_repo", e))
    }

    /// Remove canonical repo `name`. Fails with `repo_in_use` listing the
    /// dependent workspace ids unless `force` is set.
    pub fn remove(&self, name: &str, force: bool) -> Result<(), CanopyError> {
        let dependents = self.workspaces_using_repo(name)?;
        if !dependents.is_empty() && !force {
            return Err(CanopyError::repo_in_use(name, &dependents));
        }
        std::fs::remove_dir_all(self.path_for(name)).map_err(|e| CanopyError::io_failed(e, Some(name)))
    }

    /// Fetch the latest objects for canonical repo `name`.
    pub fn sync(&self, name: &str, cancel: &CancelToken) -> Result<(), CanopyError> {
        self.git.fetch(name, cancel).map_err(|e| CanopyError::git_operation_failed("fetch", e))
    }

    /// All active workspace ids that reference `name` in their `repos`.
    pub fn workspaces_using_repo(&self, name: &str) -> Result<Vec<String>, CanopyError> {
        Ok(self
            .storage
            .list()?
            .into_iter()
            .filter(|ws| ws.repos.iter().any(|r| r.name == name))
            .map(|ws| ws.id)
            .collect())
    }

    /// Preview what removing `name` would affect, without mutating
    /// anything.
    pub fn preview_remove(&self, name: &str) -> Result<RemovePreview, CanopyError> {
        let path = self.path_for(name);
        let disk_usage = self.disk_usage.get_or_compute(&path)?;
        Ok(RemovePreview {
            name: name.to_owned(),
            path,
            disk_usage_bytes: disk_usage.size_bytes,
            workspaces_affected: self.workspaces_using_repo(name)?,
        })
    }
}
