//! Orphan detection service (component C11).
//!
//! For each repo in each active workspace, classifies how the workspace's
//! metadata relates to what's actually on disk and in the canonical
//! store, per spec section 4.9. Classification is a pure function of
//! filesystem + canonical presence (spec section 8's determinism
//! invariant) — this module never mutates anything except
//! [`OrphanService::prune_all_worktrees`].

use std::collections::HashSet;
use std::path::Path;

use canopy_git::GitAdapter;

use crate::error::CanopyError;
use crate::model::{OrphanClass, OrphanFinding};
use crate::storage::WorkspaceStorage;

/// Detects and classifies dangling worktree references, and prunes stale
/// worktree registrations fleet-wide.
pub struct OrphanService<'a> {
    git: &'a dyn GitAdapter,
    storage: &'a WorkspaceStorage,
}

impl<'a> OrphanService<'a> {
    /// Construct a service over the given git backend and storage.
    #[must_use]
    pub fn new(git: &'a dyn GitAdapter, storage: &'a WorkspaceStorage) -> Self {
        Self { git, storage }
    }

    /// Classify every repo of a single active workspace.
    pub fn scan_workspace(&self, id: &str) -> Result<Vec<OrphanFinding>, CanopyError> {
        let ws = self.storage.load(id)?;
        let canonical_names: HashSet<String> = self
            .git
            .list_canonical_repos()
            .map_err(|e| CanopyError::git_operation_failed("list_canonical_repos", e))?
            .into_iter()
            .collect();
        let workspace_dir = self.storage.workspace_dir(ws.effective_dir_name());

        Ok(ws
            .repos
            .iter()
            .map(|repo| {
                let worktree_path = workspace_dir.join(&repo.name);
                let class = classify(&canonical_names, &repo.name, &worktree_path);
                OrphanFinding {
                    workspace_id: ws.id.clone(),
                    repo_name: repo.name.clone(),
                    class,
                }
            })
            .collect())
    }

    /// Classify every repo across every active workspace.
    pub fn scan_fleet(&self) -> Result<Vec<OrphanFinding>, CanopyError> {
        let mut findings = Vec::new();
        for ws in self.storage.list()? {
            findings.extend(self.scan_workspace(&ws.id)?);
        }
        Ok(findings)
    }

    /// Prune stale worktree administrative entries for every canonical
    /// repo (entries whose backing directory is gone).
    pub fn prune_all_worktrees(&self) -> Result<(), CanopyError> {
        for name in self
            .git
            .list_canonical_repos()
            .map_err(|e| CanopyError::git_operation_failed("list_canonical_repos", e))?
        {
            self.git
                .prune_worktrees(&name)
                .map_err(|e| CanopyError::git_operation_failed("prune_worktrees", e))?;
        }
        Ok(())
    }
}

fn classify(canonical_names: &HashSet<String>, repo_name: &str, worktree_path: &Path) -> OrphanClass {
    if !canonical_names.contains(repo_name) {
        return OrphanClass::CanonicalMissing;
    }
    if !worktree_path.exists() {
        return OrphanClass::DirectoryMissing;
    }
    if !is_valid_worktree(worktree_path) {
        return OrphanClass::InvalidGitDir;
    }
    OrphanClass::Healthy
}

/// A linked worktree's `.git` is a file (not a directory) containing
/// `gitdir: <path to the canonical repo's worktree admin dir>`.
fn is_valid_worktree(worktree_path: &Path) -> bool {
    let git_path = worktree_path.join(".git");
    let Ok(contents) = std::fs::read_to_string(&git_path) else {
        return false;
    };
    contents.trim_start().starts_with("gitdir:")
}
