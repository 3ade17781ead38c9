//! Domain types shared across the sub-services, per spec section 3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single repository reference within a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Unique within the owning workspace.
    pub name: String,
    /// The upstream URL this repo was resolved from.
    pub url: String,
}

/// The current metadata schema version. Workspaces persisted with an
/// older version are loaded best-effort and their original version is
/// preserved on save until explicitly migrated (spec section 4.2); this
/// repository performs no automatic migration beyond that tagging.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// An active workspace: one git worktree per repo, all on `branch_name`,
/// materialised under `workspaces_root/dir_name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Missing on load is treated as `0` (legacy); always `CURRENT_SCHEMA_VERSION` on save.
    #[serde(default)]
    pub version: u32,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir_name: Option<String>,
    pub branch_name: String,
    pub repos: Vec<RepoRef>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Workspace {
    /// The directory name to use under `workspaces_root`: the stored
    /// `dir_name` if present (legacy/renamed workspaces), else the id
    /// itself.
    #[must_use]
    pub fn effective_dir_name(&self) -> &str {
        self.dir_name.as_deref().unwrap_or(&self.id)
    }
}

/// Archived metadata for a workspace that has been closed, with no
/// filesystem presence left under `workspaces_root`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedWorkspace {
    #[serde(flatten)]
    pub workspace: Workspace,
    /// Absolute path of this closed entry under `closed_root`.
    #[serde(skip)]
    pub archive_path: std::path::PathBuf,
}

/// Context values available to hook command templates (spec section
/// 4.6): workspace-scoped fields plus, when a hook is filtered to a
/// specific repo, the repo-scoped fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookContext {
    pub workspace_id: String,
    pub workspace_path: std::path::PathBuf,
    pub branch_name: String,
    pub repos: Vec<RepoRef>,
    pub repo_name: Option<String>,
    pub repo_path: Option<std::path::PathBuf>,
}

impl HookContext {
    /// Build the workspace-scoped context for a workspace rooted at
    /// `workspace_path`.
    #[must_use]
    pub fn for_workspace(workspace: &Workspace, workspace_path: std::path::PathBuf) -> Self {
        Self {
            workspace_id: workspace.id.clone(),
            workspace_path,
            branch_name: workspace.branch_name.clone(),
            repos: workspace.repos.clone(),
            repo_name: None,
            repo_path: None,
        }
    }

    /// Narrow this context to a single repo, for per-repo hook
    /// invocations.
    #[must_use]
    pub fn scoped_to_repo(&self, repo_name: &str, repo_path: std::path::PathBuf) -> Self {
        Self {
            repo_name: Some(repo_name.to_owned()),
            repo_path: Some(repo_path),
            ..self.clone()
        }
    }
}

/// A portable, versioned export of a workspace's shape (spec section
/// 4.11). `repos[].alias` is populated when the repo's URL resolves to a
/// registry alias at export time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceExport {
    pub version: u32,
    pub id: String,
    pub branch: String,
    pub exported_at: DateTime<Utc>,
    pub repos: Vec<ExportedRepoRef>,
}

/// One repo entry within a [`WorkspaceExport`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedRepoRef {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Per-repo status as reported by [`crate::facade::WorkspaceService::status`].
/// Carries its own `error` field (rather than failing the whole call) so
/// one repo's trouble doesn't hide the others' results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoStatusEntry {
    pub repo_name: String,
    pub is_dirty: bool,
    pub ahead: u64,
    pub behind: u64,
    pub branch: Option<String>,
    pub error: Option<String>,
}

/// The aggregate status of a workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceStatus {
    pub id: String,
    pub branch: String,
    pub repos: Vec<RepoStatusEntry>,
}

/// How a repo within an active workspace relates to its canonical clone
/// and worktree directory, per spec section 4.9.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrphanClass {
    Healthy,
    CanonicalMissing,
    DirectoryMissing,
    InvalidGitDir,
}

/// One classified orphan finding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrphanFinding {
    pub workspace_id: String,
    pub repo_name: String,
    pub class: OrphanClass,
}
