//! The git backend contract consumed by `canopy-core`.
//!
//! Every core service reaches git through this trait, never through `gix`
//! or a `git` subprocess directly — that isolation lives entirely behind
//! [`crate::gix_adapter::GixGitAdapter`]. Tests substitute a fake
//! implementation instead.

use std::path::Path;

use crate::cancel::CancelToken;
use crate::error::GitError;
use crate::types::{CanonicalRepo, CommandOutput, FetchTime, RepoStatus, WorktreeEntry};

/// Operations on canonical repository clones and the linked worktrees
/// created from them.
///
/// Implementations decide, per method, whether to go through `gix`
/// in-process or shell out to the `git` binary; callers only see the
/// trait. Network-bound methods (`ensure_canonical`, `clone_repo`,
/// `fetch`, `pull`, `push`) take a [`CancelToken`] and are expected to
/// retry transient failures internally per spec section 4.1.
pub trait GitAdapter: Send + Sync {
    /// Ensure a canonical clone of `url` named `name` exists under the
    /// adapter's `projects_root`, cloning it if absent. Returns the
    /// existing clone's record without re-cloning if one is already
    /// present with a matching `upstream_url`.
    fn ensure_canonical(
        &self,
        url: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<CanonicalRepo, GitError>;

    /// Clone `url` as a new canonical repo named `name`. Fails with
    /// [`GitError::AlreadyExists`] if `name` is already taken.
    fn clone_repo(
        &self,
        url: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<CanonicalRepo, GitError>;

    /// Create a linked worktree at `worktree_path` for canonical repo
    /// `name`, checking out `branch` (created if it does not yet exist).
    /// This is the CLI escape hatch: `gix` has no high-level worktree
    /// lifecycle API.
    fn create_worktree(&self, name: &str, worktree_path: &Path, branch: &str) -> Result<(), GitError>;

    /// Remove the linked worktree at `worktree_path` from canonical repo
    /// `name`. Refuses (returns [`GitError::DirtyWorktree`]) unless
    /// `force` is set and the worktree has uncommitted changes.
    fn remove_worktree(&self, name: &str, worktree_path: &Path, force: bool) -> Result<(), GitError>;

    /// Prune stale worktree administrative entries (worktrees whose
    /// directory was deleted out of band) for canonical repo `name`.
    fn prune_worktrees(&self, name: &str) -> Result<(), GitError>;

    /// List the linked worktrees currently registered for canonical repo
    /// `name`.
    fn list_worktrees(&self, name: &str) -> Result<Vec<WorktreeEntry>, GitError>;

    /// Fetch updates for canonical repo `name` from its configured
    /// remote.
    fn fetch(&self, name: &str, cancel: &CancelToken) -> Result<(), GitError>;

    /// Fast-forward pull into the worktree at `path`.
    fn pull(&self, path: &Path, cancel: &CancelToken) -> Result<(), GitError>;

    /// Push the worktree at `path`'s current branch (or `branch`, if
    /// given) to its upstream remote.
    fn push(&self, path: &Path, branch: Option<&str>, cancel: &CancelToken) -> Result<(), GitError>;

    /// Report dirty/ahead/behind/branch status for the worktree at
    /// `path`.
    fn status(&self, path: &Path) -> Result<RepoStatus, GitError>;

    /// Check out `branch` in the worktree at `path`, creating it from the
    /// current HEAD if `create` is set and it does not yet exist.
    fn checkout(&self, path: &Path, branch: &str, create: bool) -> Result<(), GitError>;

    /// List the names of all canonical repos currently known under
    /// `projects_root`.
    fn list_canonical_repos(&self) -> Result<Vec<String>, GitError>;

    /// The time of the last successful fetch recorded for canonical repo
    /// `name`, if any fetch has ever succeeded.
    fn last_fetch_time(&self, name: &str) -> Result<Option<FetchTime>, GitError>;

    /// The on-disk size in bytes of canonical repo `name`'s clone.
    fn repo_size(&self, name: &str) -> Result<u64, GitError>;

    /// Run an arbitrary git subcommand (`args`, excluding the `git`
    /// binary name itself) with `path` as the working directory, and
    /// capture its output. Used by the hook executor's `git` convenience
    /// and by ad hoc diagnostics; never used internally in place of a
    /// dedicated method above.
    fn run_command(&self, path: &Path, args: &[&str]) -> Result<CommandOutput, GitError>;
}
