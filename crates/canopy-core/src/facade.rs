//! Workspace service façade (component C14).
//!
//! Every lifecycle operation enters here: acquire the per-workspace
//! lock (C6), resolve/ensure repos (C9/C10), materialise or remove
//! worktrees through the git adapter (C2), persist metadata under the
//! lock (C3), invalidate the cache (C5), and run lifecycle hooks (C8).
//! On any failure after partial progress, rolls back completed side
//! effects best-effort (logged, never shadowing the original error) —
//! the same backup/restore-on-`Err` shape `bobisme-maw`'s
//! `workspace::create::attach` uses for its own partial-progress
//! recovery, generalized here to worktrees instead of a file backup
//! directory.
//!
//! Per-workspace locks are keyed by id under a dedicated
//! `workspaces_root/.locks/<id>/` subtree rather than the workspace's
//! own directory: [`Self::create`] and [`Self::reopen`] need to hold a
//! lock before the workspace directory exists, and [`Self::rename`]
//! needs to lock the *target* id before its directory exists at all.

use std::path::PathBuf;
use std::time::Duration;

use canopy_git::{CancelToken, GitAdapter};
use chrono::Utc;
use crossbeam_channel::bounded;

use crate::cache::WorkspaceCache;
use crate::canonical::CanonicalRepoService;
use crate::config::{CloseMode, ConfigProvider, HookEvent};
use crate::disk_usage::DiskUsageCache;
use crate::error::CanopyError;
use crate::executor::parallel_map;
use crate::git_workspace::GitWorkspaceService;
use crate::hooks::{self, RunOptions};
use crate::lock::LockManager;
use crate::model::{ClosedWorkspace, HookContext, RepoRef, RepoStatusEntry, Workspace, WorkspaceStatus, CURRENT_SCHEMA_VERSION};
use crate::resolver;
use crate::storage::WorkspaceStorage;

/// Options for [`WorkspaceService::close`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CloseOptions {
    /// `Some(true)` archives under `closed_root` regardless of
    /// configuration; `Some(false)` deletes; `None` uses
    /// [`crate::config::ConfigProvider::close_default`].
    pub keep_metadata: Option<bool>,
    /// Skip the clean/fully-pushed safety check.
    pub force: bool,
}

/// Options for [`WorkspaceService::rename`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RenameOptions {
    pub rename_branches: bool,
}

/// Composes every sub-service into the single entry point embedders
/// call against.
pub struct WorkspaceService<'a> {
    config: &'a dyn ConfigProvider,
    git: &'a dyn GitAdapter,
    storage: WorkspaceStorage,
    cache: WorkspaceCache,
    disk_usage: DiskUsageCache,
    lock_manager: LockManager,
}

impl<'a> WorkspaceService<'a> {
    /// Construct a façade over `git`, reading layout/policy from `config`.
    #[must_use]
    pub fn new(config: &'a dyn ConfigProvider, git: &'a dyn GitAdapter) -> Self {
        Self {
            storage: WorkspaceStorage::new(config.workspaces_root(), config.closed_root()),
            cache: WorkspaceCache::default(),
            disk_usage: DiskUsageCache::default(),
            lock_manager: LockManager::new(config.lock_timeout(), config.lock_stale_threshold()),
            config,
            git,
        }
    }

    fn canonical(&self) -> CanonicalRepoService<'_> {
        CanonicalRepoService::new(self.git, &self.storage, &self.disk_usage, self.config.projects_root())
    }

    /// The workspace-scoped git action service (C12), for embedders
    /// that want push/run-git/switch-branch without going through the
    /// lifecycle façade.
    #[must_use]
    pub fn git_workspace(&self) -> GitWorkspaceService<'_> {
        GitWorkspaceService::new(self.git, &self.storage, self.config.parallel_workers())
    }

    fn id_lock_dir(&self, id: &str) -> PathBuf {
        self.config.workspaces_root().join(".locks").join(id)
    }

    /// Create a new workspace. `branch` empty defaults to `id`.
    pub fn create(&self, id: &str, branch: &str, repos: &[RepoRef], cancel: &CancelToken) -> Result<Workspace, CanopyError> {
        validate_id(id)?;
        if self.storage.load(id).is_ok() || self.storage.latest_closed(id)?.is_some() {
            return Err(CanopyError::workspace_exists(id));
        }

        let _lock = self.lock_manager.acquire(&self.id_lock_dir(id), id, true)?;

        let dir_name = self.config.naming_template().render(id);
        let workspace_dir = self.storage.workspace_dir(&dir_name);
        let branch_name = if branch.is_empty() { id.to_owned() } else { branch.to_owned() };

        let ensure_results = parallel_map(self.config.parallel_workers(), repos.len(), cancel, false, |idx, cancel| {
            self.git
                .ensure_canonical(&repos[idx].url, &repos[idx].name, cancel)
                .map(|_| ())
                .map_err(|e| CanopyError::git_operation_failed("ensure_canonical", e))
        });
        if let Some(err) = ensure_results.into_iter().find_map(|r| r.err) {
            return Err(err);
        }

        let mut created: Vec<(String, PathBuf)> = Vec::new();
        for repo in repos {
            let path = workspace_dir.join(&repo.name);
            if let Err(e) = self.git.create_worktree(&repo.name, &path, &branch_name) {
                self.rollback_worktrees(&created);
                let _ = std::fs::remove_dir_all(&workspace_dir);
                return Err(CanopyError::git_operation_failed("create_worktree", e));
            }
            created.push((repo.name.clone(), path));
        }

        let now = Utc::now();
        let mut ws = Workspace {
            version: CURRENT_SCHEMA_VERSION,
            id: id.to_owned(),
            dir_name: Some(dir_name),
            branch_name,
            repos: repos.to_vec(),
            created_at: now,
            last_modified: now,
            closed_at: None,
        };
        if let Err(e) = self.storage.save(&mut ws) {
            self.rollback_worktrees(&created);
            let _ = std::fs::remove_dir_all(&workspace_dir);
            return Err(e);
        }
        self.cache.invalidate(id);

        let post_create = self.config.hooks(HookEvent::PostCreate);
        if !post_create.is_empty() {
            let hook_ctx = HookContext::for_workspace(&ws, workspace_dir.clone());
            if let Err(e) = hooks::run(&post_create, &hook_ctx, RunOptions::default()) {
                self.rollback_worktrees(&created);
                let _ = self.storage.delete(id);
                let _ = std::fs::remove_dir_all(&workspace_dir);
                self.cache.invalidate(id);
                return Err(e);
            }
        }

        Ok(ws)
    }

    fn rollback_worktrees(&self, created: &[(String, PathBuf)]) {
        for (name, path) in created.iter().rev() {
            if let Err(e) = self.git.remove_worktree(name, path, true) {
                tracing::warn!(repo = %name, error = %e, "failed to roll back worktree during create rollback");
            }
        }
    }

    /// Resolve `identifier` and add it to workspace `id` as a new repo.
    pub fn add_repo(&self, id: &str, identifier: &str, cancel: &CancelToken) -> Result<Workspace, CanopyError> {
        let _lock = self.lock_manager.acquire(&self.id_lock_dir(id), id, true)?;

        let mut ws = self.storage.load(id)?;
        let workspace_dir = self.storage.workspace_dir(ws.effective_dir_name());
        let resolved = resolver::resolve(identifier, true, &self.config.registry())?;
        if ws.repos.iter().any(|r| r.name == resolved.name) {
            return Err(CanopyError::repo_already_exists(&resolved.name));
        }

        self.git
            .ensure_canonical(&resolved.url, &resolved.name, cancel)
            .map_err(|e| CanopyError::git_operation_failed("ensure_canonical", e))?;
        let path = workspace_dir.join(&resolved.name);
        self.git
            .create_worktree(&resolved.name, &path, &ws.branch_name)
            .map_err(|e| CanopyError::git_operation_failed("create_worktree", e))?;

        ws.repos.push(RepoRef {
            name: resolved.name.clone(),
            url: resolved.url.clone(),
        });
        ws.last_modified = Utc::now();
        if let Err(e) = self.storage.save(&mut ws) {
            if let Err(rollback_err) = self.git.remove_worktree(&resolved.name, &path, true) {
                tracing::warn!(repo = %resolved.name, error = %rollback_err, "failed to roll back worktree after add_repo save failure");
            }
            return Err(e);
        }
        self.cache.invalidate(id);
        Ok(ws)
    }

    /// Remove `repo_name` from workspace `id`. Refuses if the repo is
    /// dirty or has unpushed commits unless `force`.
    pub fn remove_repo(&self, id: &str, repo_name: &str, force: bool) -> Result<Workspace, CanopyError> {
        let _lock = self.lock_manager.acquire(&self.id_lock_dir(id), id, true)?;

        let mut ws = self.storage.load(id)?;
        let workspace_dir = self.storage.workspace_dir(ws.effective_dir_name());
        let repo = ws
            .repos
            .iter()
            .find(|r| r.name == repo_name)
            .cloned()
            .ok_or_else(|| CanopyError::repo_not_found(repo_name))?;
        let path = workspace_dir.join(&repo.name);

        if !force {
            let status = self.git.status(&path).map_err(|e| CanopyError::git_operation_failed("status", e))?;
            if status.is_dirty || status.ahead > 0 {
                return Err(CanopyError::repo_not_clean(repo_name, "uncommitted or unpushed changes"));
            }
        }

        self.git
            .remove_worktree(repo_name, &path, force)
            .map_err(|e| CanopyError::git_operation_failed("remove_worktree", e))?;

        ws.repos.retain(|r| r.name != repo_name);
        ws.last_modified = Utc::now();
        if let Err(e) = self.storage.save(&mut ws) {
            if let Err(rollback_err) = self.git.create_worktree(repo_name, &path, &ws.branch_name) {
                tracing::warn!(repo = repo_name, error = %rollback_err, "failed to recreate worktree after remove_repo save failure");
            }
            return Err(e);
        }
        self.cache.invalidate(id);
        Ok(ws)
    }

    /// Close workspace `id`: remove every worktree, then archive or
    /// delete its metadata.
    pub fn close(&self, id: &str, opts: CloseOptions) -> Result<(), CanopyError> {
        let _lock = self.lock_manager.acquire(&self.id_lock_dir(id), id, true)?;

        let ws = self.storage.load(id)?;
        let workspace_dir = self.storage.workspace_dir(ws.effective_dir_name());

        if !opts.force {
            let mut offenders = Vec::new();
            for repo in &ws.repos {
                let path = workspace_dir.join(&repo.name);
                match self.git.status(&path) {
                    Ok(status) if status.is_dirty || status.ahead > 0 => offenders.push(repo.name.clone()),
                    Ok(_) => {}
                    Err(_) => offenders.push(repo.name.clone()),
                }
            }
            if !offenders.is_empty() {
                return Err(CanopyError::repo_not_clean(&offenders.join(","), "not clean or not fully pushed"));
            }
        }

        let pre_close = self.config.hooks(HookEvent::PreClose);
        if !pre_close.is_empty() {
            let hook_ctx = HookContext::for_workspace(&ws, workspace_dir.clone());
            hooks::run(&pre_close, &hook_ctx, RunOptions::default())?;
        }

        for repo in &ws.repos {
            let path = workspace_dir.join(&repo.name);
            self.git
                .remove_worktree(&repo.name, &path, opts.force)
                .map_err(|e| CanopyError::git_operation_failed("remove_worktree", e))?;
        }

        let archive = opts.keep_metadata.unwrap_or(matches!(self.config.close_default(), CloseMode::Archive));
        if archive {
            self.storage.close(id, Utc::now())?;
        } else {
            self.storage.delete(id)?;
        }
        self.cache.invalidate(id);
        self.disk_usage.invalidate(&workspace_dir);

        let post_close = self.config.hooks(HookEvent::PostClose);
        if !post_close.is_empty() {
            let hook_ctx = HookContext::for_workspace(&ws, workspace_dir);
            if let Err(e) = hooks::run(
                &post_close,
                &hook_ctx,
                RunOptions {
                    continue_on_error: true,
                    dry_run: false,
                },
            ) {
                tracing::warn!(id, error = %e, "post_close hook failed after workspace was already closed");
            }
        }
        Ok(())
    }

    /// Recreate worktrees for the most recently closed entry of `id`.
    pub fn reopen(&self, id: &str, force: bool) -> Result<Workspace, CanopyError> {
        let closed = self.storage.latest_closed(id)?.ok_or_else(|| CanopyError::workspace_not_found(id))?;
        if self.storage.load(id).is_ok() {
            if !force {
                return Err(CanopyError::workspace_exists(id));
            }
            self.storage.delete(id)?;
        }

        let _lock = self.lock_manager.acquire(&self.id_lock_dir(id), id, true)?;

        let dir_name = closed.workspace.effective_dir_name().to_owned();
        let workspace_dir = self.storage.workspace_dir(&dir_name);

        let mut created: Vec<(String, PathBuf)> = Vec::new();
        for repo in &closed.workspace.repos {
            let path = workspace_dir.join(&repo.name);
            if let Err(e) = self.git.create_worktree(&repo.name, &path, &closed.workspace.branch_name) {
                self.rollback_worktrees(&created);
                let _ = std::fs::remove_dir_all(&workspace_dir);
                return Err(CanopyError::git_operation_failed("create_worktree", e));
            }
            created.push((repo.name.clone(), path));
        }

        let mut ws = closed.workspace.clone();
        ws.closed_at = None;
        ws.last_modified = Utc::now();
        if let Err(e) = self.storage.save(&mut ws) {
            self.rollback_worktrees(&created);
            let _ = std::fs::remove_dir_all(&workspace_dir);
            return Err(e);
        }

        if let Some(closed_at) = closed.workspace.closed_at {
            self.storage.delete_closed(id, closed_at)?;
        }
        self.cache.invalidate(id);

        let post_reopen = self.config.hooks(HookEvent::PostReopen);
        if !post_reopen.is_empty() {
            let hook_ctx = HookContext::for_workspace(&ws, workspace_dir);
            if let Err(e) = hooks::run(
                &post_reopen,
                &hook_ctx,
                RunOptions {
                    continue_on_error: true,
                    dry_run: false,
                },
            ) {
                tracing::warn!(id, error = %e, "post_reopen hook failed");
            }
        }

        Ok(ws)
    }

    /// Rename workspace `old_id` to `new_id`, locking both ids in
    /// lexicographic order to avoid deadlocking against a concurrent
    /// rename the other way.
    pub fn rename(&self, old_id: &str, new_id: &str, opts: RenameOptions) -> Result<Workspace, CanopyError> {
        validate_id(new_id)?;
        if self.storage.load(new_id).is_ok() || self.storage.latest_closed(new_id)?.is_some() {
            return Err(CanopyError::workspace_exists(new_id));
        }

        let (first, second) = if old_id <= new_id { (old_id, new_id) } else { (new_id, old_id) };
        let _lock_first = self.lock_manager.acquire(&self.id_lock_dir(first), first, true)?;
        let _lock_second = self.lock_manager.acquire(&self.id_lock_dir(second), second, true)?;

        let new_dir_name = self.config.naming_template().render(new_id);
        let mut ws = self.storage.rename(old_id, new_id, &new_dir_name)?;

        if opts.rename_branches {
            let workspace_dir = self.storage.workspace_dir(&new_dir_name);
            let new_branch = new_id.to_owned();
            for repo in &ws.repos {
                let path = workspace_dir.join(&repo.name);
                let _ = self
                    .git
                    .run_command(&path, &["branch", "-m", &ws.branch_name, &new_branch]);
            }
            ws.branch_name = new_branch;
            self.storage.save(&mut ws)?;
        }

        self.cache.invalidate(old_id);
        self.cache.invalidate(new_id);
        Ok(ws)
    }

    /// Compose per-repo status for workspace `id`; per-repo failures are
    /// carried in [`RepoStatusEntry::error`] rather than failing the call.
    pub fn status(&self, id: &str) -> Result<WorkspaceStatus, CanopyError> {
        let ws = self.storage.load(id)?;
        let workspace_dir = self.storage.workspace_dir(ws.effective_dir_name());
        let repos = ws
            .repos
            .iter()
            .map(|repo| {
                let path = workspace_dir.join(&repo.name);
                match self.git.status(&path) {
                    Ok(status) => RepoStatusEntry {
                        repo_name: repo.name.clone(),
                        is_dirty: status.is_dirty,
                        ahead: status.ahead,
                        behind: status.behind,
                        branch: status.branch,
                        error: None,
                    },
                    Err(e) => RepoStatusEntry {
                        repo_name: repo.name.clone(),
                        is_dirty: false,
                        ahead: 0,
                        behind: 0,
                        branch: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect();
        Ok(WorkspaceStatus {
            id: ws.id,
            branch: ws.branch_name,
            repos,
        })
    }

    /// Run [`Self::status`] for every id in `ids` concurrently, each
    /// bounded by `per_workspace_timeout`. A workspace whose status call
    /// does not return in time gets every repo's `error` set to
    /// `"timeout"` and an empty branch.
    #[must_use]
    pub fn status_batch(&self, ids: &[String], per_workspace_timeout: Duration) -> Vec<WorkspaceStatus> {
        std::thread::scope(|scope| {
            let receivers: Vec<_> = ids
                .iter()
                .map(|id| {
                    let (tx, rx) = bounded(1);
                    scope.spawn(move || {
                        let _ = tx.send(self.status(id));
                    });
                    (id.clone(), rx)
                })
                .collect();

            receivers
                .into_iter()
                .map(|(id, rx)| match rx.recv_timeout(per_workspace_timeout) {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => timed_out_status(&id, Some(e.to_string())),
                    Err(_) => timed_out_status(&id, Some("timeout".to_owned())),
                })
                .collect()
        })
    }

    /// All active workspaces, sorted by id.
    pub fn list(&self) -> Result<Vec<Workspace>, CanopyError> {
        self.storage.list()
    }

    /// All archived workspace entries, sorted by close time.
    pub fn list_closed(&self) -> Result<Vec<ClosedWorkspace>, CanopyError> {
        self.storage.list_closed()
    }
}

fn timed_out_status(id: &str, error: Option<String>) -> WorkspaceStatus {
    WorkspaceStatus {
        id: id.to_owned(),
        branch: String::new(),
        repos: vec![RepoStatusEntry {
            repo_name: String::new(),
            is_dirty: false,
            ahead: 0,
            behind: 0,
            branch: None,
            error,
        }],
    }
}

fn validate_id(id: &str) -> Result<(), CanopyError> {
    if id.trim().is_empty() {
        return Err(CanopyError::invalid_argument("workspace id must not be empty"));
    }
    if id.contains('/') || id.contains('\\') {
        return Err(CanopyError::invalid_argument(format!(
            "workspace id `{id}` must not contain a path separator"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HookSpec, NamingTemplate, Registry};
    use canopy_git::{CanonicalRepo, CommandOutput, FetchTime, RepoStatus, WorktreeEntry};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeGit {
        canonicals: Mutex<Vec<String>>,
        dirty: Mutex<HashMap<String, bool>>,
        fail_worktree_for: Mutex<Option<String>>,
        removed_worktrees: Mutex<Vec<String>>,
    }

    impl GitAdapter for FakeGit {
        fn ensure_canonical(&self, _url: &str, name: &str, _cancel: &CancelToken) -> Result<CanonicalRepo, canopy_git::GitError> {
            let mut canonicals = self.canonicals.lock().unwrap();
            if !canonicals.contains(&name.to_owned()) {
                canonicals.push(name.to_owned());
            }
            Ok(CanonicalRepo {
                name: name.to_owned(),
                path: Path::new(name).to_path_buf(),
                upstream_url: String::new(),
            })
        }
        fn clone_repo(&self, url: &str, name: &str, cancel: &CancelToken) -> Result<CanonicalRepo, canopy_git::GitError> {
            self.ensure_canonical(url, name, cancel)
        }
        fn create_worktree(&self, name: &str, worktree_path: &Path, _branch: &str) -> Result<(), canopy_git::GitError> {
            if self.fail_worktree_for.lock().unwrap().as_deref() == Some(name) {
                return Err(canopy_git::GitError::CommandFailed {
                    args: "worktree add".to_owned(),
                    exit_code: 1,
                    stderr: "boom".to_owned(),
                });
            }
            std::fs::create_dir_all(worktree_path).unwrap();
            Ok(())
        }
        fn remove_worktree(&self, name: &str, worktree_path: &Path, _force: bool) -> Result<(), canopy_git::GitError> {
            self.removed_worktrees.lock().unwrap().push(name.to_owned());
            let _ = std::fs::remove_dir_all(worktree_path);
            Ok(())
        }
        fn prune_worktrees(&self, _name: &str) -> Result<(), canopy_git::GitError> {
            Ok(())
        }
        fn list_worktrees(&self, _name: &str) -> Result<Vec<WorktreeEntry>, canopy_git::GitError> {
            Ok(vec![])
        }
        fn fetch(&self, _name: &str, _cancel: &CancelToken) -> Result<(), canopy_git::GitError> {
            Ok(())
        }
        fn pull(&self, _path: &Path, _cancel: &CancelToken) -> Result<(), canopy_git::GitError> {
            Ok(())
        }
        fn push(&self, _path: &Path, _branch: Option<&str>, _cancel: &CancelToken) -> Result<(), canopy_git::GitError> {
            Ok(())
        }
        fn status(&self, path: &Path) -> Result<RepoStatus, canopy_git::GitError> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            let is_dirty = *self.dirty.lock().unwrap().get(&name).unwrap_or(&false);
            Ok(RepoStatus {
                is_dirty,
                ahead: 0,
                behind: 0,
                branch: Some("main".to_owned()),
            })
        }
        fn checkout(&self, _path: &Path, _branch: &str, _create: bool) -> Result<(), canopy_git::GitError> {
            Ok(())
        }
        fn list_canonical_repos(&self) -> Result<Vec<String>, canopy_git::GitError> {
            Ok(self.canonicals.lock().unwrap().clone())
        }
        fn last_fetch_time(&self, _name: &str) -> Result<Option<FetchTime>, canopy_git::GitError> {
            Ok(None)
        }
        fn repo_size(&self, _name: &str) -> Result<u64, canopy_git::GitError> {
            Ok(0)
        }
        fn run_command(&self, _path: &Path, args: &[&str]) -> Result<CommandOutput, canopy_git::GitError> {
            Ok(CommandOutput {
                stdout: args.join(" "),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }
    }

    struct FakeConfig {
        root: PathBuf,
        close_default: CloseMode,
        post_create_hooks: Vec<HookSpec>,
        pre_close_hooks: Vec<HookSpec>,
    }

    impl FakeConfig {
        fn new(root: PathBuf) -> Self {
            Self {
                root,
                close_default: CloseMode::Archive,
                post_create_hooks: vec![],
                pre_close_hooks: vec![],
            }
        }
    }

    impl ConfigProvider for FakeConfig {
        fn projects_root(&self) -> PathBuf {
            self.root.join("projects")
        }
        fn workspaces_root(&self) -> PathBuf {
            self.root.join("workspaces")
        }
        fn closed_root(&self) -> PathBuf {
            self.root.join("closed")
        }
        fn naming_template(&self) -> NamingTemplate {
            NamingTemplate::Identity
        }
        fn stale_threshold_days(&self) -> u32 {
            30
        }
        fn parallel_workers(&self) -> usize {
            2
        }
        fn lock_timeout(&self) -> Duration {
            Duration::from_millis(200)
        }
        fn lock_stale_threshold(&self) -> Duration {
            Duration::from_secs(60)
        }
        fn git_retry_policy(&self) -> canopy_git::RetryPolicy {
            canopy_git::RetryPolicy::default_policy()
        }
        fn close_default(&self) -> CloseMode {
            self.close_default
        }
        fn registry(&self) -> Registry {
            Registry::new([])
        }
        fn hooks(&self, event: HookEvent) -> Vec<HookSpec> {
            match event {
                HookEvent::PostCreate => self.post_create_hooks.clone(),
                HookEvent::PreClose => self.pre_close_hooks.clone(),
                _ => vec![],
            }
        }
    }

    fn sample_repos() -> Vec<RepoRef> {
        vec![
            RepoRef {
                name: "a".to_owned(),
                url: "file:///p/a".to_owned(),
            },
            RepoRef {
                name: "b".to_owned(),
                url: "file:///p/b".to_owned(),
            },
        ]
    }

    #[test]
    fn create_materialises_worktrees_and_persists_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);

        let ws = svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();
        assert_eq!(ws.branch_name, "PROJ-1");
        assert!(config.workspaces_root().join("PROJ-1").join("a").exists());
        assert!(config.workspaces_root().join("PROJ-1").join("b").exists());
        assert_eq!(svc.list().unwrap().len(), 1);
    }

    #[test]
    fn create_rolls_back_on_worktree_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        *git.fail_worktree_for.lock().unwrap() = Some("b".to_owned());
        let svc = WorkspaceService::new(&config, &git);

        let err = svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::GitOperationFailed);
        assert!(!config.workspaces_root().join("PROJ-1").exists());
        assert_eq!(git.removed_worktrees.lock().unwrap().as_slice(), ["a".to_owned()]);
    }

    #[test]
    fn create_rolls_back_on_hook_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FakeConfig::new(dir.path().to_path_buf());
        config.post_create_hooks = vec![HookSpec {
            command: "exit 1".to_owned(),
            repos: None,
            shell: None,
            timeout_seconds: Some(5),
            continue_on_error: false,
        }];
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);

        let err = svc.create("H-1", "", &sample_repos(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::HookFailed);
        assert!(!config.workspaces_root().join("H-1").exists());
        assert!(svc.storage.load("H-1").is_err());
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();
        let err = svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::WorkspaceExists);
    }

    #[test]
    fn add_repo_rejects_already_present_repo() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();
        let err = svc.add_repo("PROJ-1", "a", &CancelToken::new()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::RepoAlreadyExists);
    }

    #[test]
    fn remove_repo_rejects_dirty_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();
        git.dirty.lock().unwrap().insert("a".to_owned(), true);

        let err = svc.remove_repo("PROJ-1", "a", false).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::RepoNotClean);
        let ws = svc.storage.load("PROJ-1").unwrap();
        assert!(ws.repos.iter().any(|r| r.name == "a"));
    }

    #[test]
    fn remove_repo_succeeds_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();

        let ws = svc.remove_repo("PROJ-1", "a", false).unwrap();
        assert!(!ws.repos.iter().any(|r| r.name == "a"));
    }

    #[test]
    fn close_refuses_dirty_repo_and_force_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();
        git.dirty.lock().unwrap().insert("a".to_owned(), true);

        let err = svc.close("PROJ-1", CloseOptions::default()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::RepoNotClean);

        svc.close(
            "PROJ-1",
            CloseOptions {
                keep_metadata: Some(true),
                force: true,
            },
        )
        .unwrap();
        assert!(svc.storage.load("PROJ-1").is_err());
        assert_eq!(svc.list_closed().unwrap().len(), 1);
    }

    #[test]
    fn close_and_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();
        svc.close(
            "PROJ-1",
            CloseOptions {
                keep_metadata: Some(true),
                force: false,
            },
        )
        .unwrap();

        let reopened = svc.reopen("PROJ-1", false).unwrap();
        assert_eq!(reopened.repos.len(), 2);
        assert!(config.workspaces_root().join("PROJ-1").join("a").exists());
        assert!(svc.list_closed().unwrap().is_empty());
    }

    #[test]
    fn rename_moves_metadata_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();

        let renamed = svc.rename("PROJ-1", "PROJ-2", RenameOptions::default()).unwrap();
        assert_eq!(renamed.id, "PROJ-2");
        assert!(svc.storage.load("PROJ-1").is_err());
        assert!(svc.storage.load("PROJ-2").is_ok());
    }

    #[test]
    fn status_reports_per_repo_results() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();

        let status = svc.status("PROJ-1").unwrap();
        assert_eq!(status.repos.len(), 2);
        assert!(status.repos.iter().all(|r| r.error.is_none()));
    }

    #[test]
    fn status_batch_runs_every_id_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);
        svc.create("PROJ-1", "", &sample_repos(), &CancelToken::new()).unwrap();
        svc.create("PROJ-2", "", &sample_repos(), &CancelToken::new()).unwrap();

        let results = svc.status_batch(&["PROJ-1".to_owned(), "PROJ-2".to_owned()], Duration::from_secs(5));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|s| !s.branch.is_empty()));
    }

    #[test]
    fn status_batch_times_out_missing_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config = FakeConfig::new(dir.path().to_path_buf());
        let git = FakeGit::default();
        let svc = WorkspaceService::new(&config, &git);

        let results = svc.status_batch(&["missing".to_owned()], Duration::from_millis(50));
        assert_eq!(results.len(), 1);
        assert!(results[0].repos[0].error.is_some());
    }
}
