//! Workspace-scoped git actions (component C12).
//!
//! Push-all, arbitrary-git-across-repos, and branch switching, all driven
//! through [`crate::executor::parallel_map`] when the caller asks for
//! concurrency and serial otherwise. Per spec section 9's open question
//! (a), parallel `run_git` buffers each repo's stdout/stderr rather than
//! interleaving, so results stay deterministic regardless of completion
//! order — the same "collect results back by index" shape
//! [`crate::executor`] already provides.

use canopy_git::{CancelToken, GitAdapter};

use crate::error::CanopyError;
use crate::executor::parallel_map;
use crate::storage::WorkspaceStorage;

/// The outcome of running one command in one repo, per spec section
/// 4.10. Exactly one of `output`/`error` is `Some`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoResult {
    pub repo_name: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

/// Options shared by [`GitWorkspaceService::run_git`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RunGitOptions {
    /// Run across repos concurrently instead of the default serial order.
    pub parallel: bool,
    /// Keep running in every repo even if one fails.
    pub continue_on_error: bool,
}

/// Workspace-scoped git operations spanning every repo of a workspace.
pub struct GitWorkspaceService<'a> {
    git: &'a dyn GitAdapter,
    storage: &'a WorkspaceStorage,
    parallel_workers: usize,
}

impl<'a> GitWorkspaceService<'a> {
    /// Construct a service over the given git backend and storage, using
    /// `parallel_workers` for operations that opt into concurrency.
    #[must_use]
    pub fn new(git: &'a dyn GitAdapter, storage: &'a WorkspaceStorage, parallel_workers: usize) -> Self {
        Self {
            git,
            storage,
            parallel_workers,
        }
    }

    /// Push the workspace branch for every repo. Fail-fast: the first
    /// failing push cancels the rest.
    pub fn push_workspace(&self, id: &str, cancel: &CancelToken) -> Result<(), CanopyError> {
        let ws = self.storage.load(id)?;
        let workspace_dir = self.storage.workspace_dir(ws.effective_dir_name());
        let branch = ws.branch_name.clone();

        let results = parallel_map(self.parallel_workers, ws.repos.len(), cancel, false, |idx, cancel| {
            let repo = &ws.repos[idx];
            let path = workspace_dir.join(&repo.name);
            self.git
                .push(&path, Some(&branch), cancel)
                .map_err(|e| CanopyError::git_operation_failed("push", e))
        });

        results
            .into_iter()
            .find_map(|r| r.err)
            .map_or(Ok(()), Err)
    }

    /// Run an arbitrary git subcommand in every repo of the workspace,
    /// serial by default (so stdout is deterministic) or concurrently
    /// when `opts.parallel` is set; order of results always follows
    /// workspace repo order regardless.
    pub fn run_git(&self, id: &str, args: &[&str], opts: RunGitOptions) -> Result<Vec<RepoResult>, CanopyError> {
        let ws = self.storage.load(id)?;
        let workspace_dir = self.storage.workspace_dir(ws.effective_dir_name());

        if opts.parallel {
            let cancel = CancelToken::new();
            let outcomes = parallel_map(self.parallel_workers, ws.repos.len(), &cancel, opts.continue_on_error, |idx, _cancel| {
                let repo = &ws.repos[idx];
                let path = workspace_dir.join(&repo.name);
                Ok::<_, CanopyError>(run_one(self.git, &repo.name, &path, args))
            });
            return Ok(outcomes.into_iter().map(|r| r.value.unwrap_or_else(|| RepoResult {
                repo_name: String::new(),
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                error: r.err.map(|e| e.to_string()),
            })).collect());
        }

        let mut results = Vec::with_capacity(ws.repos.len());
        for repo in &ws.repos {
            let path = workspace_dir.join(&repo.name);
            let result = run_one(self.git, &repo.name, &path, args);
            let failed = result.error.is_some();
            results.push(result);
            if failed && !opts.continue_on_error {
                break;
            }
        }
        Ok(results)
    }

    /// Check out (or create) `branch` across every repo. On partial
    /// failure, rolls back every repo already switched back to its
    /// branch as recorded before the operation started.
    pub fn switch_branch(&self, id: &str, branch: &str, create: bool) -> Result<(), CanopyError> {
        let mut ws = self.storage.load(id)?;
        let workspace_dir = self.storage.workspace_dir(ws.effective_dir_name());
        let previous_branches: Vec<Option<String>> = ws
            .repos
            .iter()
            .map(|repo| {
                self.git
                    .status(&workspace_dir.join(&repo.name))
                    .ok()
                    .and_then(|s| s.branch)
            })
            .collect();

        let mut switched = Vec::new();
        for repo in &ws.repos {
            let path = workspace_dir.join(&repo.name);
            match self.git.checkout(&path, branch, create) {
                Ok(()) => switched.push(path),
                Err(e) => {
                    for (path, prior) in switched.iter().zip(previous_branches.iter()) {
                        if let Some(prior) = prior {
                            if let Err(rollback_err) = self.git.checkout(path, prior, false) {
                                tracing::warn!(path = %path.display(), error = %rollback_err, "failed to roll back branch switch");
                            }
                        }
                    }
                    return Err(CanopyError::git_operation_failed("checkout", e));
                }
            }
        }

        ws.branch_name = branch.to_owned();
        ws.last_modified = chrono::Utc::now();
        self.storage.save(&mut ws)
    }
}

fn run_one(git: &dyn GitAdapter, repo_name: &str, path: &std::path::Path, args: &[&str]) -> RepoResult {
    match git.run_command(path, args) {
        Ok(output) => RepoResult {
            repo_name: repo_name.to_owned(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            error: None,
        },
        Err(e) => RepoResult {
            repo_name: repo_name.to_owned(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            error: Some(e.to_string()),
        },
    }
}
