//! `gix`-backed implementation of [`GitAdapter`], with a `git` subprocess
//! escape hatch for worktree lifecycle management.
//!
//! `gix` has no high-level worktree add/remove/prune API (tracked
//! upstream but not yet available), so [`GixGitAdapter::create_worktree`],
//! [`GixGitAdapter::remove_worktree`], and [`GixGitAdapter::prune_worktrees`]
//! shell out to the `git` binary. Every other method goes through `gix`
//! in-process. This split, and the isolation of the CLI calls behind this
//! one module, is the documented escape hatch from spec section 4.1/9.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use crate::adapter::GitAdapter;
use crate::cancel::CancelToken;
use crate::error::GitError;
use crate::retry::with_retry;
use crate::types::{CanonicalRepo, CommandOutput, FetchTime, RepoStatus, RetryPolicy, WorktreeEntry};

/// A [`GitAdapter`] backed by `gix` for in-process reads and clone/fetch/
/// pull/push, and by the `git` binary for worktree lifecycle operations.
pub struct GixGitAdapter {
    /// Root directory under which canonical bare clones live, one
    /// subdirectory per repo name.
    projects_root: PathBuf,
    /// Backoff policy applied to clone/fetch/pull/push.
    retry_policy: RetryPolicy,
}

impl GixGitAdapter {
    /// Construct an adapter rooted at `projects_root`, using
    /// [`RetryPolicy::default_policy`].
    #[must_use]
    pub fn new(projects_root: PathBuf) -> Self {
        Self {
            projects_root,
            retry_policy: RetryPolicy::default_policy(),
        }
    }

    /// Construct an adapter with an explicit retry policy.
    #[must_use]
    pub fn with_retry_policy(projects_root: PathBuf, retry_policy: RetryPolicy) -> Self {
        Self {
            projects_root,
            retry_policy,
        }
    }

    fn canonical_path(&self, name: &str) -> PathBuf {
        self.projects_root.join(name)
    }

    fn run_git(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(GitError::Io)?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    fn run_git_checked(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        let output = self.run_git(dir, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                args: args.join(" "),
                exit_code: output.exit_code.unwrap_or(-1),
                stderr: output.stderr,
            })
        }
    }

    fn classify_clone_error(message: &str, url: &str) -> GitError {
        let lower = message.to_lowercase();
        if lower.contains("could not read username") || lower.contains("authentication") || lower.contains("permission denied") {
            GitError::AuthFailed {
                remote: url.to_owned(),
                message: message.to_owned(),
            }
        } else if lower.contains("not found") || lower.contains("404") {
            GitError::RepositoryNotFound { url: url.to_owned() }
        } else if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("connection reset")
            || lower.contains("could not resolve host")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
            || lower.contains("429")
        {
            GitError::Network {
                operation: "clone".to_owned(),
                message: message.to_owned(),
            }
        } else {
            GitError::BackendError {
                message: message.to_owned(),
            }
        }
    }
}

impl GitAdapter for GixGitAdapter {
    fn ensure_canonical(
        &self,
        url: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<CanonicalRepo, GitError> {
        let path = self.canonical_path(name);
        if path.exists() {
            let repo = gix::open(&path).map_err(|e| GitError::BackendError {
                message: format!("opening existing canonical repo `{name}`: {e}"),
            })?;
            let upstream_url = repo
                .find_default_remote(gix::remote::Direction::Fetch)
                .and_then(Result::ok)
                .and_then(|remote| remote.url(gix::remote::Direction::Fetch).map(ToString::to_string))
                .unwrap_or_default();
            return Ok(CanonicalRepo {
                name: name.to_owned(),
                path,
                upstream_url,
            });
        }
        self.clone_repo(url, name, cancel)
    }

    fn clone_repo(
        &self,
        url: &str,
        name: &str,
        cancel: &CancelToken,
    ) -> Result<CanonicalRepo, GitError> {
        let path = self.canonical_path(name);
        if path.exists() {
            return Err(GitError::AlreadyExists {
                message: format!("canonical repo `{name}` already exists at {}", path.display()),
            });
        }
        with_retry(&self.retry_policy, cancel, || {
            let url_parsed = gix::url::parse(url.into()).map_err(|e| GitError::InvalidRef {
                spec: url.to_owned(),
                message: e.to_string(),
            })?;
            // Canonical repos are bare: no working tree is ever checked out
            // at `projects_root/<name>` itself, only linked worktrees under
            // `workspaces_root` (spec section 3/6). `prepare_clone_bare` +
            // `fetch_only` mirrors `git clone --bare` without the
            // checkout step `prepare_clone`/`fetch_then_checkout` performs.
            let mut prepare = gix::prepare_clone_bare(url_parsed, &path)
                .map_err(|e| Self::classify_clone_error(&e.to_string(), url))?;
            prepare
                .fetch_only(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
                .map_err(|e| Self::classify_clone_error(&e.to_string(), url))?;
            Ok(())
        })?;
        Ok(CanonicalRepo {
            name: name.to_owned(),
            path,
            upstream_url: url.to_owned(),
        })
    }

    fn create_worktree(&self, name: &str, worktree_path: &Path, branch: &str) -> Result<(), GitError> {
        let repo_path = self.canonical_path(name);
        if !repo_path.exists() {
            return Err(GitError::NotFound {
                message: format!("canonical repo `{name}` does not exist"),
            });
        }
        self.run_git_checked(
            &repo_path,
            &[
                "worktree",
                "add",
                "-B",
                branch,
                &worktree_path.to_string_lossy(),
            ],
        )?;
        // `worktree add -B` creates a fresh branch with no upstream
        // configured. Point it at `origin/<branch>` up front so the first
        // `git push` from inside the worktree publishes upstream rather
        // than failing with "no upstream branch" (spec section 4.1).
        let merge_ref = format!("refs/heads/{branch}");
        self.run_git_checked(worktree_path, &["config", "--local", &format!("branch.{branch}.remote"), "origin"])?;
        self.run_git_checked(worktree_path, &["config", "--local", &format!("branch.{branch}.merge"), &merge_ref])?;
        Ok(())
    }

    fn remove_worktree(&self, name: &str, worktree_path: &Path, force: bool) -> Result<(), GitError> {
        let repo_path = self.canonical_path(name);
        if !repo_path.exists() {
            return Err(GitError::NotFound {
                message: format!("canonical repo `{name}` does not exist"),
            });
        }
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        let path_str = worktree_path.to_string_lossy().into_owned();
        args.push(&path_str);
        let output = self.run_git(&repo_path, &args)?;
        if output.success() {
            return Ok(());
        }
        if output.stderr.contains("contains modified or untracked files") {
            return Err(GitError::DirtyWorktree {
                path: worktree_path.to_path_buf(),
                message: output.stderr,
            });
        }
        Err(GitError::CommandFailed {
            args: args.join(" "),
            exit_code: output.exit_code.unwrap_or(-1),
            stderr: output.stderr,
        })
    }

    fn prune_worktrees(&self, name: &str) -> Result<(), GitError> {
        let repo_path = self.canonical_path(name);
        self.run_git_checked(&repo_path, &["worktree", "prune"])?;
        Ok(())
    }

    fn list_worktrees(&self, name: &str) -> Result<Vec<WorktreeEntry>, GitError> {
        let repo_path = self.canonical_path(name);
        let output = self.run_git_checked(&repo_path, &["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&output.stdout))
    }

    fn fetch(&self, name: &str, cancel: &CancelToken) -> Result<(), GitError> {
        let repo_path = self.canonical_path(name);
        with_retry(&self.retry_policy, cancel, || {
            let repo = gix::open(&repo_path).map_err(|e| GitError::BackendError {
                message: format!("opening canonical repo `{name}`: {e}"),
            })?;
            let remote = repo
                .find_default_remote(gix::remote::Direction::Fetch)
                .ok_or_else(|| GitError::NotFound {
                    message: format!("no default remote configured for `{name}`"),
                })?
                .map_err(|e| GitError::BackendError { message: e.to_string() })?;
            let connection = remote
                .connect(gix::remote::Direction::Fetch)
                .map_err(|e| Self::classify_clone_error(&e.to_string(), name))?;
            connection
                .prepare_fetch(gix::progress::Discard, Default::default())
                .map_err(|e| Self::classify_clone_error(&e.to_string(), name))?
                .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
                .map_err(|e| Self::classify_clone_error(&e.to_string(), name))?;
            Ok(())
        })
    }

    fn pull(&self, path: &Path, cancel: &CancelToken) -> Result<(), GitError> {
        with_retry(&self.retry_policy, cancel, || {
            self.run_git_checked(path, &["pull", "--ff-only"])?;
            Ok(())
        })
    }

    fn push(&self, path: &Path, branch: Option<&str>, cancel: &CancelToken) -> Result<(), GitError> {
        with_retry(&self.retry_policy, cancel, || {
            // `--set-upstream` is a no-op once tracking already exists, and
            // establishes it on the first push otherwise (spec section
            // 4.1's "Push establishes upstream tracking on first push").
            let mut args = vec!["push", "--set-upstream", "origin"];
            if let Some(branch) = branch {
                args.push(branch);
            }
            let output = self.run_git(path, &args)?;
            if output.success() {
                return Ok(());
            }
            let lower = output.stderr.to_lowercase();
            if lower.contains("non-fast-forward") || lower.contains("rejected") || lower.contains("protected branch") {
                return Err(GitError::PushFailed {
                    remote: "origin".to_owned(),
                    message: output.stderr,
                });
            }
            if lower.contains("timed out") || lower.contains("connection reset") || lower.contains("could not resolve host") {
                return Err(GitError::Network {
                    operation: "push".to_owned(),
                    message: output.stderr,
                });
            }
            Err(GitError::CommandFailed {
                args: args.join(" "),
                exit_code: output.exit_code.unwrap_or(-1),
                stderr: output.stderr,
            })
        })
    }

    fn status(&self, path: &Path) -> Result<RepoStatus, GitError> {
        let repo = gix::open(path).map_err(|e| GitError::BackendError {
            message: format!("opening worktree at {}: {e}", path.display()),
        })?;

        let is_dirty = repo
            .status(gix::progress::Discard)
            .map_err(|e| GitError::BackendError { message: e.to_string() })?
            .into_iter(None)
            .map_err(|e| GitError::BackendError { message: e.to_string() })?
            .next()
            .is_some();

        let branch = repo
            .head_name()
            .map_err(|e| GitError::BackendError { message: e.to_string() })?
            .map(|name| name.shorten().to_string());

        let (ahead, behind) = match &branch {
            Some(name) => compute_ahead_behind(&repo, name)?,
            None => (0, 0),
        };

        Ok(RepoStatus {
            is_dirty,
            ahead,
            behind,
            branch,
        })
    }

    fn checkout(&self, path: &Path, branch: &str, create: bool) -> Result<(), GitError> {
        let mut args = vec!["checkout"];
        if create {
            args.push("-B");
        }
        args.push(branch);
        self.run_git_checked(path, &args)?;
        Ok(())
    }

    fn list_canonical_repos(&self) -> Result<Vec<String>, GitError> {
        let mut names = Vec::new();
        if !self.projects_root.exists() {
            return Ok(names);
        }
        for entry in std::fs::read_dir(&self.projects_root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn last_fetch_time(&self, name: &str) -> Result<Option<FetchTime>, GitError> {
        // Canonical repos are bare, so this is a path directly under the
        // repo root, not under a `.git` subdirectory as in a checkout.
        let fetch_head = self.canonical_path(name).join("FETCH_HEAD");
        match std::fs::metadata(&fetch_head) {
            Ok(meta) => Ok(Some(meta.modified().unwrap_or_else(|_| SystemTime::now()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GitError::Io(e)),
        }
    }

    fn repo_size(&self, name: &str) -> Result<u64, GitError> {
        let path = self.canonical_path(name);
        if !path.exists() {
            return Err(GitError::NotFound {
                message: format!("canonical repo `{name}` does not exist"),
            });
        }
        Ok(dir_size(&path)?)
    }

    fn run_command(&self, path: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        self.run_git(path, args)
    }
}

fn compute_ahead_behind(repo: &gix::Repository, branch: &str) -> Result<(u64, u64), GitError> {
    let local = match repo.rev_parse_single(branch) {
        Ok(id) => id.detach(),
        Err(_) => return Ok((0, 0)),
    };
    let upstream_spec = format!("refs/remotes/origin/{branch}");
    let upstream = match repo.rev_parse_single(upstream_spec.as_str()) {
        Ok(id) => id.detach(),
        Err(_) => return Ok((0, 0)),
    };
    if local == upstream {
        return Ok((0, 0));
    }
    let ahead = repo
        .rev_walk([local])
        .with_boundary([upstream])
        .all()
        .map_err(|e| GitError::BackendError { message: e.to_string() })?
        .count() as u64;
    let behind = repo
        .rev_walk([upstream])
        .with_boundary([local])
        .all()
        .map_err(|e| GitError::BackendError { message: e.to_string() })?
        .count() as u64;
    Ok((ahead, behind))
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn parse_worktree_list(porcelain: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;
    let mut prunable = false;

    let flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>, prunable: &mut bool, out: &mut Vec<WorktreeEntry>| {
        if let Some(path) = path.take() {
            out.push(WorktreeEntry {
                path,
                branch: branch.take(),
                prunable: *prunable,
            });
        }
        *prunable = false;
    };

    for line in porcelain.lines() {
        if let Some(rest) = line.strip_prefix("worktree ") {
            flush(&mut path, &mut branch, &mut prunable, &mut entries);
            path = Some(PathBuf::from(rest));
        } else if let Some(rest) = line.strip_prefix("branch ") {
            branch = Some(rest.trim_start_matches("refs/heads/").to_owned());
        } else if line == "prunable" {
            prunable = true;
        } else if line.is_empty() {
            flush(&mut path, &mut branch, &mut prunable, &mut entries);
        }
    }
    flush(&mut path, &mut branch, &mut prunable, &mut entries);
    entries
}
