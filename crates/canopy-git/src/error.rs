//! Errors returned by [`crate::GitAdapter`] operations.
//!
//! [`GitError`] is deliberately lower-level than the core's typed error
//! (`canopy_core::error::CanopyError`): it classifies failures the way a
//! git backend sees them (not found, auth failure, dirty worktree, ...) so
//! that [`crate::retry`] can decide whether a failure is retryable without
//! string-matching a message. The core wraps every [`GitError`] it receives
//! into a `CanopyError` with `code = git_operation_failed` per the mapping
//! rule in spec section 4.1.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::GitAdapter`] operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A requested canonical repo, worktree, or ref was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// The target of a creating operation (clone, worktree add) already
    /// exists.
    #[error("already exists: {message}")]
    AlreadyExists {
        /// Human-readable description of the conflicting path/name.
        message: String,
    },

    /// An operation was refused because the working tree has uncommitted
    /// changes or unpushed commits.
    #[error("dirty worktree at {}: {message}", path.display())]
    DirtyWorktree {
        /// Path to the worktree root.
        path: PathBuf,
        /// What was dirty.
        message: String,
    },

    /// Authentication with the remote failed (bad credentials, no access).
    /// Never retryable.
    #[error("authentication failed for `{remote}`: {message}")]
    AuthFailed {
        /// The remote URL or name.
        remote: String,
        /// Details from the backend.
        message: String,
    },

    /// The remote rejected the request because the repository does not
    /// exist (HTTP 404 or equivalent). Never retryable.
    #[error("repository not found at `{url}`")]
    RepositoryNotFound {
        /// The URL that was requested.
        url: String,
    },

    /// A ref or revision spec could not be resolved. Never retryable.
    #[error("invalid ref `{spec}`: {message}")]
    InvalidRef {
        /// The ref or revision spec.
        spec: String,
        /// Why it failed to resolve.
        message: String,
    },

    /// A network operation (clone/fetch/pull/push) timed out, hit a reset
    /// connection, a DNS failure, or a 429/502/503/504 response. Retryable.
    #[error("network error during `{operation}`: {message}")]
    Network {
        /// The operation being attempted (e.g. `"fetch"`).
        operation: String,
        /// Details from the backend.
        message: String,
    },

    /// A push to a remote was rejected (non-fast-forward, protected branch,
    /// ...). Not retryable — the caller must resolve the conflict first.
    #[error("push to `{remote}` failed: {message}")]
    PushFailed {
        /// The remote name (e.g. `"origin"`).
        remote: String,
        /// Details about the rejection.
        message: String,
    },

    /// The caller's [`crate::cancel::CancelToken`] was cancelled while the
    /// operation was in flight or waiting to retry.
    #[error("operation cancelled")]
    Cancelled,

    /// A spawned `git` subprocess (the CLI escape hatch) exited non-zero.
    #[error("`git {args}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        /// The arguments passed to `git` (joined for display).
        args: String,
        /// The process exit code, if the process actually ran.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// An I/O error occurred (file system, process spawn, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying git backend (gix or the CLI escape hatch) returned an
    /// unclassified error. Catch-all; `message` should carry enough detail
    /// to diagnose the failure.
    #[error("git backend error: {message}")]
    BackendError {
        /// Freeform error description from the backend.
        message: String,
    },
}

impl GitError {
    /// Returns `true` if this error represents a transient fault eligible
    /// for the retry policy in spec section 4.1: network timeouts,
    /// connection reset/refused, DNS failures, and 429/502/503/504-mapped
    /// errors. Authentication failures, 401/403/404-mapped errors,
    /// repository-not-found, invalid-ref errors, and cancellation are never
    /// retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        let err = GitError::Network {
            operation: "fetch".to_owned(),
            message: "connection reset".to_owned(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn auth_failures_are_not_retryable() {
        let err = GitError::AuthFailed {
            remote: "origin".to_owned(),
            message: "bad credentials".to_owned(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn cancellation_is_not_retryable() {
        assert!(!GitError::Cancelled.is_retryable());
    }

    #[test]
    fn repository_not_found_is_not_retryable() {
        let err = GitError::RepositoryNotFound {
            url: "https://example.com/x.git".to_owned(),
        };
        assert!(!err.is_retryable());
    }
}
