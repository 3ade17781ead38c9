//! Value types used in [`crate::GitAdapter`] signatures.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// A single canonical repository clone under `projects_root`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalRepo {
    /// The repo's unique name under `projects_root`.
    pub name: String,
    /// The absolute path of the bare clone.
    pub path: PathBuf,
    /// The upstream URL recorded in the clone's config at creation time.
    pub upstream_url: String,
}

/// The result of [`crate::GitAdapter::status`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoStatus {
    /// `true` if the worktree or index has uncommitted changes.
    pub is_dirty: bool,
    /// Commits reachable from local HEAD but not from the upstream
    /// remote-tracking ref.
    pub ahead: u64,
    /// Commits reachable from the upstream remote-tracking ref but not from
    /// local HEAD.
    pub behind: u64,
    /// The current branch name, or `None` if HEAD is detached.
    pub branch: Option<String>,
}

/// The result of [`crate::GitAdapter::run_command`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// The process exit code (platform-dependent if the process was
    /// terminated by a signal; `None` in that case).
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Returns `true` if the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Backoff parameters for retrying transient git operation failures.
///
/// Delay for attempt *k* (1-indexed) is
/// `min(initial_delay * multiplier^(k-1), max_delay) * (1 +/- jitter_factor)`,
/// per spec section 4.1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (non-retry) one.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the (pre-jitter) computed delay.
    pub max_delay: Duration,
    /// Multiplicative growth per attempt.
    pub multiplier: f64,
    /// Symmetric jitter fraction applied to the computed delay, e.g. `0.25`
    /// means the actual delay is within `+/-25%` of the computed value.
    pub jitter_factor: f64,
}

impl RetryPolicy {
    /// A conservative default: 5 attempts, 200ms initial delay doubling up
    /// to 10s, +/-25% jitter.
    #[must_use]
    pub const fn default_policy() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

/// A snapshot of a linked worktree as reported by `git worktree list`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorktreeEntry {
    /// Absolute path to the worktree.
    pub path: PathBuf,
    /// Branch checked out in the worktree, if any (`None` if detached).
    pub branch: Option<String>,
    /// `true` if git considers this worktree prunable (its directory is
    /// missing).
    pub prunable: bool,
}

/// Local alias for the time type used by [`crate::GitAdapter::last_fetch_time`].
pub type FetchTime = SystemTime;
