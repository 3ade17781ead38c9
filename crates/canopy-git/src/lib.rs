//! Git backend for Canopy.
//!
//! Exposes [`GitAdapter`], the trait `canopy-core` drives all git access
//! through, and [`GixGitAdapter`], the real implementation: `gix`
//! in-process for clone/fetch/pull/push/status, a `git` subprocess for
//! worktree lifecycle management (`gix` has no high-level API for that
//! yet). No other crate in this repository should depend on `gix` or spawn
//! `git` directly — that isolation is the point of this crate.

mod adapter;
mod cancel;
mod error;
mod gix_adapter;
mod retry;
mod types;

pub use adapter::GitAdapter;
pub use cancel::CancelToken;
pub use error::GitError;
pub use gix_adapter::GixGitAdapter;
pub use retry::with_retry;
pub use types::{CanonicalRepo, CommandOutput, FetchTime, RepoStatus, RetryPolicy, WorktreeEntry};
