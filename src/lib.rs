//! Canopy — workspace orchestration for isolated multi-repo git worktrees.
//!
//! This crate is a thin re-export of `canopy-core` (the domain: lifecycle,
//! locking, caching, hooks, resolver, and the sub-services) and
//! `canopy-git` (the `GitAdapter` trait and its `gix`-backed
//! implementation). Embedders — a CLI, a TUI, a config loader, a registry
//! store — live outside this repository and depend on this crate as their
//! single entry point, per spec.md §1's list of out-of-scope collaborators.

pub use canopy_core::*;

pub use canopy_git::{
    CancelToken, CanonicalRepo, CommandOutput, FetchTime, GitAdapter, GitError, GixGitAdapter,
    RepoStatus, RetryPolicy, WorktreeEntry,
};
