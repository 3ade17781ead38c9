//! Workspace orchestration engine for Canopy.
//!
//! This crate owns the domain: workspace lifecycle, locking, caching,
//! hook execution, repo resolution, and the canonical/orphan/export
//! sub-services. It drives all git access through [`canopy_git::GitAdapter`]
//! and never touches `gix` or the `git` binary directly — that isolation
//! lives entirely in `canopy-git`.

pub mod cache;
pub mod canonical;
pub mod config;
pub mod disk_usage;
pub mod error;
pub mod executor;
pub mod export_import;
pub mod facade;
pub mod git_workspace;
pub mod hooks;
pub mod lock;
pub mod model;
pub mod orphan;
pub mod resolver;
pub mod storage;

pub use cache::WorkspaceCache;
pub use canonical::{CanonicalRepoService, RemovePreview};
pub use config::{
    CloseMode, ConfigProvider, HookEvent, HookSpec, NamingTemplate, Registry, RegistryEntry,
};
pub use disk_usage::{DiskUsage, DiskUsageCache};
pub use error::{CanopyError, ErrorCode};
pub use executor::{parallel_map, ItemResult};
pub use export_import::{export, plan_import, ImportPlan};
pub use facade::{CloseOptions, RenameOptions, WorkspaceService};
pub use git_workspace::{GitWorkspaceService, RepoResult, RunGitOptions};
pub use hooks::{HookInvocation, RunOptions};
pub use lock::{LockHandle, LockManager};
pub use model::{
    ClosedWorkspace, ExportedRepoRef, HookContext, OrphanClass, OrphanFinding, RepoRef,
    RepoStatusEntry, Workspace, WorkspaceExport, WorkspaceStatus, CURRENT_SCHEMA_VERSION,
};
pub use orphan::OrphanService;
pub use resolver::{resolve, ResolvedRepo};
pub use storage::WorkspaceStorage;
