//! Configuration surface the core reads, injected rather than loaded.
//!
//! Loading `CANOPY_`-prefixed environment overrides, parsing a config
//! file, and persisting the registry are all out of scope here (spec
//! section 1's external collaborators) — this module only defines the
//! shape the core needs and a trait so callers (and tests) can supply it
//! however they like. Compare the teacher's `MawConfig` accessor methods
//! (`branch()`, `default_workspace()`): same idea, but expressed as a
//! trait object boundary so a fake can stand in during tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use canopy_git::RetryPolicy;

/// Where a closed workspace's metadata goes when it is closed: kept on
/// disk under `closed_root` (`Archive`), or discarded (`Delete`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseMode {
    Archive,
    Delete,
}

/// How a workspace `id` becomes its directory name under
/// `workspaces_root`. `Identity` (the default) uses the id verbatim;
/// `Template` substitutes `{{id}}` in an arbitrary pattern (e.g. to
/// lowercase or namespace directory names without changing the
/// user-visible id).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamingTemplate {
    Identity,
    Template(String),
}

impl NamingTemplate {
    /// Render the directory name for workspace `id`.
    #[must_use]
    pub fn render(&self, id: &str) -> String {
        match self {
            Self::Identity => id.to_owned(),
            Self::Template(pattern) => pattern.replace("{{id}}", id),
        }
    }
}

/// A single lifecycle hook definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookSpec {
    /// The (unexpanded) shell command.
    pub command: String,
    /// If set, run once per listed repo name instead of once at the
    /// workspace root.
    pub repos: Option<Vec<String>>,
    /// Shell to invoke the command with (`sh -c` semantics). Defaults to
    /// the user's login shell when `None`.
    pub shell: Option<String>,
    /// Per-hook timeout override; defaults to 30s when `None`.
    pub timeout_seconds: Option<u64>,
    /// If true, a failure of this hook is logged and execution continues
    /// regardless of the caller's `continue_on_error`.
    pub continue_on_error: bool,
}

/// The lifecycle point a set of hooks is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookEvent {
    PostCreate,
    PreClose,
    PostClose,
    PreReopen,
    PostReopen,
}

/// A registered alias → canonical (name, URL) mapping, consulted by the
/// repo resolver (C9) and by export/import (C13).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<String, RegistryEntry>,
}

/// A single registry entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryEntry {
    pub alias: String,
    pub name: String,
    pub url: String,
}

impl Registry {
    /// Build a registry from entries.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.alias.clone(), e)).collect(),
        }
    }

    /// Look up an entry by alias.
    #[must_use]
    pub fn resolve_alias(&self, alias: &str) -> Option<&RegistryEntry> {
        self.entries.get(alias)
    }

    /// Find the registry entry (if any) whose URL matches `url`, used by
    /// export to attach an alias to each repo when possible.
    #[must_use]
    pub fn find_by_url(&self, url: &str) -> Option<&RegistryEntry> {
        self.entries.values().find(|e| e.url == url)
    }
}

/// Configuration the core reads, per spec section 6. Loading, parsing,
/// and environment-variable overrides are the embedder's responsibility;
/// this trait is the seam tests substitute a fake across.
pub trait ConfigProvider: Send + Sync {
    /// Root directory holding canonical (bare-ish) clones.
    fn projects_root(&self) -> PathBuf;
    /// Root directory holding active workspace directories.
    fn workspaces_root(&self) -> PathBuf;
    /// Root directory holding archived workspace metadata.
    fn closed_root(&self) -> PathBuf;
    /// How workspace ids map to directory names.
    fn naming_template(&self) -> NamingTemplate;
    /// Age (in days) after which an orphan/disk-usage scan flags a
    /// workspace as stale.
    fn stale_threshold_days(&self) -> u32;
    /// Worker count for the parallel executor (C7); validated 1..=N by
    /// callers, default 4.
    fn parallel_workers(&self) -> usize;
    /// Bound on the lock manager's (C6) acquire poll.
    fn lock_timeout(&self) -> Duration;
    /// Age after which an uncontended lock file is considered abandoned.
    fn lock_stale_threshold(&self) -> Duration;
    /// Backoff policy for the git adapter's network-bound operations.
    fn git_retry_policy(&self) -> RetryPolicy;
    /// Default behavior of `Close` when the caller does not override it.
    fn close_default(&self) -> CloseMode;
    /// The repo alias registry.
    fn registry(&self) -> Registry;
    /// Hooks configured for `event`, in execution order.
    fn hooks(&self, event: HookEvent) -> Vec<HookSpec>;
}
