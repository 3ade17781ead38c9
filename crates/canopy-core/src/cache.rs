//! In-memory workspace cache (component C5).
//!
//! A short-TTL `id → Workspace` cache sitting in front of
//! [`crate::storage::WorkspaceStorage`], so repeated lookups within a
//! request (or across a burst of concurrent requests) don't each re-scan
//! `workspaces_root`. Invalidation happens inside the same lock region as
//! the mutation that caused it, per spec section 5 — callers must call
//! [`WorkspaceCache::invalidate`] themselves; this type does not watch the
//! filesystem.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::model::Workspace;

/// The default cache time-to-live, per spec section 4.3.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2);

struct Entry {
    workspace: Workspace,
    inserted_at: Instant,
}

/// A mutex-guarded `id → Workspace` cache with a fixed TTL.
pub struct WorkspaceCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl WorkspaceCache {
    /// Construct a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up `id`, returning `None` if absent or expired. Expired
    /// entries are evicted as a side effect.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Workspace> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match entries.get(id) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.workspace.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Insert or refresh the cached entry for `workspace.id`.
    pub fn put(&self, workspace: Workspace) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            workspace.id.clone(),
            Entry {
                workspace,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Evict `id`, if present.
    pub fn invalidate(&self, id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(id);
    }

    /// Evict every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.clear();
    }
}

impl Default for WorkspaceCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn sample(id: &str) -> Workspace {
        Workspace {
            version: 1,
            id: id.to_owned(),
            dir_name: None,
            branch_name: id.to_owned(),
            repos: vec![],
            created_at: Utc::now(),
            last_modified: Utc::now(),
            closed_at: None,
        }
    }

    fn arb_id() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_-]{0,15}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// A read within the TTL always sees what was last put for that id.
        #[test]
        fn prop_get_within_ttl_returns_last_put(id in arb_id()) {
            let cache = WorkspaceCache::new(Duration::from_secs(60));
            cache.put(sample(&id));
            let got = cache.get(&id);
            prop_assert!(got.is_some());
            prop_assert_eq!(got.unwrap().id, id);
        }

        /// Once a full TTL has elapsed, the entry is gone, whatever the id.
        #[test]
        fn prop_get_after_ttl_elapses_is_none(id in arb_id()) {
            let ttl = Duration::from_millis(5);
            let cache = WorkspaceCache::new(ttl);
            cache.put(sample(&id));
            std::thread::sleep(ttl * 8);
            prop_assert!(cache.get(&id).is_none());
        }

        /// Invalidating one id never affects another id's live entry.
        #[test]
        fn prop_invalidate_is_scoped_to_one_id(a in arb_id(), b in arb_id()) {
            prop_assume!(a != b);
            let cache = WorkspaceCache::new(Duration::from_secs(60));
            cache.put(sample(&a));
            cache.put(sample(&b));
            cache.invalidate(&a);
            prop_assert!(cache.get(&a).is_none());
            prop_assert!(cache.get(&b).is_some());
        }
    }
}
