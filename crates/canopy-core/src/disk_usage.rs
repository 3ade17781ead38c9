//! Disk usage engine (component C4).
//!
//! Computes the total file size and latest modification time under a
//! workspace directory, excluding `.git`, and caches the result with a
//! short TTL keyed by the root path. The cache is invalidated on
//! close/reopen/rename per spec section 4.3, same mutex-guarded shape as
//! [`crate::cache::WorkspaceCache`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use crate::error::CanopyError;

/// The default cache time-to-live, per spec section 4.3.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2);

/// A directory's computed size and freshness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskUsage {
    pub size_bytes: u64,
    pub latest_mtime: SystemTime,
}

struct Entry {
    usage: DiskUsage,
    inserted_at: Instant,
}

/// A mutex-guarded `root_path → DiskUsage` cache with a fixed TTL.
pub struct DiskUsageCache {
    ttl: Duration,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl DiskUsageCache {
    /// Construct a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached usage for `root` if fresh, else recompute,
    /// cache, and return it.
    pub fn get_or_compute(&self, root: &Path) -> Result<DiskUsage, CanopyError> {
        {
            let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(entry) = entries.get(root) {
                if entry.inserted_at.elapsed() < self.ttl {
                    return Ok(entry.usage);
                }
            }
        }
        let usage = compute(root)?;
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            root.to_path_buf(),
            Entry {
                usage,
                inserted_at: Instant::now(),
            },
        );
        Ok(usage)
    }

    /// Evict the cached entry for `root`, if present.
    pub fn invalidate(&self, root: &Path) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(root);
    }
}

impl Default for DiskUsageCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Sum file sizes and find the latest mtime under `root`, excluding any
/// `.git` directory.
fn compute(root: &Path) -> Result<DiskUsage, CanopyError> {
    let mut size_bytes = 0u64;
    let mut latest_mtime = SystemTime::UNIX_EPOCH;
    walk(root, &mut size_bytes, &mut latest_mtime)?;
    Ok(DiskUsage {
        size_bytes,
        latest_mtime,
    })
}

fn walk(dir: &Path, size_bytes: &mut u64, latest_mtime: &mut SystemTime) -> Result<(), CanopyError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CanopyError::io_failed(e, None)),
    };
    for entry in read_dir {
        let entry = entry.map_err(|e| CanopyError::io_failed(e, None))?;
        if entry.file_name() == ".git" {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| CanopyError::io_failed(e, None))?;
        if file_type.is_dir() {
            walk(&entry.path(), size_bytes, latest_mtime)?;
        } else {
            let meta = entry.metadata().map_err(|e| CanopyError::io_failed(e, None))?;
            *size_bytes += meta.len();
            if let Ok(mtime) = meta.modified() {
                if mtime > *latest_mtime {
                    *latest_mtime = mtime;
                }
            }
        }
    }
    Ok(())
}
