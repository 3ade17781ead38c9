//! Per-workspace advisory lock manager (component C6).
//!
//! Unlike an OS-level `flock` (e.g. the `fs2`-based config lock the
//! `worktrunk`-style tooling in the retrieval pack uses), this lock's
//! file *content* carries the holder's PID and acquire time so staleness
//! can be judged without holding the lock, exactly as spec section 4.4
//! specifies. Acquisition is a poll loop with exponential backoff and
//! jitter (the same shape as [`canopy_git::retry`], applied here to lock
//! contention instead of network failures) bounded by `lock_timeout`.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CanopyError;

const LOCK_FILE_NAME: &str = ".canopy.lock";
const POLL_INITIAL: Duration = Duration::from_millis(25);
const POLL_MAX: Duration = Duration::from_millis(500);
const POLL_MULTIPLIER: f64 = 1.5;
const POLL_JITTER: f64 = 0.25;

#[derive(Serialize, Deserialize)]
struct LockPayload {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// A held lock. Dropping (or explicitly calling [`LockHandle::release`])
/// removes the lock file; a missing file at release time is not an
/// error.
pub struct LockHandle {
    path: PathBuf,
}

impl LockHandle {
    /// Release the lock now instead of waiting for drop.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to release workspace lock");
            }
        }
    }
}

/// Acquires and reaps per-workspace `.canopy.lock` files.
pub struct LockManager {
    lock_timeout: Duration,
    stale_threshold: Duration,
}

impl LockManager {
    /// Construct a manager with the given acquire timeout and
    /// stale-lock threshold.
    #[must_use]
    pub fn new(lock_timeout: Duration, stale_threshold: Duration) -> Self {
        Self {
            lock_timeout,
            stale_threshold,
        }
    }

    /// Acquire the lock for the workspace directory `workspace_dir`. If
    /// `create_dir` is set, the directory is created first (used by
    /// `Create`, which locks a workspace that does not exist yet). Polls
    /// with exponential backoff + jitter until `lock_timeout` elapses,
    /// reaping any lock file whose mtime is older than
    /// `stale_threshold` before each retry.
    pub fn acquire(&self, workspace_dir: &Path, id: &str, create_dir: bool) -> Result<LockHandle, CanopyError> {
        if create_dir {
            std::fs::create_dir_all(workspace_dir).map_err(|e| CanopyError::io_failed(e, Some(id)))?;
        }
        let lock_path = workspace_dir.join(LOCK_FILE_NAME);
        let deadline = Instant::now() + self.lock_timeout;
        let mut attempt: u32 = 0;

        loop {
            match self.try_create(&lock_path) {
                Ok(()) => return Ok(LockHandle { path: lock_path }),
                Err(_) => {
                    if self.reap_if_stale(&lock_path) {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        let held_since = Self::read_held_since(&lock_path);
                        return Err(CanopyError::workspace_locked(id, held_since));
                    }
                    attempt += 1;
                    thread::sleep(poll_delay(attempt));
                }
            }
        }
    }

    fn try_create(&self, lock_path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(lock_path)?;
        let payload = LockPayload {
            pid: process::id(),
            acquired_at: Utc::now(),
        };
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        file.write_all(&json)?;
        Ok(())
    }

    /// Remove `lock_path` if its mtime is older than `stale_threshold`.
    /// Returns `true` if it removed (and the caller should retry
    /// immediately without sleeping).
    fn reap_if_stale(&self, lock_path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(lock_path) else {
            return true; // vanished between the failed create and here; retry now
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        if age > self.stale_threshold {
            let _ = std::fs::remove_file(lock_path);
            tracing::warn!(path = %lock_path.display(), age_secs = age.as_secs(), "reaped stale workspace lock");
            true
        } else {
            false
        }
    }

    fn read_held_since(lock_path: &Path) -> String {
        std::fs::read(lock_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<LockPayload>(&bytes).ok())
            .map(|payload| payload.acquired_at.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_owned())
    }
}

fn poll_delay(attempt: u32) -> Duration {
    let exp = POLL_MULTIPLIER.powi(i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX));
    let base = (POLL_INITIAL.as_secs_f64() * exp).min(POLL_MAX.as_secs_f64());
    let jitter = rand::rng().random_range(-POLL_JITTER..=POLL_JITTER);
    Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
}
