//! Workspace metadata persistence (component C3).
//!
//! Active workspaces live at `workspaces_root/<dir_name>/workspace.yaml`;
//! closed ones move to `closed_root/<dir_name>/<timestamp>/workspace.yaml`.
//! Writes go to a sibling temp file and are renamed into place so a crash
//! mid-write never leaves a half-written `workspace.yaml` behind —
//! generalizing the temp-file-then-rename idiom the teacher uses for its
//! own on-disk writes, and the `.ws.yaml`-per-directory layout the wider
//! retrieval pack's workspace managers use, to the richer workspace model
//! this system needs.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{CanopyError, ErrorCode};
use crate::model::{ClosedWorkspace, Workspace, CURRENT_SCHEMA_VERSION};

/// Reads and writes workspace metadata under `workspaces_root` and
/// `closed_root`. Holds no lock itself — callers serialize access via the
/// lock manager (C6).
pub struct WorkspaceStorage {
    workspaces_root: PathBuf,
    closed_root: PathBuf,
}

impl WorkspaceStorage {
    /// Construct storage rooted at the given directories. Neither needs
    /// to exist yet.
    #[must_use]
    pub fn new(workspaces_root: PathBuf, closed_root: PathBuf) -> Self {
        Self {
            workspaces_root,
            closed_root,
        }
    }

    /// The active workspace directory for `dir_name`.
    #[must_use]
    pub fn workspace_dir(&self, dir_name: &str) -> PathBuf {
        self.workspaces_root.join(dir_name)
    }

    /// Create a brand-new active workspace. Fails with `workspace_exists`
    /// if the target directory is already present. Normalizes `ws.version`
    /// to the version actually persisted (see [`Self::write_metadata`]).
    pub fn create(&self, ws: &mut Workspace) -> Result<(), CanopyError> {
        let dir = self.workspace_dir(ws.effective_dir_name());
        if dir.exists() {
            return Err(CanopyError::workspace_exists(&ws.id));
        }
        fs::create_dir_all(&dir).map_err(|e| CanopyError::io_failed(e, Some(&ws.id)))?;
        ws.version = self.write_metadata(&dir, &*ws)?;
        Ok(())
    }

    /// Overwrite an existing active workspace's metadata. Normalizes
    /// `ws.version` to the version actually persisted.
    pub fn save(&self, ws: &mut Workspace) -> Result<(), CanopyError> {
        let dir = self.workspace_dir(ws.effective_dir_name());
        ws.version = self.write_metadata(&dir, &*ws)?;
        Ok(())
    }

    /// Serializes `ws`, normalizing its schema version first: per spec
    /// section 4.2, every save emits `CURRENT_SCHEMA_VERSION`, *except*
    /// when the in-memory value is already a newer, not-yet-understood
    /// version, in which case it is preserved untouched rather than
    /// downgraded.
    fn write_metadata(&self, dir: &Path, ws: &Workspace) -> Result<u32, CanopyError> {
        let mut ws = ws.clone();
        if ws.version <= CURRENT_SCHEMA_VERSION {
            ws.version = CURRENT_SCHEMA_VERSION;
        }
        let yaml = serde_yaml::to_string(&ws).map_err(|e| {
            CanopyError::new(ErrorCode::WorkspaceMetadataError, e.to_string()).with_context("id", ws.id.clone())
        })?;
        let final_path = dir.join("workspace.yaml");
        let tmp_path = dir.join(".workspace.yaml.tmp");
        fs::write(&tmp_path, yaml).map_err(|e| CanopyError::io_failed(e, Some(&ws.id)))?;
        fs::rename(&tmp_path, &final_path).map_err(|e| CanopyError::io_failed(e, Some(&ws.id)))?;
        Ok(ws.version)
    }

    fn read_metadata(path: &Path, fallback_dir_name: &str) -> Result<Workspace, CanopyError> {
        let raw = fs::read_to_string(path).map_err(|e| CanopyError::io_failed(e, None))?;
        let mut ws: Workspace = serde_yaml::from_str(&raw)
            .map_err(|e| CanopyError::new(ErrorCode::WorkspaceMetadataError, e.to_string()))?;
        if ws.dir_name.is_none() {
            ws.dir_name = Some(fallback_dir_name.to_owned());
        }
        Ok(ws)
    }

    /// Load an active workspace by id. `O(n)` over the directory listing
    /// — fine at this system's scale, and the reason the in-memory
    /// workspace cache (C5) exists in front of it.
    pub fn load(&self, id: &str) -> Result<Workspace, CanopyError> {
        self.list()?
            .into_iter()
            .find(|ws| ws.id == id)
            .ok_or_else(|| CanopyError::workspace_not_found(id))
    }

    /// Enumerate all active workspaces.
    pub fn list(&self) -> Result<Vec<Workspace>, CanopyError> {
        let mut out = Vec::new();
        if !self.workspaces_root.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.workspaces_root).map_err(|e| CanopyError::io_failed(e, None))? {
            let entry = entry.map_err(|e| CanopyError::io_failed(e, None))?;
            if !entry.file_type().map_err(|e| CanopyError::io_failed(e, None))?.is_dir() {
                continue;
            }
            let metadata_path = entry.path().join("workspace.yaml");
            if !metadata_path.exists() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            out.push(Self::read_metadata(&metadata_path, &dir_name)?);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Delete an active workspace's directory. Idempotent: deleting an
    /// id that is already gone is not an error.
    pub fn delete(&self, id: &str) -> Result<(), CanopyError> {
        match self.load(id) {
            Ok(ws) => {
                let dir = self.workspace_dir(ws.effective_dir_name());
                if dir.exists() {
                    fs::remove_dir_all(&dir).map_err(|e| CanopyError::io_failed(e, Some(id)))?;
                }
                Ok(())
            }
            Err(e) if e.code() == ErrorCode::WorkspaceNotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Rename a workspace's id (and, correspondingly, its directory) to
    /// `new_id`/`new_dir_name`. Fails with `workspace_exists` if a
    /// workspace already occupies the target directory.
    pub fn rename(&self, old_id: &str, new_id: &str, new_dir_name: &str) -> Result<Workspace, CanopyError> {
        let mut ws = self.load(old_id)?;
        let old_dir = self.workspace_dir(ws.effective_dir_name());
        let new_dir = self.workspace_dir(new_dir_name);
        if new_dir != old_dir && new_dir.exists() {
            return Err(CanopyError::workspace_exists(new_id));
        }
        if new_dir != old_dir {
            fs::rename(&old_dir, &new_dir).map_err(|e| CanopyError::io_failed(e, Some(old_id)))?;
        }
        ws.id = new_id.to_owned();
        ws.dir_name = Some(new_dir_name.to_owned());
        ws.last_modified = Utc::now();
        ws.version = self.write_metadata(&new_dir, &ws)?;
        Ok(ws)
    }

    /// Move an active workspace's metadata into `closed_root`, stamping
    /// `closed_at`. Callers are responsible for removing worktrees
    /// *before* calling this — storage only moves the directory tree.
    pub fn close(&self, id: &str, closed_at: DateTime<Utc>) -> Result<ClosedWorkspace, CanopyError> {
        let mut ws = self.load(id)?;
        let dir = self.workspace_dir(ws.effective_dir_name());
        ws.closed_at = Some(closed_at);
        let timestamp = closed_at.format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let archive_dir = self.closed_root.join(ws.effective_dir_name()).join(&timestamp);
        if let Some(parent) = archive_dir.parent() {
            fs::create_dir_all(parent).map_err(|e| CanopyError::io_failed(e, Some(id)))?;
        }
        fs::rename(&dir, &archive_dir).map_err(|e| CanopyError::io_failed(e, Some(id)))?;
        ws.version = self.write_metadata(&archive_dir, &ws)?;
        Ok(ClosedWorkspace {
            workspace: ws,
            archive_path: archive_dir,
        })
    }

    /// Enumerate all archived workspaces across all ids and timestamps.
    pub fn list_closed(&self) -> Result<Vec<ClosedWorkspace>, CanopyError> {
        let mut out = Vec::new();
        if !self.closed_root.exists() {
            return Ok(out);
        }
        for dir_entry in fs::read_dir(&self.closed_root).map_err(|e| CanopyError::io_failed(e, None))? {
            let dir_entry = dir_entry.map_err(|e| CanopyError::io_failed(e, None))?;
            if !dir_entry.file_type().map_err(|e| CanopyError::io_failed(e, None))?.is_dir() {
                continue;
            }
            let dir_name = dir_entry.file_name().to_string_lossy().into_owned();
            for ts_entry in fs::read_dir(dir_entry.path()).map_err(|e| CanopyError::io_failed(e, None))? {
                let ts_entry = ts_entry.map_err(|e| CanopyError::io_failed(e, None))?;
                let metadata_path = ts_entry.path().join("workspace.yaml");
                if !metadata_path.exists() {
                    continue;
                }
                let workspace = Self::read_metadata(&metadata_path, &dir_name)?;
                out.push(ClosedWorkspace {
                    workspace,
                    archive_path: ts_entry.path(),
                });
            }
        }
        out.sort_by(|a, b| a.workspace.closed_at.cmp(&b.workspace.closed_at));
        Ok(out)
    }

    /// The most recently closed entry for `id`, if any.
    pub fn latest_closed(&self, id: &str) -> Result<Option<ClosedWorkspace>, CanopyError> {
        Ok(self
            .list_closed()?
            .into_iter()
            .filter(|c| c.workspace.id == id)
            .max_by_key(|c| c.workspace.closed_at))
    }

    /// Permanently delete one archived entry, identified by id and its
    /// `closed_at` timestamp.
    pub fn delete_closed(&self, id: &str, closed_at: DateTime<Utc>) -> Result<(), CanopyError> {
        let entry = self
            .list_closed()?
            .into_iter()
            .find(|c| c.workspace.id == id && c.workspace.closed_at == Some(closed_at));
        if let Some(entry) = entry {
            if entry.archive_path.exists() {
                fs::remove_dir_all(&entry.archive_path).map_err(|e| CanopyError::io_failed(e, Some(id)))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_workspace(id: &str) -> Workspace {
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

    fn storage() -> (tempfile::TempDir, WorkspaceStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorkspaceStorage::new(dir.path().join("workspaces"), dir.path().join("closed"));
        (dir, storage)
    }

    #[test]
    fn create_then_load_round_trips() {
        let (_dir, storage) = storage();
        let mut ws = sample_workspace("PROJ-1");
        storage.create(&mut ws).unwrap();
        let loaded = storage.load("PROJ-1").unwrap();
        assert_eq!(loaded.id, "PROJ-1");
        assert_eq!(loaded.dir_name.as_deref(), Some("PROJ-1"));
    }

    #[test]
    fn create_rejects_duplicate() {
        let (_dir, storage) = storage();
        let mut ws = sample_workspace("PROJ-1");
        storage.create(&mut ws).unwrap();
        let err = storage.create(&mut ws.clone()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::WorkspaceExists);
    }

    #[test]
    fn load_missing_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage.load("missing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::WorkspaceNotFound);
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, storage) = storage();
        storage.delete("never-existed").unwrap();
        let mut ws = sample_workspace("PROJ-1");
        storage.create(&mut ws).unwrap();
        storage.delete("PROJ-1").unwrap();
        storage.delete("PROJ-1").unwrap();
        assert!(storage.load("PROJ-1").is_err());
    }

    #[test]
    fn rename_moves_directory_and_updates_metadata() {
        let (_dir, storage) = storage();
        storage.create(&mut sample_workspace("PROJ-1")).unwrap();
        let renamed = storage.rename("PROJ-1", "PROJ-2", "PROJ-2").unwrap();
        assert_eq!(renamed.id, "PROJ-2");
        assert!(storage.load("PROJ-1").is_err());
        assert!(storage.load("PROJ-2").is_ok());
    }

    #[test]
    fn close_moves_metadata_to_closed_root_and_list_finds_it() {
        let (_dir, storage) = storage();
        storage.create(&mut sample_workspace("PROJ-1")).unwrap();
        let closed_at = Utc::now();
        let closed = storage.close("PROJ-1", closed_at).unwrap();
        assert_eq!(closed.workspace.closed_at, Some(closed_at));
        assert!(storage.load("PROJ-1").is_err());

        let all_closed = storage.list_closed().unwrap();
        assert_eq!(all_closed.len(), 1);

        let latest = storage.latest_closed("PROJ-1").unwrap().unwrap();
        assert_eq!(latest.workspace.closed_at, Some(closed_at));
    }

    #[test]
    fn delete_closed_removes_archive_directory() {
        let (_dir, storage) = storage();
        storage.create(&mut sample_workspace("PROJ-1")).unwrap();
        let closed_at = Utc::now();
        let closed = storage.close("PROJ-1", closed_at).unwrap();
        assert!(closed.archive_path.exists());
        storage.delete_closed("PROJ-1", closed_at).unwrap();
        assert!(!closed.archive_path.exists());
    }

    #[test]
    fn list_sorts_by_id() {
        let (_dir, storage) = storage();
        storage.create(&mut sample_workspace("B")).unwrap();
        storage.create(&mut sample_workspace("A")).unwrap();
        let ids: Vec<_> = storage.list().unwrap().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["A".to_owned(), "B".to_owned()]);
    }

    #[test]
    fn missing_version_field_loads_as_zero() {
        let (_dir, storage) = storage();
        let dir = storage.workspace_dir("LEGACY-1");
        fs::create_dir_all(&dir).unwrap();
        let yaml = "id: LEGACY-1\nbranch_name: LEGACY-1\nrepos: []\ncreated_at: 2024-01-01T00:00:00Z\nlast_modified: 2024-01-01T00:00:00Z\n";
        fs::write(dir.join("workspace.yaml"), yaml).unwrap();
        let ws = storage.load("LEGACY-1").unwrap();
        assert_eq!(ws.version, 0);
    }

    #[test]
    fn save_upgrades_legacy_version_to_current() {
        let (_dir, storage) = storage();
        let dir = storage.workspace_dir("LEGACY-1");
        fs::create_dir_all(&dir).unwrap();
        let yaml = "id: LEGACY-1\nbranch_name: LEGACY-1\nrepos: []\ncreated_at: 2024-01-01T00:00:00Z\nlast_modified: 2024-01-01T00:00:00Z\n";
        fs::write(dir.join("workspace.yaml"), yaml).unwrap();
        let mut ws = storage.load("LEGACY-1").unwrap();
        assert_eq!(ws.version, 0);

        storage.save(&mut ws).unwrap();
        assert_eq!(ws.version, CURRENT_SCHEMA_VERSION);
        let reloaded = storage.load("LEGACY-1").unwrap();
        assert_eq!(reloaded.version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn save_preserves_unknown_future_version() {
        let (_dir, storage) = storage();
        let mut ws = sample_workspace("PROJ-1");
        ws.version = CURRENT_SCHEMA_VERSION + 7;
        storage.create(&mut ws).unwrap();
        assert_eq!(ws.version, CURRENT_SCHEMA_VERSION + 7);
        let reloaded = storage.load("PROJ-1").unwrap();
        assert_eq!(reloaded.version, CURRENT_SCHEMA_VERSION + 7);
    }

    #[test]
    fn rename_normalizes_legacy_version() {
        let (_dir, storage) = storage();
        let dir = storage.workspace_dir("LEGACY-1");
        fs::create_dir_all(&dir).unwrap();
        let yaml = "id: LEGACY-1\nbranch_name: LEGACY-1\nrepos: []\ncreated_at: 2024-01-01T00:00:00Z\nlast_modified: 2024-01-01T00:00:00Z\n";
        fs::write(dir.join("workspace.yaml"), yaml).unwrap();

        let renamed = storage.rename("LEGACY-1", "LEGACY-2", "LEGACY-2").unwrap();
        assert_eq!(renamed.version, CURRENT_SCHEMA_VERSION);
    }
}
