//! Workspace export/import (component C13).
//!
//! Export is a pure projection of a [`Workspace`] plus registry lookups
//! (spec section 4.11); import reverses it, re-resolving each repo
//! through the same alias-then-URL chain the rest of the system uses
//! (registry alias first, falling back to the exported URL directly),
//! then delegating to [`crate::facade::WorkspaceService::create`] for
//! the actual worktree materialization.

use chrono::Utc;

use crate::config::Registry;
use crate::error::{CanopyError, ErrorCode};
use crate::model::{ExportedRepoRef, RepoRef, Workspace, WorkspaceExport, CURRENT_SCHEMA_VERSION};

/// The resolved shape of an import before any worktrees are created:
/// the final id/branch to use and each repo's resolved URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportPlan {
    pub id: String,
    pub branch: String,
    pub repos: Vec<RepoRef>,
}

/// Produce a portable export of `workspace`, attaching a registry alias
/// to each repo whose URL matches one.
#[must_use]
pub fn export(workspace: &Workspace, registry: &Registry) -> WorkspaceExport {
    WorkspaceExport {
        version: CURRENT_SCHEMA_VERSION,
        id: workspace.id.clone(),
        branch: workspace.branch_name.clone(),
        exported_at: Utc::now(),
        repos: workspace
            .repos
            .iter()
            .map(|repo| ExportedRepoRef {
                name: repo.name.clone(),
                url: repo.url.clone(),
                alias: registry.find_by_url(&repo.url).map(|entry| entry.alias.clone()),
            })
            .collect(),
    }
}

/// Plan an import of `export`, applying optional id/branch overrides and
/// re-resolving each repo's URL: a registry alias (when the exported
/// entry carries one and it still resolves) wins over the URL recorded
/// at export time, so a re-imported workspace picks up any registry
/// changes since export.
pub fn plan_import(
    export: &WorkspaceExport,
    id_override: Option<&str>,
    branch_override: Option<&str>,
    registry: &Registry,
) -> Result<ImportPlan, CanopyError> {
    if export.version != CURRENT_SCHEMA_VERSION {
        return Err(CanopyError::new(
            ErrorCode::ConfigInvalid,
            format!("unsupported export version `{}`", export.version),
        )
        .with_context("id", export.id.clone()));
    }

    let id = id_override.unwrap_or(&export.id).to_owned();
    let branch = branch_override.unwrap_or(&export.branch).to_owned();

    let repos = export
        .repos
        .iter()
        .map(|repo| {
            let url = repo
                .alias
                .as_deref()
                .and_then(|alias| registry.resolve_alias(alias))
                .map_or_else(|| repo.url.clone(), |entry| entry.url.clone());
            RepoRef {
                name: repo.name.clone(),
                url,
            }
        })
        .collect();

    Ok(ImportPlan { id, branch, repos })
}
