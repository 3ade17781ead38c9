//! The typed error model (component C1).
//!
//! Every fallible operation in this crate returns `Result<_, CanopyError>`.
//! `CanopyError` is deliberately a single struct rather than one enum
//! variant per failure mode: callers match on `code`, never on the
//! message text, and attach whatever context a given failure needs
//! without growing the variant list. This mirrors the teacher's own rich
//! error type (one struct/enum with agent-facing `Display` output and a
//! preserved `source()` chain) but keyed by an explicit code so equality
//! of "kind" doesn't depend on string matching.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

/// The stable identity of a [`CanopyError`]. Callers match on this, never
/// on `message`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    WorkspaceNotFound,
    WorkspaceExists,
    WorkspaceLocked,
    WorkspaceMetadataError,
    RepoNotFound,
    RepoAlreadyExists,
    RepoNotClean,
    RepoInUse,
    UnknownRepository,
    GitOperationFailed,
    HookFailed,
    HookTimeout,
    ConfigInvalid,
    ConfigValidation,
    PathInvalid,
    PathNotDirectory,
    InvalidArgument,
    IoFailed,
    CommandFailed,
    OperationCancelled,
    InternalError,
}

impl ErrorCode {
    /// The `snake_case` wire name used in `context`/log output, matching
    /// spec section 6's error code list verbatim.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkspaceNotFound => "workspace_not_found",
            Self::WorkspaceExists => "workspace_exists",
            Self::WorkspaceLocked => "workspace_locked",
            Self::WorkspaceMetadataError => "workspace_metadata_error",
            Self::RepoNotFound => "repo_not_found",
            Self::RepoAlreadyExists => "repo_already_exists",
            Self::RepoNotClean => "repo_not_clean",
            Self::RepoInUse => "repo_in_use",
            Self::UnknownRepository => "unknown_repository",
            Self::GitOperationFailed => "git_operation_failed",
            Self::HookFailed => "hook_failed",
            Self::HookTimeout => "hook_timeout",
            Self::ConfigInvalid => "config_invalid",
            Self::ConfigValidation => "config_validation",
            Self::PathInvalid => "path_invalid",
            Self::PathNotDirectory => "path_not_directory",
            Self::InvalidArgument => "invalid_argument",
            Self::IoFailed => "io_failed",
            Self::CommandFailed => "command_failed",
            Self::OperationCancelled => "operation_cancelled",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, coded error with an optional cause chain and a free-form
/// context map, per spec section 3's "Typed error" data model.
pub struct CanopyError {
    code: ErrorCode,
    message: String,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
    context: BTreeMap<&'static str, String>,
}

impl CanopyError {
    /// Construct a new error with no cause and no context.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a causing error, preserving the chain via [`StdError::source`].
    #[must_use]
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Attach a context entry. Repeated keys overwrite.
    #[must_use]
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.insert(key, value.into());
        self
    }

    /// The error's stable code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The human-facing message (not for matching).
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The attached context map.
    #[must_use]
    pub fn context(&self) -> &BTreeMap<&'static str, String> {
        &self.context
    }

    /// Convenience: `workspace_not_found` with `context.id`.
    #[must_use]
    pub fn workspace_not_found(id: &str) -> Self {
        Self::new(ErrorCode::WorkspaceNotFound, format!("workspace `{id}` not found"))
            .with_context("id", id)
    }

    /// Convenience: `workspace_exists` with `context.id`.
    #[must_use]
    pub fn workspace_exists(id: &str) -> Self {
        Self::new(ErrorCode::WorkspaceExists, format!("workspace `{id}` already exists"))
            .with_context("id", id)
    }

    /// Convenience: `workspace_locked` with `context.id` and
    /// `context.held_since`.
    #[must_use]
    pub fn workspace_locked(id: &str, held_since: impl Into<String>) -> Self {
        Self::new(ErrorCode::WorkspaceLocked, format!("workspace `{id}` is locked"))
            .with_context("id", id)
            .with_context("held_since", held_since)
    }

    /// Convenience: `repo_not_found` with `context.name`.
    #[must_use]
    pub fn repo_not_found(name: &str) -> Self {
        Self::new(ErrorCode::RepoNotFound, format!("repo `{name}` not found"))
            .with_context("name", name)
    }

    /// Convenience: `repo_already_exists` with `context.name`.
    #[must_use]
    pub fn repo_already_exists(name: &str) -> Self {
        Self::new(ErrorCode::RepoAlreadyExists, format!("repo `{name}` already exists in workspace"))
            .with_context("name", name)
    }

    /// Convenience: `repo_not_clean` with `context.repo`.
    #[must_use]
    pub fn repo_not_clean(repo: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(ErrorCode::RepoNotClean, format!("repo `{repo}` is not clean: {reason}"))
            .with_context("repo", repo)
    }

    /// Convenience: `repo_in_use` with `context.name` and
    /// `context.workspaces` (comma-joined ids).
    #[must_use]
    pub fn repo_in_use(name: &str, workspaces: &[String]) -> Self {
        Self::new(
            ErrorCode::RepoInUse,
            format!("repo `{name}` is used by {} workspace(s)", workspaces.len()),
        )
        .with_context("name", name)
        .with_context("workspaces", workspaces.join(","))
    }

    /// Convenience: `unknown_repository` with `context.identifier` and
    /// `context.user_requested`.
    #[must_use]
    pub fn unknown_repository(identifier: &str, user_requested: bool) -> Self {
        Self::new(
            ErrorCode::UnknownRepository,
            format!("could not resolve repository identifier `{identifier}`"),
        )
        .with_context("identifier", identifier)
        .with_context("user_requested", user_requested.to_string())
    }

    /// Convenience: `git_operation_failed` wrapping `cause`, with
    /// `context.operation`.
    #[must_use]
    pub fn git_operation_failed(operation: &'static str, cause: canopy_git::GitError) -> Self {
        let message = format!("git operation `{operation}` failed: {cause}");
        Self::new(ErrorCode::GitOperationFailed, message)
            .with_context("operation", operation)
            .with_cause(cause)
    }

    /// Convenience: `operation_cancelled`.
    #[must_use]
    pub fn operation_cancelled() -> Self {
        Self::new(ErrorCode::OperationCancelled, "operation was cancelled")
    }

    /// Convenience: `invalid_argument`.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Convenience: `io_failed` wrapping `cause`, with `context.id` when
    /// known.
    #[must_use]
    pub fn io_failed(cause: std::io::Error, id: Option<&str>) -> Self {
        let mut err = Self::new(ErrorCode::IoFailed, format!("I/O error: {cause}")).with_cause(cause);
        if let Some(id) = id {
            err = err.with_context("id", id);
        }
        err
    }
}

impl fmt::Display for CanopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CanopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanopyError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("context", &self.context)
            .field("cause", &self.cause.as_ref().map(ToString::to_string))
            .finish()
    }
}

impl StdError for CanopyError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}
