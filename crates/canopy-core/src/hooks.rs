//! Lifecycle hook executor (component C8).
//!
//! Hooks run sequentially (never in parallel — their ordering is part of
//! the contract), each under its own timeout, with command text expanded
//! through the same `minijinja` templating `shaneholloman-worktrunk`'s
//! `config::expansion::expand_template` uses, rewritten here to accept
//! spec section 4.6's Go-template-style dotted tokens (`{{.WorkspaceID}}`
//! etc.) at the template-compile boundary. Dry-run mode renders previews
//! without spawning anything.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read as _;
use std::process::{Command, Stdio};
use std::time::Duration;

use minijinja::Environment;
use shell_escape::escape;
use wait_timeout::ChildExt as _;

use crate::config::HookSpec;
use crate::error::{CanopyError, ErrorCode};
use crate::model::{HookContext, RepoRef};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A single hook invocation, pending or already executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookInvocation {
    /// Position of the hook in the configured sequence.
    pub index: usize,
    /// The command after template expansion.
    pub resolved_command: String,
    /// The directory the command would run (or ran) in.
    pub working_dir: std::path::PathBuf,
    /// The repo this invocation is scoped to, if the hook has a `repos` filter.
    pub repo: Option<String>,
}

/// Options controlling a single [`run`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Keep running subsequent hooks after one fails.
    pub continue_on_error: bool,
    /// Render [`HookInvocation`] previews instead of executing anything.
    pub dry_run: bool,
}

/// Validate a hook's command text, per spec section 4.6: non-empty after
/// trimming, no NUL byte, no newline.
pub fn validate_command(command: &str) -> Result<(), CanopyError> {
    if command.trim().is_empty() {
        return Err(CanopyError::new(ErrorCode::ConfigInvalid, "hook command is empty"));
    }
    if command.contains('\0') {
        return Err(CanopyError::new(ErrorCode::ConfigInvalid, "hook command contains a NUL byte"));
    }
    if command.contains('\n') {
        return Err(CanopyError::new(ErrorCode::ConfigInvalid, "hook command contains a newline"));
    }
    Ok(())
}

/// Run `hooks` in order against `ctx`. In dry-run mode, returns previews
/// with nothing executed. Otherwise executes each hook's resolved
/// command(s) and returns the previews that were actually run (for
/// logging/display parity with dry-run).
pub fn run(hooks: &[HookSpec], ctx: &HookContext, opts: RunOptions) -> Result<Vec<HookInvocation>, CanopyError> {
    let mut invocations = Vec::new();
    for (index, hook) in hooks.iter().enumerate() {
        validate_command(&hook.command)?;
        let targets = invocation_targets(hook, ctx);
        for (scoped_ctx, repo_name) in targets {
            let resolved_command = expand(&hook.command, &scoped_ctx)?;
            let working_dir = scoped_ctx.repo_path.clone().unwrap_or_else(|| scoped_ctx.workspace_path.clone());
            let invocation = HookInvocation {
                index,
                resolved_command: resolved_command.clone(),
                working_dir: working_dir.clone(),
                repo: repo_name.clone(),
            };
            if opts.dry_run {
                invocations.push(invocation);
                continue;
            }
            invocations.push(invocation);
            let timeout = hook.timeout_seconds.map_or(DEFAULT_TIMEOUT, Duration::from_secs);
            let outcome = execute(hook, &resolved_command, &working_dir, &scoped_ctx, timeout);
            if let Err(err) = outcome {
                let hook_continues = hook.continue_on_error || opts.continue_on_error;
                if hook_continues {
                    tracing::warn!(index, command = %hook.command, error = %err, "hook failed, continuing");
                } else {
                    return Err(err);
                }
            }
        }
    }
    Ok(invocations)
}

fn invocation_targets(hook: &HookSpec, ctx: &HookContext) -> Vec<(HookContext, Option<String>)> {
    match &hook.repos {
        None => vec![(ctx.clone(), None)],
        Some(names) => names
            .iter()
            .filter_map(|name| {
                ctx.repos.iter().find(|r: &&RepoRef| &r.name == name).map(|repo| {
                    let repo_path = ctx.workspace_path.join(&repo.name);
                    (ctx.scoped_to_repo(&repo.name, repo_path), Some(repo.name.clone()))
                })
            })
            .collect(),
    }
}

fn expand(command: &str, ctx: &HookContext) -> Result<String, CanopyError> {
    let rewritten = rewrite_dotted_tokens(command);
    let mut env = Environment::new();
    let tmpl = env
        .template_from_str(&rewritten)
        .map_err(|e| CanopyError::new(ErrorCode::ConfigInvalid, format!("hook command template error: {e}")))?;

    let repos_joined = ctx.repos.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(",");
    let mut vars: HashMap<&str, String> = HashMap::new();
    vars.insert("WorkspaceID", ctx.workspace_id.clone());
    vars.insert("WorkspacePath", ctx.workspace_path.to_string_lossy().into_owned());
    vars.insert("BranchName", ctx.branch_name.clone());
    vars.insert("Repos", repos_joined);
    if let Some(name) = &ctx.repo_name {
        vars.insert("RepoName", name.clone());
    }
    if let Some(path) = &ctx.repo_path {
        vars.insert("RepoPath", path.to_string_lossy().into_owned());
    }

    // Values are interpolated into a string later handed to `sh -c`, so
    // escape each one the way worktrunk's `expand_template` does before
    // rendering — a path or repo name with a space or shell metacharacter
    // must stay a single literal argument, not get re-parsed as shell syntax.
    let escaped: HashMap<&str, String> = vars
        .iter()
        .map(|(k, v)| (*k, escape(Cow::Borrowed(v.as_str())).into_owned()))
        .collect();

    tmpl.render(&escaped)
        .map_err(|e| CanopyError::new(ErrorCode::ConfigInvalid, format!("hook command render error: {e}")))
}

/// Rewrite `{{.Foo}}` (spec section 4.6's Go-template dotted form) into
/// plain minijinja variable references `{{ Foo }}`.
fn rewrite_dotted_tokens(command: &str) -> String {
    let mut out = String::with_capacity(command.len());
    let mut rest = command;
    while let Some(start) = rest.find("{{.") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 3..];
        if let Some(end) = after.find("}}") {
            out.push_str("{{ ");
            out.push_str(&after[..end]);
            out.push_str(" }}");
            rest = &after[end + 2..];
        } else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        }
    }
    out.push_str(rest);
    out
}

fn execute(
    hook: &HookSpec,
    resolved_command: &str,
    working_dir: &std::path::Path,
    ctx: &HookContext,
    timeout: Duration,
) -> Result<(), CanopyError> {
    let shell = hook.shell.clone().or_else(|| std::env::var("SHELL").ok()).unwrap_or_else(|| "/bin/sh".to_owned());

    let mut command = Command::new(&shell);
    command
        .arg("-c")
        .arg(resolved_command)
        .current_dir(working_dir)
        .env("CANOPY_WORKSPACE_ID", &ctx.workspace_id)
        .env("CANOPY_WORKSPACE_PATH", &ctx.workspace_path)
        .env("CANOPY_BRANCH", &ctx.branch_name)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(name) = &ctx.repo_name {
        command.env("CANOPY_REPO_NAME", name);
    }
    if let Some(path) = &ctx.repo_path {
        command.env("CANOPY_REPO_PATH", path);
    }

    let mut child = command.spawn().map_err(|e| CanopyError::io_failed(e, None))?;

    match child.wait_timeout(timeout).map_err(|e| CanopyError::io_failed(e, None))? {
        Some(status) => {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            if status.success() {
                return Ok(());
            }
            Err(CanopyError::new(
                ErrorCode::HookFailed,
                format!("hook command `{resolved_command}` exited with status {status}"),
            )
            .with_context("command", resolved_command.to_owned())
            .with_context("exit_code", status.code().map_or_else(|| "signal".to_owned(), |c| c.to_string()))
            .with_context("repo", ctx.repo_name.clone().unwrap_or_default())
            .with_context("stderr", stderr))
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(CanopyError::new(
                ErrorCode::HookTimeout,
                format!("hook command `{resolved_command}` timed out after {timeout:?}"),
            )
            .with_context("command", resolved_command.to_owned())
            .with_context("timeout_seconds", timeout.as_secs().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Workspace;
    use chrono::Utc;

    fn sample_ctx() -> HookContext {
        let ws = Workspace {
            version: 1,
            id: "PROJ-1".to_owned(),
            dir_name: None,
            branch_name: "PROJ-1".to_owned(),
            repos: vec![RepoRef {
                name: "a".to_owned(),
                url: "file:///p/a".to_owned(),
            }],
            created_at: Utc::now(),
            last_modified: Utc::now(),
            closed_at: None,
        };
        HookContext::for_workspace(&ws, "/w/PROJ-1".into())
    }

    #[test]
    fn validate_rejects_empty_nul_and_newline() {
        assert!(validate_command("  ").is_err());
        assert!(validate_command("echo hi\0").is_err());
        assert!(validate_command("echo hi\nbye").is_err());
        assert!(validate_command("echo hi").is_ok());
    }

    #[test]
    fn rewrites_dotted_tokens_to_plain_vars() {
        assert_eq!(rewrite_dotted_tokens("echo {{.WorkspaceID}}"), "echo {{ WorkspaceID }}");
        assert_eq!(
            rewrite_dotted_tokens("{{.RepoName}}/{{.RepoPath}}"),
            "{{ RepoName }}/{{ RepoPath }}"
        );
        assert_eq!(rewrite_dotted_tokens("no tokens here"), "no tokens here");
    }

    #[test]
    fn expand_substitutes_workspace_fields() {
        let ctx = sample_ctx();
        let out = expand("id={{.WorkspaceID}} branch={{.BranchName}}", &ctx).unwrap();
        assert_eq!(out, "id=PROJ-1 branch=PROJ-1");
    }

    #[test]
    fn expand_shell_escapes_values_with_metacharacters() {
        let mut ctx = sample_ctx();
        ctx.workspace_path = std::path::PathBuf::from("/work/my project; rm -rf /");
        let out = expand("cd {{.WorkspacePath}} && echo {{.WorkspaceID}}", &ctx).unwrap();
        // The dangerous path must come through as one escaped literal, never
        // as unescaped shell syntax that `sh -c` would split on `;`.
        assert!(!out.contains("rf /; echo"));
        assert!(out.contains("my project"));
        assert!(out.contains("rm -rf"));
    }

    #[test]
    fn dry_run_produces_previews_without_executing() {
        let ctx = sample_ctx();
        let hooks = vec![HookSpec {
            command: "echo {{.WorkspaceID}} > /should/not/be/created".to_owned(),
            repos: None,
            shell: None,
            timeout_seconds: None,
            continue_on_error: false,
        }];
        let previews = run(
            &hooks,
            &ctx,
            RunOptions {
                continue_on_error: false,
                dry_run: true,
            },
        )
        .unwrap();
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].resolved_command, "echo PROJ-1 > /should/not/be/created");
        assert!(!std::path::Path::new("/should/not/be/created").exists());
    }

    #[test]
    fn repo_filter_runs_once_per_matching_repo() {
        let ctx = sample_ctx();
        let hook = HookSpec {
            command: "echo {{.RepoName}}".to_owned(),
            repos: Some(vec!["a".to_owned(), "missing".to_owned()]),
            shell: None,
            timeout_seconds: None,
            continue_on_error: false,
        };
        let targets = invocation_targets(&hook, &ctx);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].1.as_deref(), Some("a"));
    }

    #[test]
    fn successful_command_runs_to_completion() {
        let ctx = sample_ctx();
        let hooks = vec![HookSpec {
            command: "true".to_owned(),
            repos: None,
            shell: None,
            timeout_seconds: Some(5),
            continue_on_error: false,
        }];
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx;
        ctx.workspace_path = dir.path().to_path_buf();
        let result = run(
            &hooks,
            &ctx,
            RunOptions {
                continue_on_error: false,
                dry_run: false,
            },
        );
        assert!(result.is_ok());
    }

    #[test]
    fn failing_command_returns_hook_failed_with_exit_code() {
        let ctx = sample_ctx();
        let hooks = vec![HookSpec {
            command: "exit 7".to_owned(),
            repos: None,
            shell: None,
            timeout_seconds: Some(5),
            continue_on_error: false,
        }];
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx;
        ctx.workspace_path = dir.path().to_path_buf();
        let err = run(
            &hooks,
            &ctx,
            RunOptions {
                continue_on_error: false,
                dry_run: false,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HookFailed);
        assert_eq!(err.context().get("exit_code"), Some(&"7".to_owned()));
    }

    #[test]
    fn continue_on_error_runs_remaining_hooks() {
        let ctx = sample_ctx();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran-second");
        let hooks = vec![
            HookSpec {
                command: "exit 1".to_owned(),
                repos: None,
                shell: None,
                timeout_seconds: Some(5),
                continue_on_error: false,
            },
            HookSpec {
                command: format!("touch {}", marker.display()),
                repos: None,
                shell: None,
                timeout_seconds: Some(5),
                continue_on_error: false,
            },
        ];
        let mut ctx = ctx;
        ctx.workspace_path = dir.path().to_path_buf();
        let result = run(
            &hooks,
            &ctx,
            RunOptions {
                continue_on_error: true,
                dry_run: false,
            },
        );
        assert!(result.is_ok());
        assert!(marker.exists());
    }

    #[test]
    fn timeout_kills_long_running_command() {
        let ctx = sample_ctx();
        let hooks = vec![HookSpec {
            command: "sleep 5".to_owned(),
            repos: None,
            shell: None,
            timeout_seconds: Some(1),
            continue_on_error: false,
        }];
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx;
        ctx.workspace_path = dir.path().to_path_buf();
        let err = run(
            &hooks,
            &ctx,
            RunOptions {
                continue_on_error: false,
                dry_run: false,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HookTimeout);
    }
}
