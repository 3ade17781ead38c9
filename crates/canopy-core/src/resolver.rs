//! Repo identifier resolver (component C9).
//!
//! An ordered strategy chain, per spec section 4.7: a recognised URL
//! (including the `git@host:owner/repo` scp-like form) wins first, then
//! a registry alias, then a GitHub `owner/repo` shorthand. First match
//! wins; no match is `unknown_repository`.

use regex::Regex;

use crate::config::Registry;
use crate::error::CanopyError;

/// A resolved repo identifier: the canonical name to use locally and the
/// URL to clone/fetch from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRepo {
    pub name: String,
    pub url: String,
}

/// Resolve `identifier` (as typed by a user if `user_requested`, or
/// derived internally otherwise) against the strategy chain.
pub fn resolve(identifier: &str, user_requested: bool, registry: &Registry) -> Result<ResolvedRepo, CanopyError> {
    if let Some(resolved) = resolve_url(identifier) {
        return Ok(resolved);
    }
    if let Some(entry) = registry.resolve_alias(identifier) {
        return Ok(ResolvedRepo {
            name: entry.name.clone(),
            url: entry.url.clone(),
        });
    }
    if let Some(resolved) = resolve_github_shorthand(identifier)? {
        return Ok(resolved);
    }
    Err(CanopyError::unknown_repository(identifier, user_requested))
}

fn resolve_url(identifier: &str) -> Option<ResolvedRepo> {
    let scheme = Regex::new(r"^(?:https?|ssh|git|file)://").expect("static pattern");
    if scheme.is_match(identifier) {
        return Some(ResolvedRepo {
            name: derive_name_from_path(identifier),
            url: identifier.to_owned(),
        });
    }

    let scp_like = Regex::new(r"^[[:alnum:]_.\-]+@[[:alnum:]_.\-]+:(.+)$").expect("static pattern");
    if let Some(caps) = scp_like.captures(identifier) {
        let path = caps.get(1).map_or("", |m| m.as_str());
        return Some(ResolvedRepo {
            name: derive_name_from_path(path),
            url: identifier.to_owned(),
        });
    }

    None
}

fn derive_name_from_path(spec: &str) -> String {
    let trimmed = spec.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_owned()
}

fn resolve_github_shorthand(identifier: &str) -> Result<Option<ResolvedRepo>, CanopyError> {
    let parts: Vec<&str> = identifier.split('/').collect();
    if parts.len() != 2 {
        return Ok(None);
    }
    let (owner, repo) = (parts[0], parts[1]);
    if owner.is_empty() || repo.is_empty() {
        return Err(CanopyError::invalid_argument(format!(
            "invalid GitHub shorthand `{identifier}`: owner and repo must both be non-empty"
        )));
    }
    let repo_name = repo.strip_suffix(".git").unwrap_or(repo);
    Ok(Some(ResolvedRepo {
        name: repo_name.to_owned(),
        url: format!("https://github.com/{owner}/{repo_name}"),
    }))
}
