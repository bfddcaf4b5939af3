//! Matching git remote URLs against hosting servers
//!
//! Remotes come in many spellings for the same repository:
//!
//! ```text
//! https://gitee.com/acme/lib.git
//! https://user@gitee.com/acme/lib
//! ssh://git@gitee.com:22/acme/lib.git
//! git@gitee.com:acme/lib.git
//! ```
//!
//! All of them are normalised to host + path before comparing, so a remote is
//! recognised by where it points, never by its name.

use ::url::Url;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{RepositoryPath, ServerPath};

/// `[user@]host:path` with no scheme
static SCP_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[^@/]+@)?([^:/]{2,}):(.+)$").unwrap());

/// A remote URL reduced to the parts that identify a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRemote {
    pub host: String,
    /// Port, only kept for http(s) URLs
    pub port: Option<u16>,
    /// Path without leading/trailing slashes and without `.git`
    pub path: String,
}

/// Normalise a git remote URL. Local paths and unparsable URLs give `None`.
pub fn normalize(remote_url: &str) -> Option<NormalizedRemote> {
    let remote_url = remote_url.trim();

    if remote_url.contains("://") {
        let parsed = Url::parse(remote_url).ok()?;
        if parsed.scheme() == "file" {
            return None;
        }
        let host = parsed.host_str()?.to_ascii_lowercase();
        let port = match parsed.scheme() {
            "http" | "https" => parsed.port(),
            _ => None,
        };
        return Some(NormalizedRemote {
            host,
            port,
            path: clean_path(parsed.path()),
        });
    }

    if remote_url.contains('\\') {
        return None;
    }
    let caps = SCP_LIKE.captures(remote_url)?;
    Some(NormalizedRemote {
        host: caps[1].to_ascii_lowercase(),
        port: None,
        path: clean_path(&caps[2]),
    })
}

fn clean_path(path: &str) -> String {
    let path = path.trim_matches('/');
    path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/').to_string()
}

/// True if the remote URL points somewhere on `server`
pub fn matches_server(server: &ServerPath, remote_url: &str) -> bool {
    let Some(remote) = normalize(remote_url) else {
        return false;
    };
    if !remote.host.eq_ignore_ascii_case(server.host()) {
        return false;
    }
    if let (Some(expected), Some(actual)) = (server.port(), remote.port) {
        if expected != actual {
            return false;
        }
    }
    match server.suffix() {
        Some(suffix) => {
            let suffix = suffix.trim_start_matches('/');
            remote.path == suffix || remote.path.starts_with(&format!("{suffix}/"))
        }
        None => true,
    }
}

/// Owner and repository encoded in a remote URL (the last two path segments)
pub fn repository_path(remote_url: &str) -> Option<RepositoryPath> {
    let remote = normalize(remote_url)?;
    let mut segments = remote.path.rsplit('/');
    let repository = segments.next()?;
    let owner = segments.next()?;
    RepositoryPath::new(owner, repository).ok()
}

/// Repository path of `remote_url` if it lives on `server`
pub fn repository_on_server(server: &ServerPath, remote_url: &str) -> Option<RepositoryPath> {
    if matches_server(server, remote_url) {
        repository_path(remote_url)
    } else {
        None
    }
}

/// Canonical remote URL for a repository on a server
pub fn remote_url_for(server: &ServerPath, path: &RepositoryPath, use_ssh: bool) -> String {
    if use_ssh {
        let prefix = server
            .suffix()
            .map(|s| format!("{}/", s.trim_start_matches('/')))
            .unwrap_or_default();
        format!("git@{}:{}{}/{}.git", server.host(), prefix, path.owner, path.repository)
    } else {
        format!("{}/{}/{}.git", server.to_url(), path.owner, path.repository)
    }
}
