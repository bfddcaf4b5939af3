//! Checks that run before anything is touched
//!
//! Picks the repository, its `origin` remote and the server it lives on, then
//! an account and token for that server.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::git::{LocalRepository, Remote};
use crate::hosting::remote_url::repository_on_server;
use crate::hosting::{Account, AccountStore, RepositoryPath, ServerPath};
use crate::progress::Progress;
use crate::workspace::Workspace;

pub const ORIGIN_REMOTE_NAME: &str = "origin";

/// Everything a sync needs to know before it starts
pub struct Preflight {
    pub repo: Arc<dyn LocalRepository>,
    pub origin: Remote,
    pub server: ServerPath,
    /// The fork, as named by the origin URL
    pub path: RepositoryPath,
    pub account: Account,
    pub token: String,
}

impl std::fmt::Debug for Preflight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preflight")
            .field("root", &self.repo.root())
            .field("origin", &self.origin)
            .field("server", &self.server)
            .field("path", &self.path)
            .field("account", &self.account)
            .finish()
    }
}

/// The `origin` remote and where it points, if it is on a known server
pub async fn find_origin(
    repo: &dyn LocalRepository,
    servers: &[ServerPath],
) -> Result<(Remote, ServerPath, RepositoryPath)> {
    let remotes = repo.remotes().await?;
    let origin = remotes
        .into_iter()
        .find(|r| r.name == ORIGIN_REMOTE_NAME)
        .ok_or(Error::OriginNotFound)?;

    for url in &origin.urls {
        for server in servers {
            if let Some(path) = repository_on_server(server, url) {
                return Ok((origin.clone(), server.clone(), path));
            }
        }
    }
    debug!(urls = ?origin.urls, "origin does not point at a known server");
    Err(Error::OriginNotFound)
}

/// Pick the account to use for `server`; `None` if there is none
pub async fn select_account(accounts: &dyn AccountStore, server: &ServerPath) -> Option<Account> {
    let mut candidates = accounts.list_accounts(server).await;
    match candidates.len() {
        0 => accounts.request_new_account(server).await,
        1 => candidates.pop(),
        _ => accounts.choose_account(&candidates).await,
    }
}

/// Run all checks; `Ok(None)` if the user declined to provide a token
pub async fn run(
    workspace: &Workspace,
    servers: &[ServerPath],
    accounts: &dyn AccountStore,
    progress: &Progress,
) -> Result<Option<Preflight>> {
    progress.check_cancelled()?;
    let repo = workspace.single_repository()?;
    let (origin, server, path) = find_origin(repo.as_ref(), servers).await?;
    debug!(%server, %path, "Found origin");

    let account = select_account(accounts, &server)
        .await
        .ok_or_else(|| Error::NoSuitableAccount {
            server: server.to_string(),
        })?;
    let Some(token) = accounts.get_or_request_token(&account).await else {
        info!(account = %account, "No token provided, not syncing");
        return Ok(None);
    };

    progress.check_cancelled()?;
    repo.refresh().await;

    Ok(Some(Preflight {
        repo,
        origin,
        server,
        path,
        account,
        token,
    }))
}
