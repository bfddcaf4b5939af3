//! Remote Configurator: making sure a remote points at the parent

use tracing::info;

use crate::error::{Error, Result};
use crate::git::{LocalRepository, Remote};
use crate::hosting::remote_url::{remote_url_for, repository_on_server};
use crate::hosting::{RepositoryPath, ServerPath};
use crate::progress::Progress;

/// Name of the remote created when none points at the parent
pub const UPSTREAM_REMOTE_NAME: &str = "upstream";

pub struct RemoteConfigurator {
    server: ServerPath,
    use_ssh: bool,
    remote_name: String,
}

impl RemoteConfigurator {
    pub fn new(server: ServerPath, use_ssh: bool) -> Self {
        Self {
            server,
            use_ssh,
            remote_name: UPSTREAM_REMOTE_NAME.to_string(),
        }
    }

    /// The first remote whose URL resolves to `target` on this server
    pub async fn find(&self, repo: &dyn LocalRepository, target: &RepositoryPath) -> Result<Option<Remote>> {
        let remotes = repo.remotes().await?;
        Ok(remotes.into_iter().find(|remote| {
            remote
                .first_url()
                .and_then(|url| repository_on_server(&self.server, url))
                .is_some_and(|path| path == *target)
        }))
    }

    /// Return the remote pointing at `parent`, adding one if there is none
    pub async fn ensure(&self, repo: &dyn LocalRepository, parent: &RepositoryPath, progress: &Progress) -> Result<Remote> {
        progress.set_text("Configuring upstream remote");
        if let Some(remote) = self.find(repo, parent).await? {
            info!(remote = %remote.name, "Correct upstream remote already exists");
            return Ok(remote);
        }

        progress.check_cancelled()?;
        let url = remote_url_for(&self.server, parent, self.use_ssh);
        progress.set_text(format!("Adding {parent} as remote '{}'", self.remote_name));
        repo.add_remote(&self.remote_name, &url).await.map_err(|e| match e {
            Error::CannotConfigureRemote { .. } => e,
            other => Error::CannotConfigureRemote {
                name: self.remote_name.clone(),
                message: other.to_string(),
            },
        })?;

        self.find(repo, parent).await?.ok_or_else(|| Error::UpstreamNotFound {
            name: self.remote_name.clone(),
        })
    }
}
