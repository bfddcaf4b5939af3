//! Repository Resolver: from a fork to its parent

use tracing::info;

use crate::error::{Error, Result};
use crate::hosting::{ApiClient, ApiError, RepositoryPath};
use crate::progress::Progress;

/// The repository a fork was created from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRepository {
    pub path: RepositoryPath,
    pub default_branch: String,
    pub html_url: String,
}

pub struct RepositoryResolver<'a> {
    client: &'a ApiClient,
}

impl<'a> RepositoryResolver<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Look up `fork` and return its parent
    pub async fn resolve(&self, fork: &RepositoryPath, progress: &Progress) -> Result<ParentRepository> {
        progress.set_text(format!("Loading repository info for {fork}"));

        let repo = match self.client.repository(fork, progress.token()).await {
            Ok(Some(repo)) => repo,
            Ok(None) => return Err(Error::RepoNotFound { path: fork.clone() }),
            Err(ApiError::Cancelled) => return Err(Error::Cancelled),
            Err(e) => return Err(Error::Transport(e)),
        };

        let Some(parent) = repo.fork_parent() else {
            return Err(Error::NotAFork {
                name: repo.base.name.clone(),
                html_url: repo.base.html_url.clone(),
            });
        };

        let path = parent.full_path().ok_or_else(|| {
            Error::Transport(ApiError::Malformed {
                message: format!("invalid parent repository '{}/{}'", parent.owner.login, parent.name),
            })
        })?;
        let default_branch = parent
            .default_branch()
            .ok_or_else(|| Error::NoDefaultBranch { path: path.clone() })?
            .to_string();

        info!(%fork, parent = %path, %default_branch, "Resolved parent repository");
        Ok(ParentRepository {
            path,
            default_branch,
            html_url: parent.html_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::api::{ApiRequest, ApiResponse, ApiTransport};
    use crate::hosting::ServerPath;
    use crate::progress::CancellationToken;
    use async_trait::async_trait;
    use std::sync::Arc;

    enum Canned {
        Respond(ApiResponse),
        Fail(fn() -> ApiError),
    }

    #[async_trait]
    impl ApiTransport for Canned {
        async fn execute(&self, _request: &ApiRequest, _cancel: &CancellationToken) -> std::result::Result<ApiResponse, ApiError> {
            match self {
                Canned::Respond(response) => Ok(response.clone()),
                Canned::Fail(make) => Err(make()),
            }
        }
    }

    async fn resolve(transport: Canned) -> Result<ParentRepository> {
        let client = ApiClient::new(Arc::new(transport), ServerPath::gitee(), None);
        let fork = RepositoryPath::new("me", "lib").unwrap();
        RepositoryResolver::new(&client).resolve(&fork, &Progress::default()).await
    }

    fn fork_json(parent_branch: &str) -> String {
        format!(
            r#"{{"name":"lib","owner":{{"login":"me"}},"html_url":"https://gitee.com/me/lib","fork":true,
                "parent":{{"name":"lib","owner":{{"login":"acme"}},"html_url":"https://gitee.com/acme/lib",
                           "default_branch":"{parent_branch}"}}}}"#
        )
    }

    #[tokio::test]
    async fn test_resolves_parent() {
        let parent = resolve(Canned::Respond(ApiResponse::json(200, fork_json("main")))).await.unwrap();
        assert_eq!(parent.path, RepositoryPath::new("acme", "lib").unwrap());
        assert_eq!(parent.default_branch, "main");
    }

    #[tokio::test]
    async fn test_missing_default_branch() {
        let err = resolve(Canned::Respond(ApiResponse::json(200, fork_json("")))).await.unwrap_err();
        assert!(matches!(err, Error::NoDefaultBranch { .. }));
    }

    #[tokio::test]
    async fn test_not_a_fork() {
        let body = r#"{"name":"lib","owner":{"login":"me"},"html_url":"https://gitee.com/me/lib","fork":false}"#;
        let err = resolve(Canned::Respond(ApiResponse::json(200, body))).await.unwrap_err();
        match err {
            Error::NotAFork { name, html_url } => {
                assert_eq!(name, "lib");
                assert_eq!(html_url, "https://gitee.com/me/lib");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_and_transport_errors() {
        let err = resolve(Canned::Respond(ApiResponse::json(404, "{}"))).await.unwrap_err();
        assert!(matches!(err, Error::RepoNotFound { .. }));

        let err = resolve(Canned::Fail(|| ApiError::Connection {
            message: "refused".to_string(),
        }))
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Transport(ApiError::Connection { .. })));

        let err = resolve(Canned::Fail(|| ApiError::Cancelled)).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
