//! Hosting accounts and where their tokens come from

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::ServerPath;

/// Environment variable holding a token for the default account
pub const TOKEN_ENV: &str = "FORKSYNC_TOKEN";

/// A login on a hosting server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub server: ServerPath,
    /// Token stored inline in the config file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Name of an environment variable holding the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl Account {
    pub fn new(name: impl Into<String>, server: ServerPath) -> Self {
        Self {
            name: name.into(),
            server,
            token: None,
            token_env: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

// Keep tokens out of logs
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("token_env", &self.token_env)
            .finish()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.server)
    }
}

/// Source of accounts and their tokens
///
/// The interactive variants return `None` when the user declines.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Accounts registered for `server`
    async fn list_accounts(&self, server: &ServerPath) -> Vec<Account>;

    /// Token for `account`, asking the user for one if none is stored
    async fn get_or_request_token(&self, account: &Account) -> Option<String>;

    /// Register a new account when there is none for `server`
    async fn request_new_account(&self, _server: &ServerPath) -> Option<Account> {
        None
    }

    /// Pick one of several accounts for the same server
    async fn choose_account(&self, _candidates: &[Account]) -> Option<Account> {
        None
    }
}

/// [`AccountStore`] backed by the configuration file and the environment
///
/// Never prompts. A `FORKSYNC_TOKEN` variable stands in for an account when
/// none is configured for the server.
#[derive(Debug, Clone, Default)]
pub struct ConfigAccountStore {
    accounts: Vec<Account>,
    preferred: Option<String>,
    env_token: Option<String>,
}

impl ConfigAccountStore {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts,
            preferred: None,
            env_token: std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()),
        }
    }

    /// Only use the account with this name
    pub fn with_preferred(mut self, name: Option<String>) -> Self {
        self.preferred = name;
        self
    }

    pub fn with_env_token(mut self, token: Option<String>) -> Self {
        self.env_token = token;
        self
    }
}

#[async_trait]
impl AccountStore for ConfigAccountStore {
    async fn list_accounts(&self, server: &ServerPath) -> Vec<Account> {
        self.accounts
            .iter()
            .filter(|a| a.server == *server)
            .filter(|a| self.preferred.as_deref().map_or(true, |name| a.name == name))
            .cloned()
            .collect()
    }

    async fn get_or_request_token(&self, account: &Account) -> Option<String> {
        if let Some(token) = account.token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Some(token.clone());
        }
        if let Some(var) = &account.token_env {
            match std::env::var(var) {
                Ok(token) if !token.trim().is_empty() => return Some(token),
                _ => warn!(account = %account, variable = %var, "Token variable is not set"),
            }
        }
        self.env_token.clone()
    }

    async fn request_new_account(&self, server: &ServerPath) -> Option<Account> {
        if let Some(name) = &self.preferred {
            warn!(%server, account = %name, "No such account configured for the server");
            return None;
        }
        let token = self.env_token.clone()?;
        debug!(%server, "Using token from {}", TOKEN_ENV);
        Some(Account::new(TOKEN_ENV.to_ascii_lowercase(), server.clone()).with_token(token))
    }

    async fn choose_account(&self, candidates: &[Account]) -> Option<Account> {
        let preferred = self.preferred.as_deref()?;
        candidates.iter().find(|a| a.name == preferred).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigAccountStore {
        ConfigAccountStore::new(vec![
            Account::new("alice", ServerPath::gitee()).with_token("a"),
            Account::new("bob", ServerPath::gitee()),
            Account::new("carol", "git.example.com".parse().unwrap()).with_token("c"),
        ])
        .with_env_token(None)
    }

    #[tokio::test]
    async fn test_list_accounts_by_server() {
        let names: Vec<_> = store()
            .list_accounts(&ServerPath::gitee())
            .await
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_servers_on_same_host_keep_their_accounts() {
        let first: ServerPath = "git.example.com/first".parse().unwrap();
        let second: ServerPath = "git.example.com/second".parse().unwrap();
        let store = ConfigAccountStore::new(vec![
            Account::new("dora", first.clone()),
            Account::new("eve", second.clone()),
        ])
        .with_env_token(None);

        let on_first: Vec<_> = store.list_accounts(&first).await.into_iter().map(|a| a.name).collect();
        assert_eq!(on_first, vec!["dora"]);
        let on_second: Vec<_> = store.list_accounts(&second).await.into_iter().map(|a| a.name).collect();
        assert_eq!(on_second, vec!["eve"]);
    }

    #[tokio::test]
    async fn test_preferred_account_must_exist() {
        let store = store()
            .with_env_token(Some("env".to_string()))
            .with_preferred(Some("dave".to_string()));
        assert!(store.list_accounts(&ServerPath::gitee()).await.is_empty());
        assert!(store.request_new_account(&ServerPath::gitee()).await.is_none());

        // One configured account that is not the requested one
        let server: ServerPath = "git.example.com".parse().unwrap();
        assert!(store.list_accounts(&server).await.is_empty());
    }

    #[tokio::test]
    async fn test_preferred_account_narrows_candidates() {
        let names: Vec<_> = store()
            .with_preferred(Some("bob".to_string()))
            .list_accounts(&ServerPath::gitee())
            .await
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["bob"]);
    }

    #[tokio::test]
    async fn test_token_sources() {
        let store = store();
        let alice = Account::new("alice", ServerPath::gitee()).with_token("a");
        assert_eq!(store.get_or_request_token(&alice).await.as_deref(), Some("a"));

        let bob = Account::new("bob", ServerPath::gitee());
        assert_eq!(store.get_or_request_token(&bob).await, None);

        let store = store.with_env_token(Some("env".to_string()));
        assert_eq!(store.get_or_request_token(&bob).await.as_deref(), Some("env"));
    }

    #[tokio::test]
    async fn test_choose_account_needs_preference() {
        let candidates = store().list_accounts(&ServerPath::gitee()).await;
        assert!(store().choose_account(&candidates).await.is_none());

        let chosen = store()
            .with_preferred(Some("bob".to_string()))
            .choose_account(&candidates)
            .await
            .unwrap();
        assert_eq!(chosen.name, "bob");
    }

    #[tokio::test]
    async fn test_new_account_from_env_token() {
        let server: ServerPath = "github.com".parse().unwrap();
        assert!(store().request_new_account(&server).await.is_none());

        let account = store()
            .with_env_token(Some("env".to_string()))
            .request_new_account(&server)
            .await
            .unwrap();
        assert_eq!(account.server, server);
        assert_eq!(account.token.as_deref(), Some("env"));
    }

    #[test]
    fn test_debug_hides_token() {
        let account = Account::new("alice", ServerPath::gitee()).with_token("secret");
        assert!(!format!("{account:?}").contains("secret"));
    }
}
