//! forksync configuration
//!
//! Read from YAML. The first file found wins:
//!
//! 1. the path given with `--config`
//! 2. `<workspace>/.forksync.yaml`
//! 3. `<config dir>/forksync/config.yaml`
//!
//! Without any file the defaults apply.
//!
//! ```yaml
//! servers:
//!   - https://git.example.com:8443/gitee
//! accounts:
//!   - name: alice
//!     server: gitee.com
//!     token_env: GITEE_TOKEN
//! clone_using_ssh: false
//! save_changes_policy: stash
//! on_conflict: leave
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::git::{ConflictAction, SaveChangesPolicy};
use crate::hosting::{Account, ServerPath};

/// File name looked up in the workspace root
pub const WORKSPACE_CONFIG_FILE: &str = ".forksync.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Servers besides gitee.com that remotes may point at
    pub servers: Vec<ServerPath>,
    pub accounts: Vec<Account>,
    /// Add the parent remote with an SSH URL instead of HTTPS
    pub clone_using_ssh: bool,
    pub save_changes_policy: SaveChangesPolicy,
    pub on_conflict: ConflictAction,
    pub connection_timeout_secs: u64,
    pub workspace_scan_depth: usize,
    pub git_executable: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            accounts: Vec::new(),
            clone_using_ssh: false,
            save_changes_policy: SaveChangesPolicy::Stash,
            on_conflict: ConflictAction::Leave,
            connection_timeout_secs: 15,
            workspace_scan_depth: 3,
            git_executable: "git".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration for a workspace
    ///
    /// Returns the config together with the file it was read from.
    pub fn load(explicit: Option<&Path>, workspace: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::InvalidConfig {
                    path: path.to_path_buf(),
                    message: "file not found".to_string(),
                });
            }
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        let candidates = [
            Some(workspace.join(WORKSPACE_CONFIG_FILE)),
            dirs::config_dir().map(|d| d.join("forksync").join("config.yaml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                return Ok((Self::from_file(&path)?, Some(path)));
            }
        }

        debug!("No config file found, using defaults");
        Ok((Self::default(), None))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content).map_err(|e| Error::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// gitee.com, the configured servers and the servers of all accounts
    pub fn known_servers(&self) -> Vec<ServerPath> {
        let mut servers = vec![ServerPath::gitee()];
        for server in self.servers.iter().chain(self.accounts.iter().map(|a| &a.server)) {
            if !servers.contains(server) {
                servers.push(server.clone());
            }
        }
        servers
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs.max(1))
    }
}
