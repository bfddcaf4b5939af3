//! Repository metadata returned by the hosting API
//!
//! Only the fields the sync needs are modelled; everything else in the JSON
//! payload is ignored.

use serde::{Deserialize, Serialize};

use super::RepositoryPath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

/// Summary of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSummary {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    /// URL slug, which can differ from the display name on Gitee
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    pub owner: Owner,
    pub html_url: String,
    #[serde(rename = "fork", default)]
    pub is_fork: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl RepoSummary {
    /// `owner/path` as used in API URLs and remote URLs
    pub fn full_path(&self) -> Option<RepositoryPath> {
        let repository = self.path.as_deref().unwrap_or(&self.name);
        RepositoryPath::new(self.owner.login.clone(), repository).ok()
    }

    /// Default branch, treating an empty string as missing
    pub fn default_branch(&self) -> Option<&str> {
        self.default_branch.as_deref().filter(|b| !b.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

/// Full repository record, including its fork parent and source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDetailed {
    #[serde(flatten)]
    pub base: RepoSummary,
    #[serde(default)]
    pub parent: Option<Box<RepoSummary>>,
    #[serde(default)]
    pub source: Option<Box<RepoSummary>>,
    #[serde(default)]
    pub permissions: Option<Permissions>,
}

impl RepoDetailed {
    /// Parent repository, only when this repository really is a fork
    pub fn fork_parent(&self) -> Option<&RepoSummary> {
        if self.base.is_fork {
            self.parent.as_deref()
        } else {
            None
        }
    }
}
