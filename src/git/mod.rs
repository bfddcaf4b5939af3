//! Git backend for forksync
//!
//! Everything the sync does to a working copy goes through
//! [`LocalRepository`].
//!
//! # Split of responsibilities
//!
//! 1. **git2**: reading remotes, branches and status, adding remotes.
//! 2. **git CLI**: fetch, rebase, stash. Their textual output is streamed
//!    line by line into the `gitlines` detectors.
//!
//! Cancellation kills a running git process; see [`command::run_git`].

use async_trait::async_trait;
use git2::{Repository as Git2Repo, RepositoryState, StatusOptions};
use gitlines::{LineListener, ProgressAnalyzer};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub mod command;
mod conflict;
pub mod preserve;
mod sync;

pub use command::{CommandResult, GitCommand};
pub use conflict::{ConflictAction, ConflictHandler, GitConflictHandler, UpdateResult};
pub use preserve::{preserving, ChangePreserver, GitChangePreserver, SaveChangesPolicy, SavedChanges};
pub use sync::{fetch_remote, rebase_onto};

use crate::error::{Error, Result};
use crate::progress::{CancellationToken, Progress};
use crate::validation::validate_remote_name;

/// A configured git remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub urls: Vec<String>,
    pub push_urls: Vec<String>,
}

impl Remote {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            urls: vec![url.into()],
            push_urls: Vec::new(),
        }
    }

    pub fn first_url(&self) -> Option<&str> {
        self.urls.first().map(String::as_str)
    }
}

/// A working copy the sync operates on
#[async_trait]
pub trait LocalRepository: Send + Sync {
    /// Root of the working tree
    fn root(&self) -> &Path;

    fn git_dir(&self) -> PathBuf {
        self.root().join(".git")
    }

    async fn remotes(&self) -> Result<Vec<Remote>>;

    /// Add a remote; fails if one with that name already exists
    async fn add_remote(&self, name: &str, url: &str) -> Result<()>;

    /// Checked-out branch, `None` when HEAD is detached or unborn
    async fn current_branch(&self) -> Result<Option<String>>;

    /// True if tracked files have uncommitted changes
    async fn has_changes(&self) -> Result<bool>;

    async fn rebase_in_progress(&self) -> Result<bool> {
        Ok(false)
    }

    /// Run a git command, streaming its output to `listeners`
    async fn run(
        &self,
        command: &GitCommand,
        listeners: &mut [&mut (dyn LineListener + Send)],
        cancel: &CancellationToken,
    ) -> Result<CommandResult>;

    /// `git fetch --progress <remote>`, reporting transfer progress
    async fn fetch(&self, remote: &str, progress: &Progress) -> Result<CommandResult> {
        let reporter = progress.clone();
        let mut analyzer = ProgressAnalyzer::new(move |fraction| reporter.set_fraction(fraction));
        let command = GitCommand::new("fetch").args(["--progress", remote]);
        self.run(&command, &mut [&mut analyzer], progress.token()).await
    }

    /// Let git pick up working tree changes made behind its back
    async fn refresh(&self) {}
}

/// [`LocalRepository`] on disk
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
    git: String,
}

impl GitRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git: "git".to_string(),
        }
    }

    /// Open the repository containing `path`
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = Git2Repo::discover(path)?;
        let root = repo.workdir().ok_or_else(|| Error::GitError {
            message: format!("{} is a bare repository", repo.path().display()),
            source: None,
        })?;
        Ok(Self::new(root.to_path_buf()))
    }

    pub fn with_git_executable(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    fn open(&self) -> Result<Git2Repo> {
        Ok(Git2Repo::open(&self.root)?)
    }
}

#[async_trait]
impl LocalRepository for GitRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn git_dir(&self) -> PathBuf {
        self.open()
            .map(|repo| repo.path().to_path_buf())
            .unwrap_or_else(|_| self.root.join(".git"))
    }

    async fn remotes(&self) -> Result<Vec<Remote>> {
        let repo = self.open()?;
        let names = repo.remotes()?;
        let mut remotes = Vec::new();
        for name in names.iter().flatten() {
            let remote = repo.find_remote(name)?;
            remotes.push(Remote {
                name: name.to_string(),
                urls: remote.url().map(str::to_string).into_iter().collect(),
                push_urls: remote.pushurl().map(str::to_string).into_iter().collect(),
            });
        }
        Ok(remotes)
    }

    async fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        let cannot = |message: String| Error::CannotConfigureRemote {
            name: name.to_string(),
            message,
        };
        validate_remote_name(name).map_err(|e| cannot(e.to_string()))?;
        let repo = self.open()?;
        repo.remote(name, url).map_err(|e| cannot(e.message().to_string()))?;
        debug!(%name, %url, "Added remote");
        Ok(())
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        let repo = self.open()?;
        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if head.is_branch() {
            Ok(head.shorthand().map(str::to_string))
        } else {
            Ok(None)
        }
    }

    async fn has_changes(&self) -> Result<bool> {
        let repo = self.open()?;
        let mut options = StatusOptions::new();
        options.include_untracked(false).include_ignored(false).exclude_submodules(true);
        let statuses = repo.statuses(Some(&mut options))?;
        Ok(!statuses.is_empty())
    }

    async fn rebase_in_progress(&self) -> Result<bool> {
        let repo = self.open()?;
        Ok(matches!(
            repo.state(),
            RepositoryState::Rebase | RepositoryState::RebaseInteractive | RepositoryState::RebaseMerge
        ))
    }

    async fn run(
        &self,
        command: &GitCommand,
        listeners: &mut [&mut (dyn LineListener + Send)],
        cancel: &CancellationToken,
    ) -> Result<CommandResult> {
        command::run_git(&self.git, &self.root, command, listeners, cancel).await
    }

    async fn refresh(&self) {
        let command = GitCommand::new("update-index").args(["-q", "--refresh"]);
        // Exit code 1 only means some files need updating
        if let Err(e) = self.run(&command, &mut [], &CancellationToken::new()).await {
            warn!("Failed to refresh repository state: {}", e);
        }
    }
}
