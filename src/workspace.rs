//! Workspace discovery
//!
//! A workspace is a directory together with the git repositories found in it.
//! Syncing is only supported when there is exactly one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::git::{GitRepository, LocalRepository};

pub struct Workspace {
    root: PathBuf,
    repositories: Vec<Arc<dyn LocalRepository>>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, repositories: Vec<Arc<dyn LocalRepository>>) -> Self {
        Self {
            root: root.into(),
            repositories,
        }
    }

    /// Workspace consisting of one repository
    pub fn single(repository: Arc<dyn LocalRepository>) -> Self {
        Self {
            root: repository.root().to_path_buf(),
            repositories: vec![repository],
        }
    }

    /// Find the repositories below `root`
    ///
    /// Directories are searched up to `max_depth` levels deep without
    /// descending into a repository once found, so submodules and vendored
    /// checkouts don't count. If nothing is found, the repository containing
    /// `root` is used.
    pub fn discover(root: &Path, max_depth: usize, git_executable: &str) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::NoRepository {
                path: root.to_path_buf(),
            });
        }

        let mut roots = Vec::new();
        let mut walker = WalkDir::new(root).max_depth(max_depth).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable path: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.file_name() == ".git" {
                walker.skip_current_dir();
                continue;
            }
            // `.git` is a file in worktrees and submodules
            if entry.path().join(".git").exists() {
                roots.push(entry.path().to_path_buf());
                walker.skip_current_dir();
            }
        }

        if roots.is_empty() {
            if let Ok(repo) = GitRepository::discover(root) {
                roots.push(repo.root().to_path_buf());
            }
        }
        debug!(root = %root.display(), count = roots.len(), "Discovered repositories");

        let repositories = roots
            .into_iter()
            .map(|path| {
                Arc::new(GitRepository::new(path).with_git_executable(git_executable)) as Arc<dyn LocalRepository>
            })
            .collect();
        Ok(Self::new(root, repositories))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repositories(&self) -> &[Arc<dyn LocalRepository>] {
        &self.repositories
    }

    /// The only repository, or the error a sync reports
    pub fn single_repository(&self) -> Result<Arc<dyn LocalRepository>> {
        match self.repositories.as_slice() {
            [repo] => Ok(repo.clone()),
            [] => Err(Error::NoRepository {
                path: self.root.clone(),
            }),
            many => Err(Error::MultipleRepositories { count: many.len() }),
        }
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field(
                "repositories",
                &self.repositories.iter().map(|r| r.root().to_path_buf()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
