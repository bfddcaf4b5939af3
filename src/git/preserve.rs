//! Keeping uncommitted changes safe while the working tree is rewritten
//!
//! [`preserving`] saves local changes, runs an operation and restores them
//! afterwards. Restoring is attempted exactly once, whatever the operation
//! returned, including cancellation.

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::command::GitCommand;
use super::LocalRepository;
use crate::error::{Error, Result};
use crate::progress::{CancellationToken, Progress};

/// Directory below `.git` holding shelved patches
const SHELF_DIR: &str = "forksync/shelf";

/// How local changes are put aside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveChangesPolicy {
    /// `git stash`
    #[default]
    Stash,
    /// A binary patch under `.git/forksync/shelf`
    Shelve,
}

impl FromStr for SaveChangesPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stash" => Ok(Self::Stash),
            "shelve" => Ok(Self::Shelve),
            other => Err(format!("unknown save policy '{other}' (expected stash or shelve)")),
        }
    }
}

impl fmt::Display for SaveChangesPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stash => f.write_str("stash"),
            Self::Shelve => f.write_str("shelve"),
        }
    }
}

/// Handle to changes that were put aside
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavedChanges {
    Stash { oid: String, label: String },
    /// Index and working tree changes as two patches, either may be empty
    Shelf { staged: PathBuf, unstaged: PathBuf },
}

impl fmt::Display for SavedChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SavedChanges::Stash { oid, label } => write!(f, "stash {} '{}'", &oid[..oid.len().min(10)], label),
            SavedChanges::Shelf { unstaged, .. } => write!(f, "shelf {}", unstaged.display()),
        }
    }
}

/// Saves and restores uncommitted changes
#[async_trait]
pub trait ChangePreserver: Send + Sync {
    /// Put local changes aside; `None` if there was nothing to save
    async fn save(
        &self,
        repo: &dyn LocalRepository,
        policy: SaveChangesPolicy,
        label: &str,
        progress: &Progress,
    ) -> Result<Option<SavedChanges>>;

    /// Bring saved changes back; `false` if they were left saved
    async fn restore(&self, repo: &dyn LocalRepository, saved: SavedChanges, progress: &Progress) -> Result<bool>;
}

/// Run `body` with local changes put aside
///
/// Returns the value of `body` and the changes still saved, if the preserver
/// chose not to restore them. The error of `body` wins over a failure to
/// restore; the restore failure is still logged so the saved changes can be
/// found.
pub async fn preserving<T, F, Fut>(
    preserver: &dyn ChangePreserver,
    repo: &dyn LocalRepository,
    policy: SaveChangesPolicy,
    label: &str,
    progress: &Progress,
    body: F,
) -> Result<(T, Option<SavedChanges>)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let saved = preserver.save(repo, policy, label, progress).await?;
    let result = body().await;

    let Some(saved) = saved else {
        return result.map(|value| (value, None));
    };
    progress.set_text("Restoring local changes");
    let restored = preserver.restore(repo, saved.clone(), progress).await;

    match (result, restored) {
        (Ok(value), Ok(true)) => Ok((value, None)),
        (Ok(value), Ok(false)) => Ok((value, Some(saved))),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(restore_err)) => {
            warn!("Failed to restore local changes: {}", restore_err);
            Err(e)
        }
    }
}

/// Timestamped label for saved changes, e.g. `forksync: rebase onto upstream/main (2024-05-01 10:00:00)`
pub fn save_label(operation: &str, onto: &str) -> String {
    format!(
        "forksync: {} onto {} ({})",
        operation,
        onto,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// [`ChangePreserver`] using git stash or patch files
#[derive(Debug, Clone, Copy, Default)]
pub struct GitChangePreserver;

impl GitChangePreserver {
    pub fn new() -> Self {
        Self
    }

    async fn run_checked(repo: &dyn LocalRepository, command: GitCommand) -> Result<Vec<String>> {
        // Saved changes must be restorable after a cancel, so never use the sync's token here
        let result = repo.run(&command, &mut [], &CancellationToken::new()).await?;
        if result.success() {
            Ok(result.output)
        } else {
            Err(Error::GitError {
                message: format!("{command}: {}", result.error_text()),
                source: None,
            })
        }
    }

    async fn stash_oid(repo: &dyn LocalRepository) -> Option<String> {
        let command = GitCommand::new("rev-parse").args(["--verify", "-q", "refs/stash"]);
        Self::run_checked(repo, command)
            .await
            .ok()
            .and_then(|out| out.into_iter().next())
            .map(|l| l.trim().to_string())
    }

    async fn stash_index(repo: &dyn LocalRepository, oid: &str) -> Result<Option<usize>> {
        let lines = Self::run_checked(repo, GitCommand::new("stash").args(["list", "--format=%H"])).await?;
        Ok(lines.iter().position(|l| l.trim() == oid))
    }

    /// Paths of the staged and unstaged patches of a new shelf
    fn shelf_paths(repo: &dyn LocalRepository) -> (PathBuf, PathBuf) {
        let stamp = Local::now().format("%Y%m%d-%H%M%S%3f");
        let dir = repo.git_dir().join(SHELF_DIR);
        (
            dir.join(format!("{stamp}.staged.patch")),
            dir.join(format!("{stamp}.patch")),
        )
    }

    /// Apply a shelved patch; `index` also applies it to the index
    ///
    /// Falls back to a three-way merge when the patch no longer applies
    /// cleanly on the rebased tree.
    async fn apply_patch(repo: &dyn LocalRepository, patch: &Path, index: bool) -> Result<()> {
        let empty = tokio::fs::metadata(patch).await.map(|m| m.len() == 0)?;
        if empty {
            return Ok(());
        }
        let path = patch.display().to_string();
        let mut apply = GitCommand::new("apply").arg("--whitespace=nowarn");
        if index {
            apply = apply.arg("--index");
        }
        if Self::run_checked(repo, apply.arg(path.clone())).await.is_ok() {
            return Ok(());
        }
        debug!(patch = %path, "Patch does not apply cleanly, trying a three-way merge");
        let three_way = GitCommand::new("apply").args(["--3way", "--whitespace=nowarn"]).arg(path);
        Self::run_checked(repo, three_way).await.map(|_| ())
    }
}

#[async_trait]
impl ChangePreserver for GitChangePreserver {
    async fn save(
        &self,
        repo: &dyn LocalRepository,
        policy: SaveChangesPolicy,
        label: &str,
        progress: &Progress,
    ) -> Result<Option<SavedChanges>> {
        progress.check_cancelled()?;
        let has_changes = repo.has_changes().await.map_err(|e| Error::SaveChangesFailed {
            message: e.to_string(),
        })?;
        if !has_changes {
            debug!("No local changes to save");
            return Ok(None);
        }

        progress.set_text(format!("Saving local changes ({policy})"));
        let save_failed = |e: Error| Error::SaveChangesFailed { message: e.to_string() };

        match policy {
            SaveChangesPolicy::Stash => {
                let before = Self::stash_oid(repo).await;
                Self::run_checked(repo, GitCommand::new("stash").args(["push", "-m", label]))
                    .await
                    .map_err(save_failed)?;
                let after = Self::stash_oid(repo).await;
                match after {
                    Some(oid) if Some(&oid) != before.as_ref() => {
                        info!(%oid, "Stashed local changes");
                        Ok(Some(SavedChanges::Stash {
                            oid,
                            label: label.to_string(),
                        }))
                    }
                    _ => Err(Error::SaveChangesFailed {
                        message: "git stash did not create a stash entry".to_string(),
                    }),
                }
            }
            SaveChangesPolicy::Shelve => {
                let (staged, unstaged) = Self::shelf_paths(repo);
                if let Some(dir) = unstaged.parent() {
                    tokio::fs::create_dir_all(dir)
                        .await
                        .map_err(|e| save_failed(e.into()))?;
                }
                // HEAD -> index and index -> working tree, so the split survives the restore
                let staged_diff = GitCommand::new("diff")
                    .args(["--binary", "--cached", "HEAD"])
                    .arg(format!("--output={}", staged.display()));
                Self::run_checked(repo, staged_diff).await.map_err(save_failed)?;
                let unstaged_diff = GitCommand::new("diff")
                    .arg("--binary")
                    .arg(format!("--output={}", unstaged.display()));
                Self::run_checked(repo, unstaged_diff).await.map_err(save_failed)?;
                Self::run_checked(repo, GitCommand::new("reset").args(["--hard", "-q", "HEAD"]))
                    .await
                    .map_err(save_failed)?;
                info!(patch = %unstaged.display(), "Shelved local changes");
                Ok(Some(SavedChanges::Shelf { staged, unstaged }))
            }
        }
    }

    async fn restore(&self, repo: &dyn LocalRepository, saved: SavedChanges, _progress: &Progress) -> Result<bool> {
        let restore_failed = |e: Error| Error::RestoreChangesFailed {
            saved: saved.to_string(),
            message: e.to_string(),
        };

        if repo.rebase_in_progress().await.unwrap_or(false) {
            // Applying on top of a stopped rebase would mix the changes into the conflict
            warn!("Rebase still in progress; local changes kept in {}", saved);
            return Ok(false);
        }

        match &saved {
            SavedChanges::Stash { oid, .. } => {
                let index = Self::stash_index(repo, oid).await.map_err(restore_failed)?;
                let Some(index) = index else {
                    return Err(Error::RestoreChangesFailed {
                        saved: saved.to_string(),
                        message: "stash entry no longer exists".to_string(),
                    });
                };
                let entry = format!("stash@{{{index}}}");
                let pop = GitCommand::new("stash").args(["pop", "--index", entry.as_str()]);
                if let Err(e) = Self::run_checked(repo, pop).await {
                    // The staged part no longer applies on its own
                    warn!("Could not restore the index from the stash, restoring as unstaged: {}", e);
                    Self::run_checked(repo, GitCommand::new("stash").args(["pop", entry.as_str()]))
                        .await
                        .map_err(restore_failed)?;
                }
                info!("Restored stashed changes");
            }
            SavedChanges::Shelf { staged, unstaged } => {
                Self::apply_patch(repo, staged, true).await.map_err(restore_failed)?;
                Self::apply_patch(repo, unstaged, false).await.map_err(restore_failed)?;
                for patch in [staged, unstaged] {
                    if let Err(e) = tokio::fs::remove_file(patch).await {
                        warn!(patch = %patch.display(), "Could not remove applied patch: {}", e);
                    }
                }
                info!("Restored shelved changes");
            }
        }
        Ok(true)
    }
}
