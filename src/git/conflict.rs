//! Handling a rebase that stopped on conflicts
//!
//! When `git rebase` stops, the handler decides what happens next: if every
//! path is already merged (e.g. resolved by rerere) the rebase is continued,
//! otherwise it is left in progress for the user or aborted.

use async_trait::async_trait;
use gitlines::RebaseProblemDetector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use super::command::GitCommand;
use super::LocalRepository;
use crate::error::{Error, Result};
use crate::progress::{CancellationToken, Progress};

/// Upper bound on `rebase --continue` rounds for one sync
const MAX_CONTINUE_ROUNDS: usize = 256;

/// What to do with a rebase that stopped on unmerged files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// Leave the rebase in progress so the user can resolve it
    #[default]
    Leave,
    /// Run `git rebase --abort`
    Abort,
}

impl FromStr for ConflictAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leave" => Ok(Self::Leave),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown conflict action '{other}' (expected leave or abort)")),
        }
    }
}

impl fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leave => f.write_str("leave"),
            Self::Abort => f.write_str("abort"),
        }
    }
}

/// Result of an update step such as a rebase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    Success,
    /// Stopped on conflicts which were resolved without the user
    SuccessWithResolvedConflicts,
    NothingToUpdate,
    /// Stopped on conflicts that still need the user
    Incomplete { unmerged: Vec<String>, aborted: bool },
}

/// Decides how to proceed once a rebase stopped on conflicts
#[async_trait]
pub trait ConflictHandler: Send + Sync {
    async fn resolve(&self, repo: &dyn LocalRepository, progress: &Progress) -> Result<UpdateResult>;
}

/// [`ConflictHandler`] driving the git CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct GitConflictHandler {
    action: ConflictAction,
}

impl GitConflictHandler {
    pub fn new(action: ConflictAction) -> Self {
        Self { action }
    }

    pub async fn unmerged_files(repo: &dyn LocalRepository, cancel: &CancellationToken) -> Result<Vec<String>> {
        let command = GitCommand::new("diff").args(["--name-only", "--diff-filter=U"]);
        let result = repo.run(&command, &mut [], cancel).await?;
        if !result.success() {
            return Err(Error::GitError {
                message: result.error_text(),
                source: None,
            });
        }
        let mut files: Vec<String> = result.output.into_iter().map(|l| l.trim().to_string()).collect();
        files.dedup();
        Ok(files)
    }

    async fn abort(repo: &dyn LocalRepository) -> Result<()> {
        // Runs even after cancellation, hence its own token
        let result = repo
            .run(&GitCommand::new("rebase").arg("--abort"), &mut [], &CancellationToken::new())
            .await?;
        if !result.success() {
            warn!("git rebase --abort failed: {}", result.error_text());
        }
        Ok(())
    }
}

#[async_trait]
impl ConflictHandler for GitConflictHandler {
    async fn resolve(&self, repo: &dyn LocalRepository, progress: &Progress) -> Result<UpdateResult> {
        let cancel = progress.token();

        for _ in 0..MAX_CONTINUE_ROUNDS {
            let unmerged = Self::unmerged_files(repo, cancel).await?;
            if !unmerged.is_empty() {
                info!(files = unmerged.len(), action = %self.action, "Rebase stopped on conflicts");
                let aborted = match self.action {
                    ConflictAction::Leave => false,
                    ConflictAction::Abort => {
                        Self::abort(repo).await?;
                        true
                    }
                };
                return Ok(UpdateResult::Incomplete { unmerged, aborted });
            }

            progress.set_text("Continuing rebase");
            let mut detector = RebaseProblemDetector::new();
            let command = GitCommand::new("rebase").arg("--continue").env("GIT_EDITOR", "true");
            let result = repo.run(&command, &mut [&mut detector], cancel).await?;
            if result.success() {
                return Ok(UpdateResult::SuccessWithResolvedConflicts);
            }

            if detector.is_no_change_error() {
                // The commit became empty once the conflict was resolved
                let skip = repo.run(&GitCommand::new("rebase").arg("--skip"), &mut [], cancel).await?;
                if skip.success() {
                    return Ok(UpdateResult::SuccessWithResolvedConflicts);
                }
            } else if !detector.is_merge_conflict() {
                return Err(Error::RebaseFailed {
                    output: result.error_text(),
                });
            }
        }

        Err(Error::RebaseFailed {
            output: format!("rebase did not finish after {MAX_CONTINUE_ROUNDS} continue attempts"),
        })
    }
}
