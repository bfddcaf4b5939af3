//! Fetching the parent remote and rebasing onto it

use gitlines::{
    LocalChangesOverwrittenDetector, Operation, RebaseProblemDetector, UntrackedFilesOverwrittenDetector,
    UpToDateDetector,
};
use tracing::{info, warn};

use super::command::GitCommand;
use super::conflict::{ConflictHandler, UpdateResult};
use super::LocalRepository;
use crate::error::{Error, Result};
use crate::progress::{CancellationToken, Progress};

/// Fetch `remote`; a failed fetch becomes [`Error::FetchFailed`]
pub async fn fetch_remote(repo: &dyn LocalRepository, remote: &str, progress: &Progress) -> Result<()> {
    progress.set_text(format!("Fetching {remote}"));
    let result = repo.fetch(remote, progress).await?;
    if result.success() {
        Ok(())
    } else {
        Err(Error::FetchFailed {
            remote: remote.to_string(),
            message: result.error_text(),
        })
    }
}

/// `git rebase <onto>` with its output classified
///
/// Conflicts are handed to `conflicts`. If the sync is cancelled while git
/// runs, the process is killed and the rebase aborted.
pub async fn rebase_onto(
    repo: &dyn LocalRepository,
    onto: &str,
    conflicts: &dyn ConflictHandler,
    progress: &Progress,
) -> Result<UpdateResult> {
    progress.set_text(format!("Rebasing onto {onto}"));

    let mut problems = RebaseProblemDetector::new();
    let mut untracked = UntrackedFilesOverwrittenDetector::new();
    let mut local_changes = LocalChangesOverwrittenDetector::new(Operation::Checkout);
    let mut up_to_date = UpToDateDetector::new();

    let command = GitCommand::new("rebase").arg(onto);
    let run = repo
        .run(
            &command,
            &mut [&mut problems, &mut untracked, &mut local_changes, &mut up_to_date],
            progress.token(),
        )
        .await;

    let result = match run {
        Ok(result) => result,
        Err(Error::Cancelled) => {
            abort_after_cancel(repo).await;
            return Err(Error::Cancelled);
        }
        Err(e) => return Err(e),
    };

    if result.success() {
        if up_to_date.is_up_to_date() {
            info!("Current branch is already up to date with {}", onto);
            return Ok(UpdateResult::NothingToUpdate);
        }
        info!("Rebased onto {}", onto);
        return Ok(UpdateResult::Success);
    }

    if problems.is_merge_conflict() {
        return match conflicts.resolve(repo, progress).await {
            Err(Error::Cancelled) => {
                abort_after_cancel(repo).await;
                Err(Error::Cancelled)
            }
            other => other,
        };
    }
    if untracked.was_message_detected() {
        return Err(Error::UntrackedFilesOverwritten {
            files: untracked.relative_file_paths().to_vec(),
        });
    }
    if local_changes.was_message_detected() {
        return Err(Error::LocalChangesOverwritten {
            files: local_changes.relative_file_paths().to_vec(),
        });
    }
    Err(Error::RebaseFailed {
        output: result.error_text(),
    })
}

async fn abort_after_cancel(repo: &dyn LocalRepository) {
    if !repo.rebase_in_progress().await.unwrap_or(true) {
        return;
    }
    let abort = GitCommand::new("rebase").arg("--abort");
    match repo.run(&abort, &mut [], &CancellationToken::new()).await {
        Ok(result) if result.success() => info!("Aborted rebase after cancellation"),
        Ok(result) => warn!("git rebase --abort failed: {}", result.error_text()),
        Err(e) => warn!("git rebase --abort failed: {}", e),
    }
}
