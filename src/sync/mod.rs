//! Sync Orchestrator
//!
//! Drives one sync from pre-flight checks to the final notification:
//!
//! 1. **Pre-flight**: one repository, an `origin` on a known server, an
//!    account and a token. Nothing is touched yet.
//! 2. **Resolve parent** through the hosting API.
//! 3. **Configure remote** pointing at the parent.
//! 4. **Fetch** it.
//! 5. **Rebase** the current branch onto `<remote>/<default branch>` with
//!    local changes put aside.
//!
//! Each step only runs if the previous one succeeded. Every outcome except a
//! declined login produces exactly one notification.

mod flight;
pub mod preflight;
pub mod remote;
pub mod resolver;
mod state;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git::{
    fetch_remote, preserving, preserve::save_label, rebase_onto, ChangePreserver, ConflictAction, ConflictHandler,
    GitChangePreserver, GitConflictHandler, SaveChangesPolicy, SavedChanges, UpdateResult,
};
use crate::hosting::{AccountStore, ApiClient, ApiTransport, ServerPath};
use crate::notify::{NotificationId, NotificationSink};
use crate::progress::Progress;
use crate::workspace::Workspace;

pub use flight::FlightGuard;
pub use remote::{RemoteConfigurator, UPSTREAM_REMOTE_NAME};
pub use resolver::{ParentRepository, RepositoryResolver};
pub use state::{StateMachine, SyncState};

/// How a sync ended
#[derive(Debug)]
pub enum SyncOutcome {
    Success,
    SuccessWithResolvedConflicts,
    NothingToUpdate,
    Failed(Error),
    /// The user declined to log in; nothing was done and nothing is shown
    Aborted,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Success | SyncOutcome::SuccessWithResolvedConflicts | SyncOutcome::NothingToUpdate
        )
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            SyncOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of [`ForkSync::sync`]
#[derive(Debug)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Every state visited, starting with `Idle`
    pub states: Vec<SyncState>,
    /// `<remote>/<branch>` the branch was rebased onto, once known
    pub onto: Option<String>,
}

impl SyncReport {
    pub fn final_state(&self) -> SyncState {
        self.states.last().copied().unwrap_or(SyncState::Idle)
    }
}

/// Knobs of a sync, usually taken from [`Config`]
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Servers an `origin` may point at
    pub servers: Vec<ServerPath>,
    pub clone_using_ssh: bool,
    pub save_changes_policy: SaveChangesPolicy,
    pub on_conflict: ConflictAction,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            servers: config.known_servers(),
            clone_using_ssh: config.clone_using_ssh,
            save_changes_policy: config.save_changes_policy,
            on_conflict: config.on_conflict,
        }
    }
}

/// The fork synchroniser with all its collaborators
pub struct ForkSync {
    accounts: Arc<dyn AccountStore>,
    transport: Arc<dyn ApiTransport>,
    notifier: Arc<dyn NotificationSink>,
    preserver: Arc<dyn ChangePreserver>,
    conflicts: Arc<dyn ConflictHandler>,
    settings: SyncSettings,
}

impl ForkSync {
    /// Uses git for preserving changes and handling conflicts
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        transport: Arc<dyn ApiTransport>,
        notifier: Arc<dyn NotificationSink>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            accounts,
            transport,
            notifier,
            preserver: Arc::new(GitChangePreserver::new()),
            conflicts: Arc::new(GitConflictHandler::new(settings.on_conflict)),
            settings,
        }
    }

    pub fn with_preserver(mut self, preserver: Arc<dyn ChangePreserver>) -> Self {
        self.preserver = preserver;
        self
    }

    pub fn with_conflict_handler(mut self, conflicts: Arc<dyn ConflictHandler>) -> Self {
        self.conflicts = conflicts;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Sync the workspace's fork with its parent
    pub async fn sync(&self, workspace: &Workspace, progress: &Progress) -> SyncReport {
        let mut machine = StateMachine::new();
        let mut onto = None;

        let outcome = match self.run(workspace, progress, &mut machine, &mut onto).await {
            Ok(None) => SyncOutcome::Aborted,
            Ok(Some((UpdateResult::Success, _))) => SyncOutcome::Success,
            Ok(Some((UpdateResult::SuccessWithResolvedConflicts, _))) => SyncOutcome::SuccessWithResolvedConflicts,
            Ok(Some((UpdateResult::NothingToUpdate, _))) => SyncOutcome::NothingToUpdate,
            Ok(Some((UpdateResult::Incomplete { unmerged, aborted }, kept))) => {
                SyncOutcome::Failed(Error::RebaseConflict {
                    files: unmerged,
                    aborted,
                    kept: kept.map(|saved| saved.to_string()),
                })
            }
            Err(e) => SyncOutcome::Failed(e),
        };

        match &outcome {
            SyncOutcome::Success | SyncOutcome::NothingToUpdate => {
                machine.advance(SyncState::Succeeded);
            }
            SyncOutcome::SuccessWithResolvedConflicts => {
                machine.advance(SyncState::PartiallySucceeded);
            }
            SyncOutcome::Failed(_) => {
                machine.advance(SyncState::Failed);
            }
            SyncOutcome::Aborted => {}
        }

        self.notify(&outcome, onto.as_deref());
        SyncReport {
            outcome,
            states: machine.into_history(),
            onto,
        }
    }

    /// Pre-flight plus parent lookup, without touching the repository
    ///
    /// `Ok(None)` if the user declined to log in.
    pub async fn resolve_parent(&self, workspace: &Workspace, progress: &Progress) -> Result<Option<ParentRepository>> {
        let Some(pre) = preflight::run(workspace, &self.settings.servers, self.accounts.as_ref(), progress).await? else {
            return Ok(None);
        };
        let client = ApiClient::new(self.transport.clone(), pre.server.clone(), Some(pre.token.clone()));
        let parent = RepositoryResolver::new(&client).resolve(&pre.path, progress).await?;
        Ok(Some(parent))
    }

    async fn run(
        &self,
        workspace: &Workspace,
        progress: &Progress,
        machine: &mut StateMachine,
        onto: &mut Option<String>,
    ) -> Result<Option<(UpdateResult, Option<SavedChanges>)>> {
        let Some(pre) = preflight::run(workspace, &self.settings.servers, self.accounts.as_ref(), progress).await? else {
            return Ok(None);
        };
        let _guard = FlightGuard::acquire(pre.repo.root())?;
        let repo = pre.repo.as_ref();
        info!(
            account = %pre.account,
            origin = pre.origin.first_url().unwrap_or_default(),
            fork = %pre.path,
            "Syncing fork"
        );

        machine.advance(SyncState::ResolvingParent);
        let client = ApiClient::new(self.transport.clone(), pre.server.clone(), Some(pre.token.clone()));
        let parent = RepositoryResolver::new(&client).resolve(&pre.path, progress).await?;
        progress.check_cancelled()?;

        machine.advance(SyncState::ConfiguringRemote);
        let remote = RemoteConfigurator::new(pre.server.clone(), self.settings.clone_using_ssh)
            .ensure(repo, &parent.path, progress)
            .await?;
        progress.check_cancelled()?;

        machine.advance(SyncState::Fetching);
        fetch_remote(repo, &remote.name, progress).await?;
        progress.check_cancelled()?;

        machine.advance(SyncState::Rebasing);
        let target = format!("{}/{}", remote.name, parent.default_branch);
        *onto = Some(target.clone());
        let branch = repo.current_branch().await.ok().flatten();
        info!(
            branch = branch.as_deref().unwrap_or("(detached HEAD)"),
            onto = %target,
            "Rebasing current branch"
        );
        let label = save_label("rebase", &target);
        let result = preserving(
            self.preserver.as_ref(),
            repo,
            self.settings.save_changes_policy,
            &label,
            progress,
            || rebase_onto(repo, &target, self.conflicts.as_ref(), progress),
        )
        .await;
        repo.refresh().await;

        Ok(Some(result?))
    }

    fn notify(&self, outcome: &SyncOutcome, onto: Option<&str>) {
        let onto = onto.unwrap_or("parent");
        match outcome {
            SyncOutcome::Aborted => info!("Sync aborted"),
            SyncOutcome::Success | SyncOutcome::SuccessWithResolvedConflicts => {
                self.notifier
                    .show_info(NotificationId::RebaseSuccess, "Rebase successful", &format!("Rebased onto {onto}"));
            }
            SyncOutcome::NothingToUpdate => {
                self.notifier.show_info(
                    NotificationId::RebaseSuccess,
                    "Rebase successful",
                    &format!("Already up to date with {onto}"),
                );
            }
            SyncOutcome::Failed(error @ Error::NotAFork { html_url, .. }) => {
                self.notifier
                    .show_warning(error.notification_id(), error.title(), &error.to_string(), Some(html_url));
            }
            SyncOutcome::Failed(error @ Error::Cancelled) => {
                self.notifier
                    .show_warning(error.notification_id(), error.title(), &error.to_string(), None);
            }
            SyncOutcome::Failed(error) => {
                warn!(kind = ?error.kind(), "Sync failed: {}", error);
                let mut message = error.to_string();
                if let Some(hint) = error.suggestion() {
                    message.push('\n');
                    message.push_str(hint);
                }
                if let Error::RebaseConflict { kept: Some(kept), .. } = error {
                    message.push_str(&format!("\nYour local changes are saved in {kept}"));
                }
                if error.is_retryable() {
                    message.push_str("\nTry again later");
                }
                self.notifier.show_error(error.notification_id(), error.title(), &message);
            }
        }
    }
}
