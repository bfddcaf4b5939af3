//! Error types for forksync
//!
//! Every failure of a sync terminates the state machine and is shown to the
//! user exactly once, so each variant knows its kind, its notification id and
//! the title it is shown under.

use std::path::PathBuf;
use thiserror::Error;

use crate::hosting::api::ApiError;
use crate::hosting::RepositoryPath;
use crate::notify::NotificationId;

/// The main error type for forksync operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    #[error("Syncing a fork is not supported for workspaces with {count} repositories")]
    MultipleRepositories { count: usize },

    #[error("No git repository found in {path}")]
    NoRepository { path: PathBuf },

    #[error("Can't find a remote named 'origin' pointing at a known server")]
    OriginNotFound,

    #[error("No suitable account found for {server}")]
    NoSuitableAccount { server: String },

    #[error("Invalid configuration in {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    // ==========================================================================
    // Resolution Errors
    // ==========================================================================
    #[error("Can't find repository '{path}'")]
    RepoNotFound { path: RepositoryPath },

    #[error("Repository '{name}' is not a fork")]
    NotAFork { name: String, html_url: String },

    #[error("Can't find the default branch of '{path}'")]
    NoDefaultBranch { path: RepositoryPath },

    // ==========================================================================
    // Transport Errors
    // ==========================================================================
    #[error("Can't load repository info: {0}")]
    Transport(#[from] ApiError),

    // ==========================================================================
    // Remote Configuration Errors
    // ==========================================================================
    #[error("Can't configure remote '{name}': {message}")]
    CannotConfigureRemote { name: String, message: String },

    #[error("Configured remote '{name}' not found")]
    UpstreamNotFound { name: String },

    // ==========================================================================
    // Fetch / Rebase Errors
    // ==========================================================================
    #[error("Can't fetch '{remote}': {message}")]
    FetchFailed { remote: String, message: String },

    #[error("Rebase stopped on conflicts in {}", .files.join(", "))]
    RebaseConflict {
        files: Vec<String>,
        aborted: bool,
        /// Where local changes were left saved, if they could not be restored
        kept: Option<String>,
    },

    #[error("Untracked files would be overwritten by rebase: {}", .files.join(", "))]
    UntrackedFilesOverwritten { files: Vec<String> },

    #[error("Local changes would be overwritten by rebase: {}", .files.join(", "))]
    LocalChangesOverwritten { files: Vec<String> },

    #[error("Rebase failed: {output}")]
    RebaseFailed { output: String },

    // ==========================================================================
    // Local Change Preservation Errors
    // ==========================================================================
    #[error("Couldn't save uncommitted changes: {message}")]
    SaveChangesFailed { message: String },

    #[error("Couldn't restore saved changes ({saved}): {message}")]
    RestoreChangesFailed { saved: String, message: String },

    // ==========================================================================
    // Control Flow
    // ==========================================================================
    #[error("A sync is already running for {root}")]
    SyncInProgress { root: PathBuf },

    #[error("Sync cancelled")]
    Cancelled,

    // ==========================================================================
    // Git / IO Errors
    // ==========================================================================
    #[error("Git operation failed: {message}")]
    GitError {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },

    #[error("Git command '{command}' could not be run: {source}")]
    GitSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {message}")]
    YamlParseError { message: String },
}

/// Result type alias for forksync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Pre-flight problems with the workspace, accounts or config
    Configuration,
    /// The hosted repository is not a usable fork
    Resolution,
    /// Talking to the hosting API failed
    Transport,
    /// The parent remote could not be set up
    RemoteConfig,
    Fetch,
    /// Rebase stopped on conflicts that may be resolved interactively
    RebaseConflict,
    /// The working tree has to be cleaned up before retrying
    RebaseOverwrite,
    RebaseUnknown,
    Preservation,
    Cancelled,
    Git,
}

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::GitError {
            message: err.message().to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MultipleRepositories { .. }
            | Error::NoRepository { .. }
            | Error::OriginNotFound
            | Error::NoSuitableAccount { .. }
            | Error::InvalidConfig { .. }
            | Error::SyncInProgress { .. }
            | Error::YamlParseError { .. } => ErrorKind::Configuration,
            Error::RepoNotFound { .. } | Error::NotAFork { .. } | Error::NoDefaultBranch { .. } => {
                ErrorKind::Resolution
            }
            Error::Transport(_) => ErrorKind::Transport,
            Error::CannotConfigureRemote { .. } | Error::UpstreamNotFound { .. } => ErrorKind::RemoteConfig,
            Error::FetchFailed { .. } => ErrorKind::Fetch,
            Error::RebaseConflict { .. } => ErrorKind::RebaseConflict,
            Error::UntrackedFilesOverwritten { .. } | Error::LocalChangesOverwritten { .. } => {
                ErrorKind::RebaseOverwrite
            }
            Error::RebaseFailed { .. } => ErrorKind::RebaseUnknown,
            Error::SaveChangesFailed { .. } | Error::RestoreChangesFailed { .. } => ErrorKind::Preservation,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::GitError { .. } | Error::GitSpawn { .. } | Error::Io(_) => ErrorKind::Git,
        }
    }

    /// Id of the notification this error is reported with
    pub fn notification_id(&self) -> NotificationId {
        match self {
            Error::MultipleRepositories { .. } => NotificationId::MultiRepoNotSupported,
            Error::NoRepository { .. } | Error::OriginNotFound => NotificationId::RemoteOriginNotFound,
            Error::NoSuitableAccount { .. } => NotificationId::AccountNotFound,
            Error::RepoNotFound { .. } | Error::NoDefaultBranch { .. } => NotificationId::RepoNotFound,
            Error::NotAFork { .. } => NotificationId::RepoIsNotAFork,
            Error::Transport(_) => NotificationId::CannotLoadRepoInfo,
            Error::CannotConfigureRemote { .. } | Error::UpstreamNotFound { .. } => {
                NotificationId::CannotConfigureUpstreamRemote
            }
            Error::FetchFailed { .. } => NotificationId::FetchFailed,
            Error::RebaseConflict { .. } => NotificationId::RebaseConflict,
            Error::UntrackedFilesOverwritten { .. } => NotificationId::UntrackedFilesOverwritten,
            Error::LocalChangesOverwritten { .. } => NotificationId::LocalChangesOverwritten,
            Error::SaveChangesFailed { .. } | Error::RestoreChangesFailed { .. } => {
                NotificationId::PreserveChangesFailed
            }
            Error::SyncInProgress { .. } => NotificationId::SyncInProgress,
            Error::Cancelled => NotificationId::Cancelled,
            _ => NotificationId::RebaseError,
        }
    }

    /// Title of the notification this error is reported with
    pub fn title(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Transport => "Can't load repository info",
            ErrorKind::Cancelled => "Sync cancelled",
            _ => "Can't sync fork",
        }
    }

    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::MultipleRepositories { .. } => Some("Run the sync from inside a single repository"),
            Error::OriginNotFound => Some("Add an 'origin' remote pointing at your fork"),
            Error::NoSuitableAccount { .. } => {
                Some("Add an account for this server to the config file or set FORKSYNC_TOKEN")
            }
            Error::RebaseConflict { aborted: false, .. } => {
                Some("Resolve the conflicts and run: git rebase --continue")
            }
            Error::UntrackedFilesOverwritten { .. } => Some("Move or remove the listed files and try again"),
            Error::LocalChangesOverwritten { .. } => Some("Commit or stash the listed files and try again"),
            Error::RestoreChangesFailed { .. } => Some("Your changes are kept in the stash or shelf named above"),
            _ => None,
        }
    }

    /// True if trying again later, unchanged, could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(ApiError::RateLimited { .. }))
    }
}
