//! User-facing notifications
//!
//! Every terminal outcome of a sync is shown exactly once through a
//! [`NotificationSink`]. Sinks are fire-and-forget: they never fail and never
//! block the sync.

use std::fmt;
use std::io::Write;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Stable identifiers for notifications, usable for filtering or suppression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationId {
    MultiRepoNotSupported,
    RemoteOriginNotFound,
    AccountNotFound,
    RepoNotFound,
    RepoIsNotAFork,
    CannotLoadRepoInfo,
    CannotConfigureUpstreamRemote,
    FetchFailed,
    RebaseConflict,
    UntrackedFilesOverwritten,
    LocalChangesOverwritten,
    PreserveChangesFailed,
    SyncInProgress,
    Cancelled,
    RebaseError,
    RebaseSuccess,
}

impl NotificationId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationId::MultiRepoNotSupported => "rebase.multi.repo.not.supported",
            NotificationId::RemoteOriginNotFound => "rebase.remote.origin.not.found",
            NotificationId::AccountNotFound => "rebase.account.not.found",
            NotificationId::RepoNotFound => "rebase.repo.not.found",
            NotificationId::RepoIsNotAFork => "rebase.repo.is.not.a.fork",
            NotificationId::CannotLoadRepoInfo => "rebase.cannot.load.repo.info",
            NotificationId::CannotConfigureUpstreamRemote => "rebase.cannot.configure.upstream.remote",
            NotificationId::FetchFailed => "rebase.fetch.failed",
            NotificationId::RebaseConflict => "rebase.conflict",
            NotificationId::UntrackedFilesOverwritten => "rebase.untracked.files.overwritten",
            NotificationId::LocalChangesOverwritten => "rebase.local.changes.overwritten",
            NotificationId::PreserveChangesFailed => "rebase.preserve.changes.failed",
            NotificationId::SyncInProgress => "rebase.sync.in.progress",
            NotificationId::Cancelled => "rebase.cancelled",
            NotificationId::RebaseError => "rebase.error",
            NotificationId::RebaseSuccess => "rebase.success",
        }
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A notification as delivered to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

/// Where notifications end up
pub trait NotificationSink: Send + Sync {
    fn show_error(&self, id: NotificationId, title: &str, message: &str);

    fn show_warning(&self, id: NotificationId, title: &str, message: &str, link: Option<&str>);

    fn show_info(&self, id: NotificationId, title: &str, message: &str);
}

/// Prints notifications to stderr and mirrors them into the log
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    fn print(&self, prefix: &str, title: &str, message: &str, link: Option<&str>) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{prefix}: {title}");
        if !message.is_empty() {
            let _ = writeln!(stderr, "  {message}");
        }
        if let Some(link) = link {
            let _ = writeln!(stderr, "  {link}");
        }
    }
}

impl NotificationSink for ConsoleNotifier {
    fn show_error(&self, id: NotificationId, title: &str, message: &str) {
        error!(%id, "{title}: {message}");
        self.print("error", title, message, None);
    }

    fn show_warning(&self, id: NotificationId, title: &str, message: &str, link: Option<&str>) {
        warn!(%id, "{title}: {message}");
        self.print("warning", title, message, link);
    }

    fn show_info(&self, id: NotificationId, title: &str, message: &str) {
        info!(%id, "{title}: {message}");
        self.print("info", title, message, None);
    }
}

/// Keeps notifications in memory, for embedding and for tests
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().map(|n| n.clone()).unwrap_or_default()
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.push(notification);
        }
    }
}

impl NotificationSink for MemoryNotifier {
    fn show_error(&self, id: NotificationId, title: &str, message: &str) {
        self.push(Notification {
            id,
            severity: Severity::Error,
            title: title.to_string(),
            message: message.to_string(),
            link: None,
        });
    }

    fn show_warning(&self, id: NotificationId, title: &str, message: &str, link: Option<&str>) {
        self.push(Notification {
            id,
            severity: Severity::Warning,
            title: title.to_string(),
            message: message.to_string(),
            link: link.map(str::to_string),
        });
    }

    fn show_info(&self, id: NotificationId, title: &str, message: &str) {
        self.push(Notification {
            id,
            severity: Severity::Info,
            title: title.to_string(),
            message: message.to_string(),
            link: None,
        });
    }
}
