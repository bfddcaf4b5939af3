//! End-to-end sync scenarios against in-memory collaborators

use async_trait::async_trait;
use forksync::git::{
    ChangePreserver, CommandResult, ConflictHandler, GitCommand, GitRepository, LocalRepository, Remote,
    SaveChangesPolicy, SavedChanges, UpdateResult,
};
use forksync::hosting::api::{ApiRequest, ApiResponse};
use forksync::hosting::{Account, AccountStore, ApiError, ApiTransport, RepositoryPath, ServerPath};
use forksync::notify::{MemoryNotifier, NotificationId, Severity};
use forksync::sync::{FlightGuard, RemoteConfigurator};
use forksync::{CancellationToken, Error, ForkSync, Progress, SyncOutcome, SyncSettings, SyncState, Workspace};
use gitlines::{LineListener, OutputStream};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// =============================================================================
// Fakes
// =============================================================================

#[derive(Clone)]
enum Script {
    Output { stderr: Vec<&'static str>, exit_code: i32 },
    /// Cancel the sync while the command runs
    Cancel,
}

impl Script {
    fn fail(stderr: &[&'static str]) -> Self {
        Script::Output {
            stderr: stderr.to_vec(),
            exit_code: 1,
        }
    }

    fn succeed(stderr: &[&'static str]) -> Self {
        Script::Output {
            stderr: stderr.to_vec(),
            exit_code: 0,
        }
    }
}

struct FakeRepo {
    root: PathBuf,
    remotes: Mutex<Vec<Remote>>,
    commands: Mutex<Vec<String>>,
    scripts: Mutex<HashMap<String, Script>>,
    added_remotes: AtomicUsize,
    refreshes: AtomicUsize,
    rebase_stopped: AtomicBool,
}

impl FakeRepo {
    fn new(name: &str, origin: &str) -> Arc<Self> {
        Arc::new(Self {
            root: PathBuf::from(format!("/forksync-tests/{name}")),
            remotes: Mutex::new(vec![Remote::new("origin", origin)]),
            commands: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            added_remotes: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            rebase_stopped: AtomicBool::new(false),
        })
    }

    fn with_remote(self: Arc<Self>, name: &str, url: &str) -> Arc<Self> {
        self.remotes.lock().unwrap().push(Remote::new(name, url));
        self
    }

    fn script(&self, command: &str, script: Script) {
        self.scripts.lock().unwrap().insert(command.to_string(), script);
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn ran(&self, command: &str) -> bool {
        self.commands().iter().any(|c| c == command)
    }

    fn remote_names(&self) -> Vec<String> {
        self.remotes.lock().unwrap().iter().map(|r| r.name.clone()).collect()
    }
}

#[async_trait]
impl LocalRepository for FakeRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn remotes(&self) -> forksync::Result<Vec<Remote>> {
        Ok(self.remotes.lock().unwrap().clone())
    }

    async fn add_remote(&self, name: &str, url: &str) -> forksync::Result<()> {
        let mut remotes = self.remotes.lock().unwrap();
        if remotes.iter().any(|r| r.name == name) {
            return Err(Error::CannotConfigureRemote {
                name: name.to_string(),
                message: format!("remote {name} already exists"),
            });
        }
        remotes.push(Remote::new(name, url));
        self.added_remotes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn current_branch(&self) -> forksync::Result<Option<String>> {
        Ok(Some("master".to_string()))
    }

    async fn has_changes(&self) -> forksync::Result<bool> {
        Ok(false)
    }

    async fn rebase_in_progress(&self) -> forksync::Result<bool> {
        Ok(self.rebase_stopped.load(Ordering::SeqCst))
    }

    async fn run(
        &self,
        command: &GitCommand,
        listeners: &mut [&mut (dyn LineListener + Send)],
        cancel: &CancellationToken,
    ) -> forksync::Result<CommandResult> {
        let line = command.to_string();
        self.commands.lock().unwrap().push(line.clone());
        if line == "git rebase --abort" {
            self.rebase_stopped.store(false, Ordering::SeqCst);
        }

        let script = self.scripts.lock().unwrap().get(&line).cloned();
        match script {
            Some(Script::Cancel) => {
                if command.subcommand() == "rebase" {
                    self.rebase_stopped.store(true, Ordering::SeqCst);
                }
                cancel.cancel();
                Err(Error::Cancelled)
            }
            Some(Script::Output { stderr, exit_code }) => {
                for line in &stderr {
                    gitlines::dispatch(line, OutputStream::Stderr, listeners);
                }
                gitlines::finish(Some(exit_code), listeners);
                Ok(CommandResult {
                    exit_code: Some(exit_code),
                    output: Vec::new(),
                    error_output: stderr.iter().map(|s| s.to_string()).collect(),
                })
            }
            None => {
                gitlines::finish(Some(0), listeners);
                Ok(CommandResult {
                    exit_code: Some(0),
                    ..CommandResult::default()
                })
            }
        }
    }

    async fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeTransport {
    responses: HashMap<String, ApiResponse>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn respond(mut self, path: &str, response: ApiResponse) -> Self {
        self.responses
            .insert(format!("https://gitee.com/api/v5/repos/{path}"), response);
        self
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ApiTransport for FakeTransport {
    async fn execute(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<ApiResponse, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(self
            .responses
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| ApiResponse::json(404, r#"{"message":"Not Found"}"#)))
    }
}

struct FakeAccounts {
    accounts: Vec<Account>,
    token: Option<String>,
    chosen: Option<usize>,
    token_requests: AtomicUsize,
}

impl FakeAccounts {
    fn one() -> Self {
        Self {
            accounts: vec![Account::new("me", ServerPath::gitee())],
            token: Some("secret".to_string()),
            chosen: None,
            token_requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AccountStore for FakeAccounts {
    async fn list_accounts(&self, server: &ServerPath) -> Vec<Account> {
        self.accounts.iter().filter(|a| &a.server == server).cloned().collect()
    }

    async fn get_or_request_token(&self, _account: &Account) -> Option<String> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        self.token.clone()
    }

    async fn choose_account(&self, candidates: &[Account]) -> Option<Account> {
        self.chosen.and_then(|i| candidates.get(i).cloned())
    }
}

#[derive(Default)]
struct CountingPreserver {
    has_changes: bool,
    /// Leave the changes saved instead of restoring them
    keep: bool,
    saves: AtomicUsize,
    restores: AtomicUsize,
}

impl CountingPreserver {
    fn with_changes() -> Arc<Self> {
        Arc::new(Self {
            has_changes: true,
            ..Self::default()
        })
    }

    fn keeping_changes() -> Arc<Self> {
        Arc::new(Self {
            has_changes: true,
            keep: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl ChangePreserver for CountingPreserver {
    async fn save(
        &self,
        _repo: &dyn LocalRepository,
        _policy: SaveChangesPolicy,
        label: &str,
        _progress: &Progress,
    ) -> forksync::Result<Option<SavedChanges>> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(self.has_changes.then(|| SavedChanges::Stash {
            oid: "0123456789abcdef".to_string(),
            label: label.to_string(),
        }))
    }

    async fn restore(
        &self,
        _repo: &dyn LocalRepository,
        _saved: SavedChanges,
        _progress: &Progress,
    ) -> forksync::Result<bool> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(!self.keep)
    }
}

struct FixedConflictResult(UpdateResult);

#[async_trait]
impl ConflictHandler for FixedConflictResult {
    async fn resolve(&self, _repo: &dyn LocalRepository, _progress: &Progress) -> forksync::Result<UpdateResult> {
        Ok(self.0.clone())
    }
}

// =============================================================================
// Helpers
// =============================================================================

const ORIGIN_URL: &str = "https://gitee.com/me/lib.git";

fn fork_of_acme() -> ApiResponse {
    ApiResponse::json(
        200,
        r#"{
            "name": "lib", "path": "lib", "owner": {"login": "me"},
            "html_url": "https://gitee.com/me/lib", "fork": true, "default_branch": "master",
            "parent": {
                "name": "lib", "path": "lib", "owner": {"login": "acme"},
                "html_url": "https://gitee.com/acme/lib", "fork": false, "default_branch": "main"
            }
        }"#,
    )
}

fn not_a_fork() -> ApiResponse {
    ApiResponse::json(
        200,
        r#"{"name": "lib", "owner": {"login": "me"}, "html_url": "https://gitee.com/me/lib", "fork": false}"#,
    )
}

struct Harness {
    repo: Arc<FakeRepo>,
    transport: Arc<FakeTransport>,
    accounts: Arc<FakeAccounts>,
    preserver: Arc<CountingPreserver>,
    notifier: Arc<MemoryNotifier>,
    conflicts: Option<Arc<dyn ConflictHandler>>,
}

impl Harness {
    fn new(repo: Arc<FakeRepo>, transport: FakeTransport) -> Self {
        Self {
            repo,
            transport: Arc::new(transport),
            accounts: Arc::new(FakeAccounts::one()),
            preserver: Arc::new(CountingPreserver::default()),
            notifier: Arc::new(MemoryNotifier::new()),
            conflicts: None,
        }
    }

    fn forksync(&self) -> ForkSync {
        let forksync = ForkSync::new(
            self.accounts.clone(),
            self.transport.clone(),
            self.notifier.clone(),
            SyncSettings::default(),
        )
        .with_preserver(self.preserver.clone());
        match &self.conflicts {
            Some(conflicts) => forksync.with_conflict_handler(conflicts.clone()),
            None => forksync,
        }
    }

    fn workspace(&self) -> Workspace {
        Workspace::single(self.repo.clone())
    }

    async fn sync(&self) -> forksync::SyncReport {
        self.forksync().sync(&self.workspace(), &Progress::default()).await
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_sync_creates_upstream_fetches_and_rebases() {
    let h = Harness::new(
        FakeRepo::new("scenario-a", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", fork_of_acme()),
    );

    let report = h.sync().await;

    assert!(matches!(report.outcome, SyncOutcome::Success), "{:?}", report.outcome);
    assert_eq!(
        report.states,
        vec![
            SyncState::Idle,
            SyncState::ResolvingParent,
            SyncState::ConfiguringRemote,
            SyncState::Fetching,
            SyncState::Rebasing,
            SyncState::Succeeded,
        ]
    );
    assert_eq!(report.onto.as_deref(), Some("upstream/main"));

    assert_eq!(h.repo.added_remotes.load(Ordering::SeqCst), 1);
    let remotes = h.repo.remotes.lock().unwrap().clone();
    let upstream = remotes.iter().find(|r| r.name == "upstream").unwrap();
    assert_eq!(upstream.first_url(), Some("https://gitee.com/acme/lib.git"));

    assert_eq!(
        h.repo.commands(),
        vec!["git fetch --progress upstream", "git rebase upstream/main"]
    );
    // Once before resolving, once after the rebase
    assert_eq!(h.repo.refreshes.load(Ordering::SeqCst), 2);

    let notifications = h.notifier.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].id, NotificationId::RebaseSuccess);
    assert_eq!(notifications[0].severity, Severity::Info);

    let requests = h.transport.requests.lock().unwrap();
    assert_eq!(requests[0].token.as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_not_a_fork_warns_without_touching_the_repository() {
    let h = Harness::new(
        FakeRepo::new("scenario-b", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", not_a_fork()),
    );

    let report = h.sync().await;

    assert!(matches!(report.outcome, SyncOutcome::Failed(Error::NotAFork { .. })));
    assert_eq!(report.final_state(), SyncState::Failed);
    assert!(!report.states.contains(&SyncState::ConfiguringRemote));
    assert_eq!(h.repo.added_remotes.load(Ordering::SeqCst), 0);
    assert!(h.repo.commands().is_empty());
    assert_eq!(h.preserver.saves.load(Ordering::SeqCst), 0);

    let notifications = h.notifier.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].severity, Severity::Warning);
    assert_eq!(notifications[0].id, NotificationId::RepoIsNotAFork);
    assert!(notifications[0].message.contains("'lib'"));
    assert_eq!(notifications[0].link.as_deref(), Some("https://gitee.com/me/lib"));
}

#[tokio::test]
async fn test_untracked_files_overwritten_restores_changes() {
    let repo = FakeRepo::new("scenario-c", ORIGIN_URL);
    repo.script(
        "git rebase upstream/main",
        Script::fail(&[
            "error: The following untracked working tree files would be overwritten by checkout:",
            "\tconfig.yml",
            "Please move or remove them before you switch branches.",
            "Aborting",
        ]),
    );
    let mut h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));
    h.preserver = CountingPreserver::with_changes();

    let report = h.sync().await;

    match &report.outcome {
        SyncOutcome::Failed(Error::UntrackedFilesOverwritten { files }) => {
            assert_eq!(files, &vec!["config.yml".to_string()]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.final_state(), SyncState::Failed);
    assert_eq!(h.preserver.saves.load(Ordering::SeqCst), 1);
    assert_eq!(h.preserver.restores.load(Ordering::SeqCst), 1);

    let notifications = h.notifier.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].id, NotificationId::UntrackedFilesOverwritten);
    assert_eq!(notifications[0].severity, Severity::Error);
}

// =============================================================================
// Remote configuration
// =============================================================================

#[tokio::test]
async fn test_existing_parent_remote_is_reused_whatever_its_name() {
    let repo = FakeRepo::new("existing-remote", ORIGIN_URL).with_remote("acme", "git@gitee.com:acme/lib.git");
    let h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));

    let report = h.sync().await;

    assert!(report.outcome.is_success());
    assert_eq!(report.onto.as_deref(), Some("acme/main"));
    assert_eq!(h.repo.added_remotes.load(Ordering::SeqCst), 0);
    assert!(h.repo.ran("git fetch --progress acme"));
}

#[tokio::test]
async fn test_foreign_upstream_cannot_be_replaced() {
    let repo = FakeRepo::new("foreign-upstream", ORIGIN_URL).with_remote("upstream", "https://github.com/other/lib.git");
    let h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));

    let report = h.sync().await;

    assert!(matches!(
        report.outcome,
        SyncOutcome::Failed(Error::CannotConfigureRemote { .. })
    ));
    assert!(h.repo.commands().is_empty());
    assert_eq!(
        h.notifier.notifications()[0].id,
        NotificationId::CannotConfigureUpstreamRemote
    );
}

#[tokio::test]
async fn test_configurator_is_idempotent() {
    let repo = FakeRepo::new("idempotent", ORIGIN_URL);
    let parent = RepositoryPath::new("acme", "lib").unwrap();
    let configurator = RemoteConfigurator::new(ServerPath::gitee(), true);
    let progress = Progress::default();

    let first = configurator.ensure(repo.as_ref(), &parent, &progress).await.unwrap();
    let second = configurator.ensure(repo.as_ref(), &parent, &progress).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.first_url(), Some("git@gitee.com:acme/lib.git"));
    assert_eq!(repo.remote_names(), vec!["origin", "upstream"]);
}

#[tokio::test]
async fn test_configurator_on_real_repository() {
    let tmp = TempDir::new().unwrap();
    git2::Repository::init(tmp.path()).unwrap();
    let repo = GitRepository::new(tmp.path());
    repo.add_remote("origin", ORIGIN_URL).await.unwrap();

    let parent = RepositoryPath::new("acme", "lib").unwrap();
    let configurator = RemoteConfigurator::new(ServerPath::gitee(), false);
    let progress = Progress::default();
    configurator.ensure(&repo, &parent, &progress).await.unwrap();
    configurator.ensure(&repo, &parent, &progress).await.unwrap();

    let remotes = repo.remotes().await.unwrap();
    assert_eq!(remotes.len(), 2);
    let upstream = remotes.iter().find(|r| r.name == "upstream").unwrap();
    assert_eq!(upstream.first_url(), Some("https://gitee.com/acme/lib.git"));
}

// =============================================================================
// Rebase classification
// =============================================================================

#[tokio::test]
async fn test_unknown_rebase_failure_reports_git_output() {
    let repo = FakeRepo::new("unknown-failure", ORIGIN_URL);
    repo.script(
        "git rebase upstream/main",
        Script::fail(&["fatal: something unexpected happened"]),
    );
    let h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));

    let report = h.sync().await;

    match &report.outcome {
        SyncOutcome::Failed(Error::RebaseFailed { output }) => {
            assert_eq!(output, "fatal: something unexpected happened");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.notifier.notifications()[0].id, NotificationId::RebaseError);
    // Refreshed after the failure too
    assert_eq!(h.repo.refreshes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_local_changes_overwritten() {
    let repo = FakeRepo::new("local-changes", ORIGIN_URL);
    repo.script(
        "git rebase upstream/main",
        Script::fail(&[
            "error: Your local changes to the following files would be overwritten by checkout:",
            "\tsrc/lib.rs",
            "Please commit your changes or stash them before you switch branches.",
            "Aborting",
        ]),
    );
    let h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));

    let report = h.sync().await;

    match &report.outcome {
        SyncOutcome::Failed(Error::LocalChangesOverwritten { files }) => {
            assert_eq!(files, &vec!["src/lib.rs".to_string()]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_up_to_date_is_nothing_to_update() {
    let repo = FakeRepo::new("up-to-date", ORIGIN_URL);
    repo.script(
        "git rebase upstream/main",
        Script::succeed(&["Current branch master is up to date."]),
    );
    let h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));

    let report = h.sync().await;

    assert!(matches!(report.outcome, SyncOutcome::NothingToUpdate));
    assert_eq!(report.final_state(), SyncState::Succeeded);
    assert!(h.notifier.notifications()[0].message.contains("up to date"));
}

#[tokio::test]
async fn test_conflict_left_for_the_user() {
    let repo = FakeRepo::new("conflict-left", ORIGIN_URL);
    repo.script(
        "git rebase upstream/main",
        Script::fail(&[
            "CONFLICT (content): Merge conflict in src/lib.rs",
            "error: could not apply 1a2b3c4... Change lib",
        ]),
    );
    let mut h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));
    h.conflicts = Some(Arc::new(FixedConflictResult(UpdateResult::Incomplete {
        unmerged: vec!["src/lib.rs".to_string()],
        aborted: false,
    })));
    h.preserver = CountingPreserver::keeping_changes();

    let report = h.sync().await;

    match &report.outcome {
        SyncOutcome::Failed(Error::RebaseConflict { files, aborted, kept }) => {
            assert_eq!(files, &vec!["src/lib.rs".to_string()]);
            assert!(!aborted);
            assert!(kept.as_deref().is_some_and(|k| k.starts_with("stash 0123456789")));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.preserver.restores.load(Ordering::SeqCst), 1);

    let notifications = h.notifier.notifications();
    assert_eq!(notifications[0].id, NotificationId::RebaseConflict);
    assert!(notifications[0].message.contains("git rebase --continue"));
    assert!(notifications[0]
        .message
        .contains("Your local changes are saved in stash 0123456789"));
}

#[tokio::test]
async fn test_resolved_conflicts_are_partial_success() {
    let repo = FakeRepo::new("conflict-resolved", ORIGIN_URL);
    repo.script(
        "git rebase upstream/main",
        Script::fail(&["CONFLICT (content): Merge conflict in src/lib.rs"]),
    );
    let mut h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));
    h.conflicts = Some(Arc::new(FixedConflictResult(UpdateResult::SuccessWithResolvedConflicts)));

    let report = h.sync().await;

    assert!(matches!(report.outcome, SyncOutcome::SuccessWithResolvedConflicts));
    assert_eq!(report.final_state(), SyncState::PartiallySucceeded);
    assert_eq!(h.notifier.notifications()[0].severity, Severity::Info);
}

#[tokio::test]
async fn test_fetch_failure_stops_before_rebase() {
    let repo = FakeRepo::new("fetch-failure", ORIGIN_URL);
    repo.script(
        "git fetch --progress upstream",
        Script::fail(&["fatal: unable to access 'https://gitee.com/acme/lib.git/'"]),
    );
    let mut h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));
    h.preserver = CountingPreserver::with_changes();

    let report = h.sync().await;

    assert!(matches!(
        report.outcome,
        SyncOutcome::Failed(Error::FetchFailed { ref remote, .. }) if remote == "upstream"
    ));
    assert!(!report.states.contains(&SyncState::Rebasing));
    assert!(!h.repo.ran("git rebase upstream/main"));
    assert_eq!(h.preserver.saves.load(Ordering::SeqCst), 0);
    assert_eq!(h.notifier.notifications()[0].id, NotificationId::FetchFailed);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_during_rebase_aborts_and_restores() {
    let repo = FakeRepo::new("cancel-rebase", ORIGIN_URL);
    repo.script("git rebase upstream/main", Script::Cancel);
    let mut h = Harness::new(repo, FakeTransport::new().respond("me/lib", fork_of_acme()));
    h.preserver = CountingPreserver::with_changes();

    let report = h.sync().await;

    assert!(matches!(report.outcome, SyncOutcome::Failed(Error::Cancelled)));
    assert_eq!(report.final_state(), SyncState::Failed);
    assert!(h.repo.ran("git rebase --abort"));
    assert_eq!(h.preserver.restores.load(Ordering::SeqCst), 1);

    let notifications = h.notifier.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].id, NotificationId::Cancelled);
}

#[tokio::test]
async fn test_cancel_before_start_touches_nothing() {
    let h = Harness::new(
        FakeRepo::new("cancel-early", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", fork_of_acme()),
    );
    let token = CancellationToken::new();
    token.cancel();

    let report = h.forksync().sync(&h.workspace(), &Progress::new(token)).await;

    assert!(matches!(report.outcome, SyncOutcome::Failed(Error::Cancelled)));
    assert_eq!(h.transport.request_count(), 0);
    assert!(h.repo.commands().is_empty());
}

// =============================================================================
// Pre-flight
// =============================================================================

#[tokio::test]
async fn test_multiple_repositories_rejected() {
    let a = FakeRepo::new("multi-a", ORIGIN_URL);
    let b = FakeRepo::new("multi-b", ORIGIN_URL);
    let h = Harness::new(a.clone(), FakeTransport::new().respond("me/lib", fork_of_acme()));
    let workspace = Workspace::new("/forksync-tests", vec![a.clone() as Arc<dyn LocalRepository>, b.clone()]);

    let report = h.forksync().sync(&workspace, &Progress::default()).await;

    assert!(matches!(
        report.outcome,
        SyncOutcome::Failed(Error::MultipleRepositories { count: 2 })
    ));
    assert_eq!(report.states, vec![SyncState::Idle, SyncState::Failed]);
    assert!(a.commands().is_empty() && b.commands().is_empty());
    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(
        h.notifier.notifications()[0].id,
        NotificationId::MultiRepoNotSupported
    );
}

#[tokio::test]
async fn test_origin_on_unknown_server_rejected() {
    let h = Harness::new(
        FakeRepo::new("unknown-origin", "https://example.org/me/lib.git"),
        FakeTransport::new(),
    );

    let report = h.sync().await;

    assert!(matches!(report.outcome, SyncOutcome::Failed(Error::OriginNotFound)));
    assert_eq!(
        h.notifier.notifications()[0].id,
        NotificationId::RemoteOriginNotFound
    );
    assert_eq!(h.accounts.token_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_declined_token_aborts_silently() {
    let mut h = Harness::new(
        FakeRepo::new("declined-token", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", fork_of_acme()),
    );
    h.accounts = Arc::new(FakeAccounts {
        token: None,
        ..FakeAccounts::one()
    });

    let report = h.sync().await;

    assert!(matches!(report.outcome, SyncOutcome::Aborted));
    assert_eq!(report.states, vec![SyncState::Idle]);
    assert!(h.notifier.notifications().is_empty());
    assert_eq!(h.transport.request_count(), 0);
    assert!(h.repo.commands().is_empty());
}

#[tokio::test]
async fn test_account_selection() {
    let two_accounts = || FakeAccounts {
        accounts: vec![
            Account::new("me", ServerPath::gitee()),
            Account::new("work", ServerPath::gitee()),
        ],
        ..FakeAccounts::one()
    };

    // Several accounts and no choice made
    let mut h = Harness::new(
        FakeRepo::new("accounts-undecided", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", fork_of_acme()),
    );
    h.accounts = Arc::new(two_accounts());
    let report = h.sync().await;
    assert!(matches!(report.outcome, SyncOutcome::Failed(Error::NoSuitableAccount { .. })));
    assert_eq!(h.notifier.notifications()[0].id, NotificationId::AccountNotFound);

    // Several accounts, one chosen
    let mut h = Harness::new(
        FakeRepo::new("accounts-chosen", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", fork_of_acme()),
    );
    h.accounts = Arc::new(FakeAccounts {
        chosen: Some(1),
        ..two_accounts()
    });
    assert!(h.sync().await.outcome.is_success());

    // No account at all
    let mut h = Harness::new(
        FakeRepo::new("accounts-none", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", fork_of_acme()),
    );
    h.accounts = Arc::new(FakeAccounts {
        accounts: Vec::new(),
        ..FakeAccounts::one()
    });
    let report = h.sync().await;
    assert!(matches!(report.outcome, SyncOutcome::Failed(Error::NoSuitableAccount { .. })));
}

#[tokio::test]
async fn test_concurrent_sync_of_same_repository_rejected() {
    let h = Harness::new(
        FakeRepo::new("single-flight", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", fork_of_acme()),
    );
    let guard = FlightGuard::acquire(h.repo.root()).unwrap();

    let report = h.sync().await;
    assert!(matches!(report.outcome, SyncOutcome::Failed(Error::SyncInProgress { .. })));
    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(h.notifier.notifications()[0].id, NotificationId::SyncInProgress);

    drop(guard);
    assert!(h.sync().await.outcome.is_success());
}

// =============================================================================
// Hosting API failures
// =============================================================================

#[tokio::test]
async fn test_rate_limit_reported_as_transport_error() {
    let h = Harness::new(
        FakeRepo::new("rate-limited", ORIGIN_URL),
        FakeTransport::new().respond(
            "me/lib",
            ApiResponse::json(403, r#"{"message":"API rate limit exceeded"}"#),
        ),
    );

    let report = h.sync().await;

    let error = report.outcome.error().unwrap();
    assert!(error.is_retryable());
    let notifications = h.notifier.notifications();
    assert_eq!(notifications[0].id, NotificationId::CannotLoadRepoInfo);
    assert_eq!(notifications[0].title, "Can't load repository info");
    assert!(notifications[0].message.ends_with("Try again later"));
}

#[tokio::test]
async fn test_missing_repository() {
    let h = Harness::new(FakeRepo::new("missing-repo", ORIGIN_URL), FakeTransport::new());

    let report = h.sync().await;

    assert!(matches!(report.outcome, SyncOutcome::Failed(Error::RepoNotFound { .. })));
    assert_eq!(h.notifier.notifications()[0].id, NotificationId::RepoNotFound);
}

#[tokio::test]
async fn test_resolve_parent_is_read_only() {
    let h = Harness::new(
        FakeRepo::new("resolve-parent", ORIGIN_URL),
        FakeTransport::new().respond("me/lib", fork_of_acme()),
    );

    let parent = h
        .forksync()
        .resolve_parent(&h.workspace(), &Progress::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(parent.path, RepositoryPath::new("acme", "lib").unwrap());
    assert_eq!(parent.default_branch, "main");
    assert_eq!(h.repo.added_remotes.load(Ordering::SeqCst), 0);
    assert!(h.repo.commands().is_empty());
    assert!(h.notifier.notifications().is_empty());
}
