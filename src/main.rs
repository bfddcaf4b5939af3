//! forksync CLI - sync a Gitee/GitHub fork with its parent

use anyhow::Context;
use clap::{Parser, Subcommand};
use forksync::git::{ConflictAction, SaveChangesPolicy};
use forksync::hosting::remote_url::repository_on_server;
use forksync::hosting::{ConfigAccountStore, HttpTransport};
use forksync::notify::ConsoleNotifier;
use forksync::progress::ProgressReporter;
use forksync::{CancellationToken, Config, ForkSync, Progress, SyncOutcome, SyncSettings, Workspace};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forksync")]
#[command(about = "Keep a Gitee/GitHub fork in sync with its parent repository", long_about = None)]
struct Cli {
    /// Workspace directory (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebase the current branch onto the parent's default branch
    Sync {
        /// Name of the configured account to use
        #[arg(long)]
        account: Option<String>,

        /// How to put uncommitted changes aside: stash or shelve
        #[arg(long)]
        policy: Option<SaveChangesPolicy>,

        /// What to do when the rebase stops on conflicts: leave or abort
        #[arg(long)]
        on_conflict: Option<ConflictAction>,

        /// Add the parent remote with an SSH URL
        #[arg(long)]
        ssh: bool,
    },

    /// Show the parent repository of the fork
    Parent {
        #[arg(long)]
        account: Option<String>,
    },

    /// List remotes and the repositories they point at
    Remotes,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "forksync=warn",
        1 => "forksync=info",
        2 => "forksync=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let (mut config, config_path) =
        Config::load(cli.config.as_deref(), &cli.workspace).context("Failed to load configuration")?;
    if let Some(path) = &config_path {
        tracing::info!("Using config {}", path.display());
    }

    match cli.command {
        Commands::Sync {
            account,
            policy,
            on_conflict,
            ssh,
        } => {
            if let Some(policy) = policy {
                config.save_changes_policy = policy;
            }
            if let Some(action) = on_conflict {
                config.on_conflict = action;
            }
            config.clone_using_ssh |= ssh;
            sync_fork(&cli.workspace, &config, account).await
        }
        Commands::Parent { account } => show_parent(&cli.workspace, &config, account).await,
        Commands::Remotes => list_remotes(&cli.workspace, &config).await,
    }
}

fn build(config: &Config, account: Option<String>) -> anyhow::Result<ForkSync> {
    let accounts = ConfigAccountStore::new(config.accounts.clone()).with_preferred(account);
    let transport = HttpTransport::new(config.connection_timeout()).context("Failed to create HTTP client")?;
    Ok(ForkSync::new(
        Arc::new(accounts),
        Arc::new(transport),
        Arc::new(ConsoleNotifier),
        SyncSettings::from(config),
    ))
}

/// Prints step text and fetch progress in 10% steps to stderr
#[derive(Default)]
struct ConsoleProgress {
    last_step: Mutex<Option<u8>>,
}

impl ProgressReporter for ConsoleProgress {
    fn text(&self, text: &str) {
        if let Ok(mut last) = self.last_step.lock() {
            *last = None;
        }
        eprintln!("{text}");
    }

    fn fraction(&self, fraction: f64) {
        let step = (fraction * 10.0).floor() as u8;
        let Ok(mut last) = self.last_step.lock() else {
            return;
        };
        if last.map_or(true, |prev| step > prev) {
            *last = Some(step);
            eprintln!("  {:>3}%", u32::from(step) * 10);
        }
    }
}

/// Progress whose token is cancelled on Ctrl-C
fn cancellable_progress() -> Progress {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            on_signal.cancel();
        }
    });
    Progress::new(token).with_reporter(Arc::new(ConsoleProgress::default()))
}

async fn sync_fork(path: &Path, config: &Config, account: Option<String>) -> anyhow::Result<bool> {
    let workspace = Workspace::discover(path, config.workspace_scan_depth, &config.git_executable)?;
    let forksync = build(config, account)?;

    let report = forksync.sync(&workspace, &cancellable_progress()).await;
    tracing::debug!(states = ?report.states, "Sync finished");

    // Declining to log in is not a failure
    Ok(report.outcome.is_success() || matches!(report.outcome, SyncOutcome::Aborted))
}

async fn show_parent(path: &Path, config: &Config, account: Option<String>) -> anyhow::Result<bool> {
    let workspace = Workspace::discover(path, config.workspace_scan_depth, &config.git_executable)?;
    let forksync = build(config, account)?;

    match forksync.resolve_parent(&workspace, &cancellable_progress()).await? {
        Some(parent) => {
            println!("{}", parent.path);
            println!("  default branch: {}", parent.default_branch);
            println!("  url:            {}", parent.html_url);
            Ok(true)
        }
        None => {
            println!("No token provided.");
            Ok(false)
        }
    }
}

async fn list_remotes(path: &Path, config: &Config) -> anyhow::Result<bool> {
    let workspace = Workspace::discover(path, config.workspace_scan_depth, &config.git_executable)?;
    let servers = config.known_servers();

    for repo in workspace.repositories() {
        match repo.current_branch().await? {
            Some(branch) => println!("{} (on {})", repo.root().display(), branch),
            None => println!("{} (detached HEAD)", repo.root().display()),
        }
        let remotes = repo.remotes().await?;
        if remotes.is_empty() {
            println!("  (no remotes)");
        }
        for remote in remotes {
            let url = remote.first_url().unwrap_or("");
            let target = servers
                .iter()
                .find_map(|server| repository_on_server(server, url).map(|path| format!("{path} on {server}")));
            match target {
                Some(target) => println!("  {:<12} {}  ({})", remote.name, url, target),
                None => println!("  {:<12} {}", remote.name, url),
            }
        }
    }
    Ok(true)
}
