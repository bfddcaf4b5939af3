//! forksync - keep a hosted fork in sync with its parent
//!
//! Resolves the parent of a Gitee/GitHub fork through the hosting API, makes
//! sure a local remote points at it, fetches it and rebases the current branch
//! onto the parent's default branch.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Sync Orchestrator                        │
//! │   Idle → ResolvingParent → ConfiguringRemote → Fetching →       │
//! │   Rebasing → {Succeeded, PartiallySucceeded, Failed}            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────────┐  ┌─────────────────────┐  │
//! │  │  Repository │  │     Remote      │  │  Preserve changes   │  │
//! │  │  Resolver   │  │  Configurator   │  │  (stash / shelve)   │  │
//! │  └──────┬──────┘  └────────┬────────┘  └──────────┬──────────┘  │
//! │         │                  │                      │             │
//! │         ▼                  ▼                      ▼             │
//! │  ┌─────────────┐  ┌─────────────────────────────────────────┐   │
//! │  │ Hosting API │  │          Local Repository               │   │
//! │  │   Client    │  │  git2 (remotes)  +  git CLI (fetch,     │   │
//! │  │  (reqwest)  │  │  rebase) ──lines──▶ gitlines detectors  │   │
//! │  └─────────────┘  └─────────────────────────────────────────┘   │
//! │                                                                 │
//! │  Accounts · Notifications · Progress/Cancellation · Config      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything the orchestrator talks to sits behind a trait so the whole
//! pipeline can run against in-memory fakes.

pub mod config;
pub mod error;
pub mod git;
pub mod hosting;
pub mod notify;
pub mod progress;
pub mod sync;
pub mod validation;
pub mod workspace;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use progress::{CancellationToken, Progress};
pub use sync::{ForkSync, SyncOutcome, SyncReport, SyncSettings, SyncState};
pub use workspace::Workspace;
