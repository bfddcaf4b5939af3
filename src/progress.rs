//! Progress reporting and cancellation
//!
//! A [`Progress`] is threaded through every step of a sync. It carries the
//! [`CancellationToken`] that HTTP requests and git subprocesses race against,
//! and forwards status text and fractions to an optional reporter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A token that can be used to check if an operation has been cancelled
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the operation and wake everything waiting on [`cancelled`](Self::cancelled)
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if the operation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// `Err(Error::Cancelled)` once the token is cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Receives progress updates, e.g. to drive a progress bar
pub trait ProgressReporter: Send + Sync {
    fn text(&self, _text: &str) {}
    fn fraction(&self, _fraction: f64) {}
}

/// Progress of one sync invocation
#[derive(Clone, Default)]
pub struct Progress {
    token: CancellationToken,
    reporter: Option<Arc<dyn ProgressReporter>>,
    last_text: Arc<Mutex<String>>,
}

impl Progress {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn check_cancelled(&self) -> Result<()> {
        self.token.check()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        if let Some(reporter) = &self.reporter {
            reporter.text(&text);
        }
        if let Ok(mut last) = self.last_text.lock() {
            *last = text;
        }
    }

    /// Most recent status text
    pub fn text(&self) -> String {
        self.last_text.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn set_fraction(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        debug!(fraction, "progress");
        if let Some(reporter) = &self.reporter {
            reporter.fraction(fraction);
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("token", &self.token)
            .field("text", &self.text())
            .finish()
    }
}
