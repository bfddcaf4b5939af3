//! One sync per repository at a time

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

static IN_FLIGHT: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Marks a repository as being synced until dropped
#[derive(Debug)]
pub struct FlightGuard {
    root: PathBuf,
}

impl FlightGuard {
    /// Fails with [`Error::SyncInProgress`] if a sync of `root` is already running
    pub fn acquire(root: &Path) -> Result<Self> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let mut in_flight = IN_FLIGHT.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(root.clone()) {
            return Err(Error::SyncInProgress { root });
        }
        debug!(root = %root.display(), "Acquired sync guard");
        Ok(Self { root })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut in_flight = IN_FLIGHT.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.root);
    }
}
