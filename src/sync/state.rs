//! Sync state machine
//!
//! ```text
//! Idle → ResolvingParent → ConfiguringRemote → Fetching → Rebasing
//!                                                            │
//!                                  Succeeded / PartiallySucceeded
//! any non-terminal state ──────────────────────────────────▶ Failed
//! ```
//!
//! Transitions only move forward and a state is never entered twice.

use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Idle,
    ResolvingParent,
    ConfiguringRemote,
    Fetching,
    Rebasing,
    Succeeded,
    /// Finished, but only after conflicts were resolved along the way
    PartiallySucceeded,
    Failed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Succeeded | SyncState::PartiallySucceeded | SyncState::Failed)
    }

    fn step(&self) -> u8 {
        match self {
            SyncState::Idle => 0,
            SyncState::ResolvingParent => 1,
            SyncState::ConfiguringRemote => 2,
            SyncState::Fetching => 3,
            SyncState::Rebasing => 4,
            SyncState::Succeeded | SyncState::PartiallySucceeded | SyncState::Failed => 5,
        }
    }

    /// Whether `next` may directly follow `self`
    pub fn can_advance_to(&self, next: SyncState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SyncState::Failed => true,
            SyncState::Succeeded | SyncState::PartiallySucceeded => *self == SyncState::Rebasing,
            _ => next.step() == self.step() + 1,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Idle => "idle",
            SyncState::ResolvingParent => "resolving parent",
            SyncState::ConfiguringRemote => "configuring remote",
            SyncState::Fetching => "fetching",
            SyncState::Rebasing => "rebasing",
            SyncState::Succeeded => "succeeded",
            SyncState::PartiallySucceeded => "partially succeeded",
            SyncState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current state plus every state visited so far
#[derive(Debug, Clone)]
pub struct StateMachine {
    history: Vec<SyncState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            history: vec![SyncState::Idle],
        }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> SyncState {
        self.history.last().copied().unwrap_or(SyncState::Idle)
    }

    pub fn history(&self) -> &[SyncState] {
        &self.history
    }

    /// Move to `next`; returns false and stays put if the transition is not allowed
    pub fn advance(&mut self, next: SyncState) -> bool {
        let current = self.current();
        if !current.can_advance_to(next) {
            debug!(from = %current, to = %next, "Ignoring invalid state transition");
            return false;
        }
        debug!(from = %current, to = %next, "Sync state");
        self.history.push(next);
        true
    }

    pub fn into_history(self) -> Vec<SyncState> {
        self.history
    }
}
