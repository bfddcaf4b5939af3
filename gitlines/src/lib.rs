//! gitlines - streaming classifiers for git command output
//!
//! Git reports most failure modes only as human-readable text. The listeners
//! in this crate watch a command's output one line at a time while it runs and
//! expose a verdict once the command has finished.
//!
//! # Recognised output
//!
//! ```text
//! CONFLICT (content): Merge conflict in src/lib.rs
//! error: could not apply 1a2b3c4... Add feature
//!     -> RebaseProblemDetector::is_merge_conflict()
//!
//! error: The following untracked working tree files would be overwritten by checkout:
//!         config.yml
//! Please move or remove them before you switch branches.
//!     -> UntrackedFilesOverwrittenDetector::relative_file_paths()
//!
//! error: Your local changes to the following files would be overwritten by checkout:
//!         src/main.rs
//! Please commit your changes or stash them before you switch branches.
//!     -> LocalChangesOverwrittenDetector::relative_file_paths()
//!
//! Current branch main is up to date.
//!     -> UpToDateDetector::is_up_to_date()
//!
//! Receiving objects:  45% (9/20)
//!     -> ProgressAnalyzer fraction callback
//! ```
//!
//! Every listener sees every line. None of them assume an ordering relative
//! to the others, and none of them fail on input they do not recognise.

mod detector;
mod progress;

pub use detector::{
    LocalChangesOverwrittenDetector, Operation, RebaseProblemDetector, UntrackedFilesOverwrittenDetector,
    UpToDateDetector,
};
pub use progress::ProgressAnalyzer;

/// Which stream of the child process a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives the output of a running git command line by line
pub trait LineListener {
    /// Called for every complete line, without its terminator
    fn on_line(&mut self, line: &str, stream: OutputStream);

    /// Called once after the process exited
    fn on_finished(&mut self, _exit_code: Option<i32>) {}
}

/// Feed a raw chunk of output to a set of listeners.
///
/// Git redraws progress with carriage returns, so a single `\n`-terminated
/// line may hold several updates. Each `\r`-separated segment is dispatched
/// on its own; empty segments are skipped.
pub fn dispatch(raw: &str, stream: OutputStream, listeners: &mut [&mut (dyn LineListener + Send)]) {
    for segment in raw.split(['\r', '\n']) {
        if segment.trim().is_empty() {
            continue;
        }
        for listener in listeners.iter_mut() {
            listener.on_line(segment, stream);
        }
    }
}

/// Notify every listener that the process exited
pub fn finish(exit_code: Option<i32>, listeners: &mut [&mut (dyn LineListener + Send)]) {
    for listener in listeners.iter_mut() {
        listener.on_finished(exit_code);
    }
}
