//! Failure detectors for rebase output

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{LineListener, OutputStream};

// =============================================================================
// Rebase conflicts
// =============================================================================

const REBASE_CONFLICT_INDICATORS: &[&str] = &[
    "Merge conflict in",
    "hint: after resolving the conflicts, mark the corrected paths",
    "Patch failed at",
    "It seems that there is already a rebase-merge directory",
    "could not apply",
];

const REBASE_NO_CHANGE_INDICATOR: &str = "No changes - did you forget to use 'git add'?";

/// Detects merge conflicts and "no changes" stops during a rebase
#[derive(Debug, Default)]
pub struct RebaseProblemDetector {
    merge_conflict: bool,
    no_change: bool,
}

impl RebaseProblemDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any line looked like a conflict stop
    pub fn is_merge_conflict(&self) -> bool {
        self.merge_conflict
    }

    /// True if git stopped because a commit became empty
    pub fn is_no_change_error(&self) -> bool {
        self.no_change
    }
}

impl LineListener for RebaseProblemDetector {
    fn on_line(&mut self, line: &str, _stream: OutputStream) {
        if REBASE_CONFLICT_INDICATORS.iter().any(|marker| line.contains(marker)) {
            self.merge_conflict = true;
        }
        if line.contains(REBASE_NO_CHANGE_INDICATOR) {
            self.no_change = true;
        }
    }
}

// =============================================================================
// Shared file-list collection
// =============================================================================

/// Collects the indented file list that follows a git error header
#[derive(Debug, Default)]
struct FileListCollector {
    detected: bool,
    collecting: bool,
    files: Vec<String>,
}

impl FileListCollector {
    fn start(&mut self) {
        self.detected = true;
        self.collecting = true;
    }

    fn stop(&mut self) {
        self.collecting = false;
    }

    fn push(&mut self, file: &str) {
        let file = file.trim();
        if !file.is_empty() && !self.files.iter().any(|f| f == file) {
            self.files.push(file.to_string());
        }
    }

    /// Handle a line while inside a file list. Returns false once the list ended.
    fn collect(&mut self, line: &str, terminators: &[&str]) -> bool {
        if terminators.iter().any(|t| line.contains(t)) {
            self.stop();
            return false;
        }
        // Listed files are indented; anything else ends the block.
        if line.starts_with('\t') || line.starts_with("  ") {
            self.push(line);
            true
        } else {
            self.stop();
            false
        }
    }
}

// =============================================================================
// Untracked files would be overwritten
// =============================================================================

static UNTRACKED_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"The following untracked working tree files would be (overwritten|removed) by").unwrap()
});

static UNTRACKED_LEGACY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Untracked working tree file '(.+)' would be (overwritten|removed) by").unwrap()
});

const UNTRACKED_TERMINATORS: &[&str] = &["Please move or remove them before you", "Aborting"];

/// Detects "untracked working tree files would be overwritten" failures
#[derive(Debug, Default)]
pub struct UntrackedFilesOverwrittenDetector {
    inner: FileListCollector,
}

impl UntrackedFilesOverwrittenDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_message_detected(&self) -> bool {
        self.inner.detected
    }

    /// Offending files, relative to the working tree root, without duplicates
    pub fn relative_file_paths(&self) -> &[String] {
        &self.inner.files
    }
}

impl LineListener for UntrackedFilesOverwrittenDetector {
    fn on_line(&mut self, line: &str, _stream: OutputStream) {
        if self.inner.collecting && self.inner.collect(line, UNTRACKED_TERMINATORS) {
            return;
        }
        if UNTRACKED_HEADER.is_match(line) {
            self.inner.start();
        } else if let Some(caps) = UNTRACKED_LEGACY.captures(line) {
            self.inner.detected = true;
            self.inner.push(&caps[1]);
        }
    }
}

// =============================================================================
// Local changes would be overwritten
// =============================================================================

/// The git operation whose overwrite warning should be recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Checkout,
    Merge,
    Reset,
}

impl Operation {
    fn verb(self) -> &'static str {
        match self {
            Operation::Checkout => "checkout",
            Operation::Merge => "merge",
            Operation::Reset => "reset",
        }
    }
}

static LOCAL_CHANGES_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Your local changes to the following files would be overwritten by (\w+)").unwrap()
});

static LOCAL_CHANGES_SINGLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Your local changes to '(.+)' would be overwritten by (\w+)").unwrap()
});

static ENTRY_NOT_UPTODATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Entry '(.+)' not uptodate\. Cannot merge").unwrap());

static ENTRY_WOULD_BE_OVERWRITTEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Entry '(.+)' would be overwritten by (\w+)").unwrap());

const LOCAL_CHANGES_TERMINATORS: &[&str] = &[
    "Please commit your changes or stash them before you",
    "Please, commit your changes or stash them before you",
    "Aborting",
];

/// Detects "your local changes would be overwritten" failures for one operation
#[derive(Debug)]
pub struct LocalChangesOverwrittenDetector {
    operation: Operation,
    inner: FileListCollector,
}

impl LocalChangesOverwrittenDetector {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            inner: FileListCollector::default(),
        }
    }

    pub fn was_message_detected(&self) -> bool {
        self.inner.detected
    }

    pub fn relative_file_paths(&self) -> &[String] {
        &self.inner.files
    }

    fn matches_operation(&self, verb: &str) -> bool {
        verb == self.operation.verb()
    }
}

impl LineListener for LocalChangesOverwrittenDetector {
    fn on_line(&mut self, line: &str, _stream: OutputStream) {
        if self.inner.collecting && self.inner.collect(line, LOCAL_CHANGES_TERMINATORS) {
            return;
        }

        if let Some(caps) = LOCAL_CHANGES_HEADER.captures(line) {
            if self.matches_operation(&caps[1]) {
                self.inner.start();
            }
        } else if let Some(caps) = LOCAL_CHANGES_SINGLE.captures(line) {
            if self.matches_operation(&caps[2]) {
                self.inner.detected = true;
                self.inner.push(&caps[1]);
            }
        } else if let Some(caps) = ENTRY_WOULD_BE_OVERWRITTEN.captures(line) {
            if self.matches_operation(&caps[2]) {
                self.inner.detected = true;
                self.inner.push(&caps[1]);
            }
        } else if let Some(caps) = ENTRY_NOT_UPTODATE.captures(line) {
            if self.operation != Operation::Checkout {
                self.inner.detected = true;
                self.inner.push(&caps[1]);
            }
        }
    }
}

// =============================================================================
// Nothing to do
// =============================================================================

static UP_TO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Current branch .+ is up to date\.?$").unwrap());

/// Detects a rebase that had nothing to replay
#[derive(Debug, Default)]
pub struct UpToDateDetector {
    up_to_date: bool,
}

impl UpToDateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.up_to_date
    }
}

impl LineListener for UpToDateDetector {
    fn on_line(&mut self, line: &str, _stream: OutputStream) {
        if UP_TO_DATE.is_match(line.trim()) {
            self.up_to_date = true;
        }
    }
}
