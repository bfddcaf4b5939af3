//! Progress parsing for fetch/rebase output

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{LineListener, OutputStream};

static PROGRESS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:remote: )?([A-Za-z ]+):\s+(\d{1,3})% \((\d+)/(\d+)\)").unwrap());

/// Phases git reports, with their share of the whole operation
const PHASES: &[(&str, f64)] = &[
    ("Counting objects", 0.05),
    ("Compressing objects", 0.10),
    ("Receiving objects", 0.50),
    ("Resolving deltas", 0.35),
];

/// Turns git's `Phase: NN% (a/b)` lines into an overall fraction
pub struct ProgressAnalyzer {
    on_fraction: Box<dyn FnMut(f64) + Send>,
    last: f64,
}

impl ProgressAnalyzer {
    pub fn new(on_fraction: impl FnMut(f64) + Send + 'static) -> Self {
        Self {
            on_fraction: Box::new(on_fraction),
            last: 0.0,
        }
    }

    /// Overall fraction for `percent` of the named phase, if the phase is known
    pub fn fraction_for(phase: &str, percent: u32) -> Option<f64> {
        let index = PHASES.iter().position(|(name, _)| *name == phase)?;
        let done: f64 = PHASES[..index].iter().map(|(_, weight)| weight).sum();
        let current = PHASES[index].1 * f64::from(percent.min(100)) / 100.0;
        Some(done + current)
    }
}

impl LineListener for ProgressAnalyzer {
    fn on_line(&mut self, line: &str, _stream: OutputStream) {
        let Some(caps) = PROGRESS_LINE.captures(line.trim_start()) else {
            return;
        };
        let Ok(percent) = caps[2].parse::<u32>() else {
            return;
        };
        if let Some(fraction) = Self::fraction_for(caps[1].trim(), percent) {
            // Phases can restart (e.g. remote counting then local receiving); never go backwards.
            if fraction > self.last {
                self.last = fraction;
                (self.on_fraction)(fraction);
            }
        }
    }

    fn on_finished(&mut self, exit_code: Option<i32>) {
        if exit_code == Some(0) && self.last < 1.0 {
            self.last = 1.0;
            (self.on_fraction)(1.0);
        }
    }
}
