//! Classification of git pull output
//!
//! Git has no machine-readable report for `pull`, so the outcome is read from
//! its human-readable output with the locale forced by the executor:
//!
//! - a stdout line containing `date` ("Already up to date.") counts as up to date
//! - a stderr line containing ` -> ` (a ref move such as `main -> origin/main`)
//!   counts as an update and cancels one up-to-date line, since the same pull
//!   may also print one
//!
//! Every non-blank line is logged against the repository name: stdout at
//! debug level, stderr at error level.

use tracing::{debug, error};

use crate::git::GitOutput;

const UP_TO_DATE_TOKEN: &str = "date";
const REF_MOVE_TOKEN: &str = " -> ";

/// Counter deltas produced by one git invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub uptodate_delta: u32,
    pub update_delta: u32,
}

impl Classification {
    /// At least one ref moved
    pub fn is_updated(&self) -> bool {
        self.update_delta > 0
    }

    /// Nothing moved and git said so
    pub fn is_up_to_date(&self) -> bool {
        self.update_delta == 0 && self.uptodate_delta > 0
    }

    /// Neither pattern matched
    pub fn is_unrecognized(&self) -> bool {
        self.update_delta == 0 && self.uptodate_delta == 0
    }
}

/// Classify one invocation's output and log every line against `name`
///
/// The up-to-date delta saturates at zero: a ref move without a matching
/// up-to-date line does not drive the counter negative.
pub fn classify(name: &str, stdout: &str, stderr: &str) -> Classification {
    let mut up_to_date_lines = 0u32;
    let mut ref_moves = 0u32;

    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        debug!("{}:  {}", name, line);
        if line.contains(UP_TO_DATE_TOKEN) {
            up_to_date_lines += 1;
        }
    }

    for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
        error!("{}:  {}", name, line);
        if line.contains(REF_MOVE_TOKEN) {
            ref_moves += 1;
        }
    }

    Classification {
        uptodate_delta: up_to_date_lines.saturating_sub(ref_moves),
        update_delta: ref_moves,
    }
}

/// Convenience wrapper over [`classify`] for captured executor output
pub fn classify_output(name: &str, output: &GitOutput) -> Classification {
    classify(name, &output.stdout, &output.stderr)
}
