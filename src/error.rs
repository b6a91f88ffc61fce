//! Fatal error taxonomy for a mirror run
//!
//! Only errors that end the whole run live here. Failures of a single
//! repository never become a `MirrorError`; the reconciler turns them into
//! [`crate::report::MirrorOutcome::Failed`] and moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run before or during discovery
#[derive(Error, Debug)]
pub enum MirrorError {
    /// `--verbose` and `--quiet` were both given
    #[error("--verbose and --quiet cannot be used together")]
    ConflictingVerbosity,

    /// No root group and no personal projects requested
    #[error("nothing to do: pass at least one group id or --personal")]
    NothingToDo,

    /// The output directory exists but is not a directory, or cannot be created
    #[error("output directory {path:?} is not usable: {reason}")]
    InvalidOutputDirectory { path: PathBuf, reason: String },

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),

    /// The remote directory did not answer; the inventory is incomplete
    #[error("discovery failed for {scope}: {source:#}")]
    Discovery {
        scope: String,
        #[source]
        source: anyhow::Error,
    },
}

impl MirrorError {
    /// Process exit status reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MirrorError::ConflictingVerbosity => 2,
            MirrorError::NothingToDo => 3,
            MirrorError::InvalidOutputDirectory { .. } => 4,
            MirrorError::Config(_) => 5,
            MirrorError::Discovery { .. } => 6,
        }
    }
}
