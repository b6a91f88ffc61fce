//! Emptiness guard for mirrored working copies
//!
//! A working copy whose only entry is the git metadata directory mirrors an
//! upstream repository without commits. Such directories are removed so they
//! do not pile up in the backup; the next run clones them again.
//!
//! Removal is best-effort: failures are logged and swallowed, never returned.

use std::io;
use std::path::Path;
use tracing::{debug, warn};

use crate::git::GIT_METADATA_DIR;

/// What the guard found at a mirror location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emptiness {
    /// Holds content besides the git metadata
    Populated,
    /// Holds nothing but the git metadata
    MetadataOnly,
    /// Could not be listed (missing, vanished, not a directory)
    Unreadable,
}

impl Emptiness {
    /// Whether the location counts as empty and gets reclaimed
    pub fn is_empty(self) -> bool {
        !matches!(self, Emptiness::Populated)
    }
}

/// Inspect `target_root/relative_path` without touching it
pub async fn inspect(target_root: &Path, relative_path: &str) -> Emptiness {
    let path = target_root.join(relative_path);

    match list_entries(&path).await {
        Ok(entries) if entries.len() == 1 && entries[0] == GIT_METADATA_DIR => {
            Emptiness::MetadataOnly
        }
        Ok(_) => Emptiness::Populated,
        Err(e) => {
            debug!("Cannot list {}: {}", path.display(), e);
            Emptiness::Unreadable
        }
    }
}

/// Check `target_root/relative_path` and remove it if it is empty
///
/// Returns `true` when the location was empty (whether or not the removal
/// itself succeeded).
pub async fn reclaim_if_empty(target_root: &Path, relative_path: &str) -> bool {
    let emptiness = inspect(target_root, relative_path).await;

    if emptiness.is_empty() {
        warn!(
            "Project {} is empty, deleting the folder for now",
            relative_path
        );
        remove_best_effort(&target_root.join(relative_path)).await;
        return true;
    }

    false
}

/// Recursively remove `path`, logging instead of propagating failures
pub async fn remove_best_effort(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!("Failed to remove {}: {}", path.display(), e),
    }
}

async fn list_entries(path: &Path) -> io::Result<Vec<String>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await?;

    while let Some(entry) = dir.next_entry().await? {
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }

    Ok(entries)
}
