//! Sync Engine - Reconciles the local mirror with the discovered inventory
//!
//! Repositories are processed one at a time: a missing directory is cloned,
//! an existing one is pulled. The emptiness guard runs after every clone and
//! before every pull. A failure of one repository is recorded as
//! [`MirrorOutcome::Failed`] and never stops the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::classify::classify_output;
use crate::discovery::{Inventory, RepositoryRef};
use crate::error::MirrorError;
use crate::git::{GitExecutor, GitOutput};
use crate::guard;
use crate::report::{MirrorOutcome, MirrorReport};

/// Drives clone/pull decisions for every repository of an inventory
#[derive(Clone)]
pub struct SyncEngine {
    executor: Arc<dyn GitExecutor>,
    target_root: PathBuf,
}

impl SyncEngine {
    /// Create a new sync engine writing below `target_root`
    pub fn new(executor: Arc<dyn GitExecutor>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            target_root: target_root.into(),
        }
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Reconcile every inventory entry in order and fold the outcomes
    pub async fn run(&self, inventory: &Inventory) -> MirrorReport {
        let start_time = Instant::now();
        let total = inventory.len();
        let mut report = MirrorReport::for_inventory(inventory);

        info!(
            "Mirroring {} repositories into {}",
            total,
            self.target_root.display()
        );

        for (index, repo) in inventory.iter().enumerate() {
            debug!("[{}/{}] {}", index + 1, total, repo.relative_path);
            let outcome = self.reconcile(repo).await;
            debug!("{}: {}", repo.relative_path, outcome.label());
            report.record(&repo.relative_path, &outcome);
        }

        report.duration = start_time.elapsed();

        info!(
            "Mirror completed in {:.2}s: {} new, {} updated, {} up to date, {} empty, {} failed",
            report.duration.as_secs_f64(),
            report.new_count,
            report.update_count,
            report.uptodate_count,
            report.empty_count,
            report.failed_count
        );

        if report.accounted() < report.project_count {
            warn!(
                "{} of {} repositories are not mirrored",
                report.project_count - report.accounted(),
                report.project_count
            );
        }

        report
    }

    /// Bring one repository in line with upstream
    pub async fn reconcile(&self, repo: &RepositoryRef) -> MirrorOutcome {
        let path = self.target_root.join(&repo.relative_path);

        let exists = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);

        if exists {
            self.update(repo, &path).await
        } else {
            self.copy(repo, &path).await
        }
    }

    async fn copy(&self, repo: &RepositoryRef, path: &Path) -> MirrorOutcome {
        info!("Cloning {} -> {}", repo.remote_address, repo.relative_path);

        let output = match self
            .executor
            .clone_repository(&repo.remote_address, path)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                guard::remove_best_effort(path).await;
                return failed(repo, format!("{:#}", e));
            }
        };

        classify_output(&repo.relative_path, &output);

        if !output.success() {
            guard::remove_best_effort(path).await;
            return failed(repo, exit_reason("clone", &output));
        }

        if guard::reclaim_if_empty(&self.target_root, &repo.relative_path).await {
            return MirrorOutcome::Empty;
        }

        MirrorOutcome::New
    }

    async fn update(&self, repo: &RepositoryRef, path: &Path) -> MirrorOutcome {
        // A degenerate copy is reclaimed without pulling into it this run
        if guard::reclaim_if_empty(&self.target_root, &repo.relative_path).await {
            return MirrorOutcome::Empty;
        }

        debug!("Pulling {}", repo.relative_path);

        let output = match self.executor.pull(path).await {
            Ok(output) => output,
            Err(e) => return failed(repo, format!("{:#}", e)),
        };

        let classification = classify_output(&repo.relative_path, &output);

        if !output.success() {
            return failed(repo, exit_reason("pull", &output));
        }

        if classification.is_unrecognized() {
            return failed(repo, "unrecognized git pull output".to_string());
        }

        if classification.is_updated() {
            info!("Updated {}", repo.relative_path);
            MirrorOutcome::Updated
        } else {
            MirrorOutcome::UpToDate
        }
    }
}

/// Make sure the mirror root exists and is a directory
pub fn ensure_output_directory(path: &Path) -> Result<(), MirrorError> {
    if path.exists() && !path.is_dir() {
        return Err(MirrorError::InvalidOutputDirectory {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    std::fs::create_dir_all(path).map_err(|e| MirrorError::InvalidOutputDirectory {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn failed(repo: &RepositoryRef, reason: String) -> MirrorOutcome {
    error!("{}: {}", repo.relative_path, reason);
    MirrorOutcome::Failed { reason }
}

fn exit_reason(operation: &str, output: &GitOutput) -> String {
    match output.exit_code {
        Some(code) => format!("git {} exited with status {}", operation, code),
        None => format!("git {} was terminated by a signal", operation),
    }
}
