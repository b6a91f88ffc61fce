//! Per-repository outcomes and the run-scoped report they fold into

use std::fmt;
use std::time::Duration;

use crate::discovery::Inventory;

/// Result of reconciling one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Cloned for the first time
    New,
    /// Pulled and at least one ref moved
    Updated,
    /// Pulled and nothing changed
    UpToDate,
    /// Upstream has no content; the local directory was reclaimed
    Empty,
    /// Clone or pull failed; the rest of the run is unaffected
    Failed { reason: String },
}

impl MirrorOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MirrorOutcome::New => "new",
            MirrorOutcome::Updated => "updated",
            MirrorOutcome::UpToDate => "up to date",
            MirrorOutcome::Empty => "empty",
            MirrorOutcome::Failed { .. } => "failed",
        }
    }
}

/// Totals of one mirror run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub project_count: usize,
    pub new_count: usize,
    pub update_count: usize,
    pub uptodate_count: usize,
    pub empty_count: usize,
    pub failed_count: usize,
    pub group_count: usize,
    pub subgroup_count: usize,
    pub duration: Duration,
    /// Relative path and reason of every failed repository
    pub failures: Vec<(String, String)>,
}

impl MirrorReport {
    /// Start a report carrying the discovery totals of `inventory`
    ///
    /// Repositories set aside for a clashing path count as failed up front.
    pub fn for_inventory(inventory: &Inventory) -> Self {
        let mut report = Self {
            group_count: inventory.group_count,
            subgroup_count: inventory.subgroup_count,
            ..Default::default()
        };

        for repo in &inventory.collisions {
            report.record(
                &repo.relative_path,
                &MirrorOutcome::Failed {
                    reason: format!(
                        "path already taken by another repository, {} not mirrored",
                        repo.remote_address
                    ),
                },
            );
        }

        report
    }

    /// Fold the outcome of one repository into the totals
    pub fn record(&mut self, relative_path: &str, outcome: &MirrorOutcome) {
        self.project_count += 1;
        match outcome {
            MirrorOutcome::New => self.new_count += 1,
            MirrorOutcome::Updated => self.update_count += 1,
            MirrorOutcome::UpToDate => self.uptodate_count += 1,
            MirrorOutcome::Empty => self.empty_count += 1,
            MirrorOutcome::Failed { reason } => {
                self.failed_count += 1;
                self.failures
                    .push((relative_path.to_string(), reason.clone()));
            }
        }
    }

    /// Repositories that ended in a non-failed state
    pub fn accounted(&self) -> usize {
        self.new_count + self.update_count + self.uptodate_count + self.empty_count
    }
}

impl fmt::Display for MirrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Done. Found {} projects in {} groups ({} subgroups).",
            self.project_count, self.group_count, self.subgroup_count
        )?;
        write!(
            f,
            "{} projects were new, {} got updated, {} were up to date, {} were empty projects, {} failed",
            self.new_count, self.update_count, self.uptodate_count, self.empty_count, self.failed_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::RepositoryRef;

    #[test]
    fn test_record_counts_each_outcome_once() {
        let mut report = MirrorReport::default();
        let outcomes = [
            ("a", MirrorOutcome::New),
            ("b", MirrorOutcome::Updated),
            ("c", MirrorOutcome::UpToDate),
            ("d", MirrorOutcome::UpToDate),
            ("e", MirrorOutcome::Empty),
            (
                "f",
                MirrorOutcome::Failed {
                    reason: "git pull exited with 1".to_string(),
                },
            ),
        ];

        for (path, outcome) in &outcomes {
            report.record(path, outcome);
        }

        assert_eq!(report.project_count, 6);
        assert_eq!(report.new_count, 1);
        assert_eq!(report.update_count, 1);
        assert_eq!(report.uptodate_count, 2);
        assert_eq!(report.empty_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.accounted() + report.failed_count, report.project_count);
        assert_eq!(
            report.failures,
            vec![("f".to_string(), "git pull exited with 1".to_string())]
        );
    }

    #[test]
    fn test_path_collisions_count_as_failed() {
        let inventory: Inventory = vec![
            RepositoryRef {
                remote_address: "git@host:platform/infra/terraform.git".to_string(),
                relative_path: "infra:terraform".to_string(),
            },
            RepositoryRef {
                remote_address: "git@host:other/infra/terraform.git".to_string(),
                relative_path: "infra:terraform".to_string(),
            },
        ]
        .into_iter()
        .collect();

        let report = MirrorReport::for_inventory(&inventory);

        assert_eq!(report.project_count, 1);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.accounted(), 0);
        assert_eq!(report.failures[0].0, "infra:terraform");
        assert!(report.failures[0].1.contains("git@host:other/infra/terraform.git"));
    }

    #[test]
    fn test_display() {
        let report = MirrorReport {
            project_count: 5,
            new_count: 1,
            update_count: 2,
            uptodate_count: 1,
            empty_count: 1,
            group_count: 2,
            subgroup_count: 3,
            ..Default::default()
        };

        assert_eq!(
            report.to_string(),
            "Done. Found 5 projects in 2 groups (3 subgroups).\n\
             1 projects were new, 2 got updated, 1 were up to date, 1 were empty projects, 0 failed"
        );
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(MirrorOutcome::UpToDate.label(), "up to date");
        assert_eq!(
            MirrorOutcome::Failed {
                reason: String::new()
            }
            .label(),
            "failed"
        );
    }
}
