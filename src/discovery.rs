//! Repository discovery over a tree of groups
//!
//! The remote directory is abstracted behind [`GroupDirectory`] so the
//! inventory can be built from GitLab or from an in-memory tree in tests.
//! Discovery always completes before any repository is touched on disk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::MirrorError;

/// A group as reported by the remote directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteGroup {
    pub id: u64,
    /// Path segment of the group (not the full namespace)
    pub path: String,
}

/// A project as reported by the remote directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProject {
    /// Path segment of the project
    pub path: String,
    /// Address handed to `git clone`
    pub clone_address: String,
}

/// Remote directory of groups and projects
///
/// Every call may fail with a transport or authorization error; the
/// inventory builder treats any such failure as fatal for the run.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Resolve a group's own metadata
    async fn get_group(&self, id: u64) -> Result<RemoteGroup>;

    /// All direct projects of a group
    async fn list_projects(&self, group_id: u64) -> Result<Vec<RemoteProject>>;

    /// Ids of all direct sub-groups of a group
    async fn list_subgroups(&self, group_id: u64) -> Result<Vec<u64>>;

    /// All projects owned by the current account
    async fn list_owned_projects(&self) -> Result<Vec<RemoteProject>>;

    /// Provider name for display/logging
    fn provider_name(&self) -> &'static str;
}

/// One repository to mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Clone address; unique within an inventory
    pub remote_address: String,
    /// Location below the output directory, built from the group nesting;
    /// unique within an inventory and never nested inside another entry
    pub relative_path: String,
}

/// Deduplicated, ordered list of repositories plus discovery totals
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub repositories: Vec<RepositoryRef>,
    /// Root groups visited
    pub group_count: usize,
    /// Nested groups visited
    pub subgroup_count: usize,
    /// Projects dropped because their address was already recorded
    pub duplicate_count: usize,
    /// Projects dropped by an exclusion pattern
    pub excluded_count: usize,
    /// Distinct repositories dropped because their path clashes with an
    /// earlier entry; they are reported as failed
    pub collisions: Vec<RepositoryRef>,
    seen: HashSet<String>,
    claimed: HashSet<PathBuf>,
    claimed_parents: HashSet<PathBuf>,
}

impl Inventory {
    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RepositoryRef> {
        self.repositories.iter()
    }

    /// Record a repository unless its address is already present (first seen wins)
    ///
    /// A different repository whose path equals, contains or sits inside an
    /// already recorded path is set aside in `collisions` instead.
    fn record(&mut self, remote_address: &str, relative_path: String) -> bool {
        if self.seen.contains(remote_address) {
            debug!(
                "Skipping duplicate {} (would have been {})",
                remote_address, relative_path
            );
            self.duplicate_count += 1;
            return false;
        }

        self.seen.insert(remote_address.to_string());

        if self.clashes(&relative_path) {
            error!(
                "{} from {} clashes with an already discovered repository, it will not be mirrored",
                relative_path, remote_address
            );
            self.collisions.push(RepositoryRef {
                remote_address: remote_address.to_string(),
                relative_path,
            });
            return false;
        }

        self.claim(&relative_path);
        debug!("Found project: {} -> {}", remote_address, relative_path);
        self.repositories.push(RepositoryRef {
            remote_address: remote_address.to_string(),
            relative_path,
        });
        true
    }

    fn clashes(&self, relative_path: &str) -> bool {
        let path = Path::new(relative_path);
        self.claimed.contains(path)
            || self.claimed_parents.contains(path)
            || parents(path).any(|parent| self.claimed.contains(parent))
    }

    fn claim(&mut self, relative_path: &str) {
        let path = Path::new(relative_path);
        self.claimed.insert(path.to_path_buf());
        for parent in parents(path) {
            self.claimed_parents.insert(parent.to_path_buf());
        }
    }
}

/// Proper, non-empty ancestors of a relative path
fn parents(path: &Path) -> impl Iterator<Item = &Path> {
    path.ancestors()
        .skip(1)
        .filter(|parent| !parent.as_os_str().is_empty())
}

impl FromIterator<RepositoryRef> for Inventory {
    fn from_iter<I: IntoIterator<Item = RepositoryRef>>(iter: I) -> Self {
        let mut inventory = Inventory::default();
        for repo in iter {
            inventory.record(&repo.remote_address, repo.relative_path);
        }
        inventory
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a RepositoryRef;
    type IntoIter = std::slice::Iter<'a, RepositoryRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.repositories.iter()
    }
}

/// Glob-style exclusion patterns matched against relative paths
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    patterns: Vec<Regex>,
}

impl PathFilter {
    /// Compile glob patterns where `*` matches any run of characters and `?` one character
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let body = regex::escape(pattern)
                    .replace(r"\*", ".*")
                    .replace(r"\?", ".");
                Regex::new(&format!("^{}$", body))
                    .with_context(|| format!("Invalid exclusion pattern: {}", pattern))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(relative_path))
    }
}

/// Pending group in the traversal worklist
#[derive(Debug)]
struct GroupNode {
    id: u64,
    depth: usize,
    /// Relative path of the parent group, separator included
    path_prefix: String,
}

/// Builds the inventory by walking the group tree depth-first, pre-order
pub struct InventoryBuilder<'a> {
    directory: &'a dyn GroupDirectory,
    separator: String,
    filter: PathFilter,
}

impl<'a> InventoryBuilder<'a> {
    pub fn new(directory: &'a dyn GroupDirectory, separator: impl Into<String>) -> Self {
        Self {
            directory,
            separator: separator.into(),
            filter: PathFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Discover every repository reachable from the root groups
    ///
    /// Personal projects, when requested, are recorded first and without a
    /// group prefix. Any directory failure aborts discovery: a partial
    /// inventory is never returned.
    pub async fn discover(
        &self,
        root_group_ids: &[u64],
        include_personal: bool,
    ) -> Result<Inventory, MirrorError> {
        let mut inventory = Inventory::default();

        if include_personal {
            let projects = self
                .directory
                .list_owned_projects()
                .await
                .map_err(|source| MirrorError::Discovery {
                    scope: "personal projects".to_string(),
                    source,
                })?;
            debug!("Found {} personal projects", projects.len());

            for project in projects {
                self.add_project(&mut inventory, "", &project);
            }
        }

        let mut visited = HashSet::new();
        for &root in root_group_ids {
            self.traverse(root, &mut inventory, &mut visited)
                .await
                .map_err(|source| MirrorError::Discovery {
                    scope: format!("group {}", root),
                    source,
                })?;
        }

        info!(
            "Discovered {} projects from {} in {} groups ({} subgroups)",
            inventory.len(),
            self.directory.provider_name(),
            inventory.group_count,
            inventory.subgroup_count
        );

        Ok(inventory)
    }

    async fn traverse(
        &self,
        root: u64,
        inventory: &mut Inventory,
        visited: &mut HashSet<u64>,
    ) -> Result<()> {
        let mut worklist = vec![GroupNode {
            id: root,
            depth: 0,
            path_prefix: String::new(),
        }];

        while let Some(node) = worklist.pop() {
            if !visited.insert(node.id) {
                debug!("Group {} already visited, skipping", node.id);
                continue;
            }

            let group = self
                .directory
                .get_group(node.id)
                .await
                .with_context(|| format!("Failed to resolve group {}", node.id))?;

            if node.depth == 0 {
                inventory.group_count += 1;
                debug!("Searching in group: {}", group.path);
            } else {
                inventory.subgroup_count += 1;
                debug!("Searching in subgroup: {}{}", node.path_prefix, group.path);
            }

            let prefix = format!("{}{}{}", node.path_prefix, group.path, self.separator);

            let projects = self
                .directory
                .list_projects(group.id)
                .await
                .with_context(|| format!("Failed to list projects of group {}", group.path))?;
            for project in &projects {
                self.add_project(inventory, &prefix, project);
            }

            let subgroups = self
                .directory
                .list_subgroups(group.id)
                .await
                .with_context(|| format!("Failed to list subgroups of group {}", group.path))?;

            // Reverse so the first sub-group is popped first
            for id in subgroups.into_iter().rev() {
                worklist.push(GroupNode {
                    id,
                    depth: node.depth + 1,
                    path_prefix: prefix.clone(),
                });
            }
        }

        Ok(())
    }

    fn add_project(&self, inventory: &mut Inventory, prefix: &str, project: &RemoteProject) {
        let relative_path = format!("{}{}", prefix, project.path);

        if self.filter.is_excluded(&relative_path) {
            debug!("Excluding project due to pattern match: {}", relative_path);
            inventory.excluded_count += 1;
            return;
        }

        inventory.record(&project.clone_address, relative_path);
    }
}
