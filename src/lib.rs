//! labmirror - Local mirror of GitLab group trees
//!
//! labmirror walks one or more GitLab groups, including every nested
//! sub-group and optionally the projects owned by the current account, and
//! keeps a local clone of each discovered repository in sync with upstream.
//!
//! A run has two phases: discovery builds the complete, deduplicated
//! inventory first, then the sync engine clones or pulls each repository in
//! turn and classifies the outcome (new, updated, up to date, empty, failed).
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`discovery`]: Group tree traversal and inventory building
//! - [`gitlab`]: GitLab REST API client
//! - [`git`]: Git executor
//! - [`guard`]: Detection and removal of empty working copies
//! - [`classify`]: Classification of git pull output
//! - [`sync`]: Per-repository reconciliation
//! - [`report`]: Outcomes and run totals

pub mod classify;
pub mod config;
pub mod discovery;
pub mod error;
pub mod git;
pub mod gitlab;
pub mod guard;
pub mod report;
pub mod sync;

pub use config::Config;
pub use discovery::{GroupDirectory, Inventory, InventoryBuilder, RepositoryRef};
pub use error::MirrorError;
pub use git::{GitCli, GitExecutor, GitOutput};
pub use gitlab::GitLabClient;
pub use report::{MirrorOutcome, MirrorReport};
pub use sync::SyncEngine;
