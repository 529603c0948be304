//! Typed failures surfaced by the mapping engine and the git orchestrator.
//!
//! Orchestration code above these layers wraps them in `anyhow` with context;
//! the CLI downcasts to pick an exit code.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::core::plan::FileMove;

/// Bad input files. Raised before anything in the repository is touched.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("load mapping config {}: {reason}", .path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("load dependency graph {}: {reason}", .path.display())]
    GraphLoad { path: PathBuf, reason: String },

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single `git mv` that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("move {old_path} -> {new_path}: {reason}")]
pub struct MoveFailure {
    pub old_path: String,
    pub new_path: String,
    pub reason: String,
}

/// Outcome of one planned move inside one destination repo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub target_repo: String,
    #[serde(flatten)]
    pub file: FileMove,
    pub result: Result<(), MoveFailure>,
}

impl MoveOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Failures of the git move orchestrator.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("not a git repository: {}", .workdir.display())]
    NotAGitRepo { workdir: PathBuf },

    #[error("working tree not clean:\n{}", .files.join("\n"))]
    DirtyWorkingTree { files: Vec<String> },

    #[error(
        "split branches from a previous run exist (delete them to start over): {}",
        .branches.join(", ")
    )]
    StaleSplitBranch { branches: Vec<String> },

    #[error(
        "{} of {} moves failed for {target_repo}:\n{}",
        .failures.len(),
        .outcomes.len(),
        .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
    )]
    AggregateMove {
        target_repo: String,
        failures: Vec<MoveFailure>,
        outcomes: Vec<MoveOutcome>,
    },

    /// The branch is partially migrated: `succeeded` moves are applied in the
    /// working tree but not committed.
    #[error("commit for {target_repo} failed after {} moves: {reason}", .succeeded.len())]
    CommitFailure {
        target_repo: String,
        succeeded: Vec<FileMove>,
        reason: String,
    },

    #[error("git: {0}")]
    Vcs(String),
}

impl From<anyhow::Error> for SplitError {
    fn from(err: anyhow::Error) -> Self {
        SplitError::Vcs(format!("{err:#}"))
    }
}

impl SplitError {
    /// Precondition violations abort before any mutation.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SplitError::NotAGitRepo { .. }
                | SplitError::DirtyWorkingTree { .. }
                | SplitError::StaleSplitBranch { .. }
        )
    }
}
