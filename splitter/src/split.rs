//! Git move orchestrator.
//!
//! Every destination repo gets its own branch cut from the starting commit.
//! On it, files destined elsewhere are pruned in one commit, the planned
//! moves run, and a finalize commit records them. Targets run one after
//! another; the base repo runs last and stays checked out.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};
use std::fs;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::mapping::PackageMapping;
use crate::core::plan::{FileMove, MovePlan, base_moves, removal_set};
use crate::error::{MoveFailure, MoveOutcome, SplitError};
use crate::io::git::Vcs;

/// Per-destination lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SplitState {
    Ready,
    BranchCreated,
    Pruned,
    Moved,
    Committed,
    Failed,
}

/// Runs the split of one mapping against one working tree.
#[derive(Debug)]
pub struct GitSplitter<'a, V: Vcs> {
    vcs: &'a V,
    mapping: &'a PackageMapping,
    base_repo: String,
    states: RefCell<Vec<(String, SplitState)>>,
}

impl<'a, V: Vcs> GitSplitter<'a, V> {
    pub fn new(vcs: &'a V, mapping: &'a PackageMapping, base_repo: impl Into<String>) -> Self {
        Self {
            vcs,
            mapping,
            base_repo: base_repo.into(),
            states: RefCell::new(Vec::new()),
        }
    }

    /// Every state transition so far, in order.
    pub fn states(&self) -> Vec<(String, SplitState)> {
        self.states.borrow().clone()
    }

    /// The working directory must be a git repository with a clean tree.
    pub fn ensure_ready(&self) -> Result<(), SplitError> {
        if !self.vcs.check_is_repo()? {
            return Err(SplitError::NotAGitRepo {
                workdir: self.vcs.workdir().to_path_buf(),
            });
        }
        let status = self.vcs.status()?;
        if !status.is_empty() {
            return Err(SplitError::DirtyWorkingTree {
                files: status.into_iter().map(|entry| entry.path).collect(),
            });
        }
        Ok(())
    }

    /// No branch may carry the split prefix yet.
    pub fn ensure_no_stale_branches(&self) -> Result<(), SplitError> {
        let pattern = format!("{}*", self.mapping.config().branch_prefix());
        let branches = self.vcs.list_branches(&pattern)?;
        if !branches.is_empty() {
            return Err(SplitError::StaleSplitBranch { branches });
        }
        Ok(())
    }

    /// Build the split branch of `target_repo` and apply `moves` on it.
    ///
    /// Moves are issued one after another, since `git mv` holds the index
    /// lock. Outcomes are collected without short-circuiting: every move is
    /// attempted and failures are raised together. On error the branch stays
    /// checked out in whatever state it reached.
    #[instrument(skip_all, fields(target_repo))]
    pub fn execute_for_repo(
        &self,
        target_repo: &str,
        moves: &[FileMove],
    ) -> Result<Vec<MoveOutcome>, SplitError> {
        self.ensure_ready()
            .inspect_err(|_| self.transition(target_repo, SplitState::Failed))?;
        self.transition(target_repo, SplitState::Ready);

        let branch = self.mapping.config().branch_name(target_repo);
        self.vcs
            .checkout_local_branch(&branch)
            .inspect_err(|_| self.transition(target_repo, SplitState::Failed))?;
        self.transition(target_repo, SplitState::BranchCreated);

        self.prune(target_repo)
            .inspect_err(|_| self.transition(target_repo, SplitState::Failed))?;
        self.transition(target_repo, SplitState::Pruned);

        let active = self
            .without_ignored(moves)
            .and_then(|active| self.create_parent_dirs(&active).map(|()| active))
            .inspect_err(|_| self.transition(target_repo, SplitState::Failed))?;
        let outcomes: Vec<MoveOutcome> = active
            .iter()
            .map(|file| MoveOutcome {
                target_repo: target_repo.to_string(),
                file: file.clone(),
                result: self
                    .vcs
                    .mv(&file.old_path, &file.new_path)
                    .map_err(|err| MoveFailure {
                        old_path: file.old_path.clone(),
                        new_path: file.new_path.clone(),
                        reason: format!("{err:#}"),
                    }),
            })
            .collect();

        let failures: Vec<MoveFailure> = outcomes
            .iter()
            .filter_map(|outcome| outcome.result.clone().err())
            .collect();
        if !failures.is_empty() {
            self.transition(target_repo, SplitState::Failed);
            for failure in &failures {
                warn!(target_repo, %failure, "move failed");
            }
            return Err(SplitError::AggregateMove {
                target_repo: target_repo.to_string(),
                failures,
                outcomes,
            });
        }
        self.transition(target_repo, SplitState::Moved);

        self.vcs
            .commit(&format!("Finalize split for {target_repo}"))
            .map_err(|err| {
                self.transition(target_repo, SplitState::Failed);
                SplitError::CommitFailure {
                    target_repo: target_repo.to_string(),
                    succeeded: active.clone(),
                    reason: format!("{err:#}"),
                }
            })?;
        self.transition(target_repo, SplitState::Committed);
        Ok(outcomes)
    }

    /// Run every target of `plan`, then the base repo.
    ///
    /// Stops at the first failing target; later targets and the base repo
    /// are not attempted.
    #[instrument(skip_all, fields(targets = plan.len(), base_repo = %self.base_repo))]
    pub fn execute_for_repos(&self, plan: &MovePlan) -> Result<Vec<MoveOutcome>, SplitError> {
        self.ensure_no_stale_branches()?;
        self.ensure_ready()?;
        let start = self.start_ref()?;
        debug!(start = %start, "recorded starting ref");

        let mut outcomes = Vec::new();
        for (target_repo, moves) in plan {
            if *target_repo == self.base_repo {
                continue;
            }
            outcomes.extend(self.execute_for_repo(target_repo, moves)?);
            self.vcs.checkout(&start)?;
            // Next branch must start from a clean tree.
            self.ensure_ready()?;
        }

        let base = base_moves(self.mapping, &self.base_repo);
        outcomes.extend(self.execute_for_repo(&self.base_repo, &base)?);
        info!(moves = outcomes.len(), "split finished");
        Ok(outcomes)
    }

    fn transition(&self, target_repo: &str, state: SplitState) {
        match state {
            SplitState::Failed => warn!(target_repo, ?state, "split state"),
            _ => info!(target_repo, ?state, "split state"),
        }
        self.states.borrow_mut().push((target_repo.to_string(), state));
    }

    /// Current branch name, or the commit when HEAD is detached.
    fn start_ref(&self) -> Result<String, SplitError> {
        match self.vcs.current_branch()? {
            Some(branch) => Ok(branch),
            None => Ok(self.vcs.rev_parse(&["HEAD"])?),
        }
    }

    /// Remove and commit everything not destined for `target_repo`.
    fn prune(&self, target_repo: &str) -> Result<(), SplitError> {
        let candidates = removal_set(self.mapping, target_repo, &self.base_repo);
        let ignored: HashSet<String> = self.vcs.check_ignore(&candidates)?.into_iter().collect();
        let removals: Vec<String> = candidates
            .into_iter()
            .filter(|path| !ignored.contains(path))
            .collect();
        debug!(target_repo, removals = removals.len(), ignored = ignored.len(), "pruning");
        if !removals.is_empty() {
            self.vcs.rm(&removals)?;
        }
        self.vcs
            .commit(&format!("Remove files not destined for {target_repo}"))?;
        Ok(())
    }

    fn without_ignored(&self, moves: &[FileMove]) -> Result<Vec<FileMove>, SplitError> {
        let old_paths: Vec<String> = moves.iter().map(|m| m.old_path.clone()).collect();
        let ignored: HashSet<String> = self.vcs.check_ignore(&old_paths)?.into_iter().collect();
        for path in &ignored {
            debug!(path = %path, "skipping ignored move");
        }
        Ok(moves
            .iter()
            .filter(|m| !ignored.contains(&m.old_path))
            .cloned()
            .collect())
    }

    /// Create destination directories, deepest first.
    fn create_parent_dirs(&self, moves: &[FileMove]) -> Result<(), SplitError> {
        let mut dirs: Vec<String> = moves
            .iter()
            .filter_map(|m| m.new_path.rsplit_once('/').map(|(dir, _)| dir.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        dirs.sort_by_key(|dir| std::cmp::Reverse(dir.matches('/').count()));
        for dir in dirs {
            let path = self.vcs.workdir().join(&dir);
            if path.is_dir() {
                continue;
            }
            fs::create_dir_all(&path).map_err(|err| {
                SplitError::Vcs(format!("create directory {}: {err}", path.display()))
            })?;
        }
        Ok(())
    }
}
