//! Pure planning for the git split: which files move where, and which files
//! are pruned from each destination branch. No I/O.

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::location::Location;
use crate::core::mapping::PackageMapping;

/// One `git mv` from an old path to its destination path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileMove {
    pub old_path: String,
    pub new_path: String,
}

impl FileMove {
    pub fn new(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            old_path: old_path.into(),
            new_path: new_path.into(),
        }
    }
}

/// Destination repo -> moves, in first-seen order.
pub type MovePlan = IndexMap<String, Vec<FileMove>>;

/// Group every mapped, moving graph node by destination repo.
///
/// Skips the `N/A` sentinel, `current_repo`, and nodes whose path does not
/// change.
pub fn prepare_git_move(mapping: &PackageMapping, current_repo: &str) -> MovePlan {
    let mut plan = MovePlan::new();
    for entry in mapping.dep_map() {
        let Some(location) = entry.name.location() else {
            continue;
        };
        if location.is_sentinel_repo() || location.repo == current_repo || !entry.name.moves() {
            continue;
        }
        plan.entry(location.repo.clone())
            .or_default()
            .push(FileMove::new(entry.name.old_name(), &location.path));
    }
    plan
}

/// Moves for the residual base branch: nodes mapped to `N/A` or to
/// `base_repo` whose path changes.
pub fn base_moves(mapping: &PackageMapping, base_repo: &str) -> Vec<FileMove> {
    mapping
        .dep_map()
        .iter()
        .filter(|entry| entry.name.moves())
        .filter_map(|entry| {
            let location = entry.name.location()?;
            belongs_to_base(location, base_repo)
                .then(|| FileMove::new(entry.name.old_name(), &location.path))
        })
        .collect()
}

/// Old paths to delete from the branch of `target_repo`: every mapped node
/// destined elsewhere. `N/A` files stay only on the base branch.
pub fn removal_set(mapping: &PackageMapping, target_repo: &str, base_repo: &str) -> Vec<String> {
    let keep = |location: &Location| {
        location.repo == target_repo
            || (target_repo == base_repo && belongs_to_base(location, base_repo))
    };
    mapping
        .dep_map()
        .iter()
        .filter_map(|entry| {
            let location = entry.name.location()?;
            (!keep(location)).then(|| entry.name.old_name().to_string())
        })
        .collect()
}

/// Add an empty entry for every destination repo with no moving file, so
/// each destination still gets a split branch. `base_repo` and the sentinel
/// are left out; the base branch is handled separately.
pub fn with_all_destinations(mut plan: MovePlan, mapping: &PackageMapping, base_repo: &str) -> MovePlan {
    plan.shift_remove(base_repo);
    for entry in mapping.dep_map() {
        let Some(location) = entry.name.location() else {
            continue;
        };
        if belongs_to_base(location, base_repo) {
            continue;
        }
        plan.entry(location.repo.clone()).or_default();
    }
    plan
}

fn belongs_to_base(location: &Location, base_repo: &str) -> bool {
    location.is_sentinel_repo() || location.repo == base_repo
}
