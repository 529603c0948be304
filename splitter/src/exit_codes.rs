//! Stable exit codes for splitter CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input (settings, mapping config, graph) or any other error.
pub const INVALID: i32 = 1;
/// Not a git repository, dirty working tree, or split branches already exist.
pub const PRECONDITION: i32 = 2;
/// Some moves failed or a split commit failed; a branch is partially migrated.
pub const PARTIAL: i32 = 3;
