//! Monorepo splitter.
//!
//! Splits one repository into several destination repositories while keeping
//! git history for moved files and rewriting imports so they stay valid.
//!
//! - **[`core`]**: Pure, deterministic logic (mapping, graph inversion, move
//!   planning, specifier arithmetic). No I/O.
//! - **[`io`]**: Side-effecting adapters (git, settings, input files, source
//!   scanning). Behind traits where tests need to swap them.
//!
//! Orchestration modules ([`split`], [`rewrite`], [`pipeline`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod rewrite;
pub mod split;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
