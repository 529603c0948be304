//! I/O helpers for splitter commands.

pub mod git;
pub mod inputs;
pub mod project;
pub mod settings;
