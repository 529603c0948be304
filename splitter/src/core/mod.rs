//! Deterministic, pure logic for the split.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! mappings and graphs and return deterministic outputs suitable for tests.

pub mod graph;
pub mod location;
pub mod mapping;
pub mod plan;
pub mod report;
pub mod specifier;
