//! Deterministic, pure logic of the wizard engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod command;
pub mod compile;
pub mod context;
pub mod error;
pub mod escape;
pub mod graph;
pub mod instruction;
pub mod path;
pub mod position;
pub mod reference;
pub mod types;
