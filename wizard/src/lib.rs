//! Wizard execution engine.
//!
//! A flow is a graph of instructions (execute, include, repeat, replace)
//! over actions with typed input contexts. Traversing it produces a trace of
//! positions that round-trips through a compact textual path.
//!
//! - **[`core`]**: Pure, deterministic engine (compilation, matching,
//!   candidate derivation, graph operations, path codec). No I/O.
//! - **[`io`]**: Side-effecting operations (config, flow documents,
//!   scaffolding).
//!
//! [`flow`] is the serde authoring format; [`session`] coordinates core and
//! io for the CLI.

pub mod core;
pub mod exit_codes;
pub mod flow;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
