//! Stable exit codes for wizard CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, flow, path or operation.
pub const INVALID: i32 = 1;
/// `wizard next` found no reachable action (flow complete).
pub const COMPLETE: i32 = 2;
