//! I/O helpers for wizard commands.

pub mod config;
pub mod flow_store;
pub mod init;
