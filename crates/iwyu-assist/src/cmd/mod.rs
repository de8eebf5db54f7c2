//! Command implementations for the CLI.
//!
//! The binary is a thin wrapper around [`assist::main`].

pub mod assist;
pub mod completions;
mod watch;
