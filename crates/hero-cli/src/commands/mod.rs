//! Subcommand implementations. Each `run` returns the process exit code.

pub mod extension;
pub mod start;
