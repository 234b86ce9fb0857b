//! Library half of the `hero` binary: the console gateway and the
//! subcommand implementations.

pub mod commands;
pub mod console;

pub use console::ConsoleGateway;
