//! Plain-text help rendering.

use std::fmt::Write;
use std::sync::Arc;

use super::Command;

const NO_HELP: &str = "No description.";

/// One-command help: the qualified name and its help text.
pub fn command_help(command: &Command) -> String {
    format!(
        "**{}**\n{}",
        command.qualified_name(),
        command.help().unwrap_or(NO_HELP)
    )
}

/// Help for a group: its own help followed by its visible subcommands,
/// sorted by name.
pub fn group_help(group: &Command, children: &[Arc<Command>]) -> String {
    let mut out = command_help(group);
    let listing = listing(children);
    if !listing.is_empty() {
        out.push_str("\n\nCommands:\n");
        out.push_str(&listing);
    }
    out
}

/// Top-level overview used by the `help` command.
pub fn overview(description: &str, prefix: &str, commands: &[Arc<Command>]) -> String {
    let mut out = String::new();
    if !description.is_empty() {
        out.push_str(description);
        out.push_str("\n\n");
    }
    out.push_str("Commands:\n");
    out.push_str(&listing(commands));
    let _ = write!(
        out,
        "\n\nType {prefix}help <command> for more info on a command."
    );
    out
}

fn listing(commands: &[Arc<Command>]) -> String {
    let mut visible: Vec<&Arc<Command>> = commands.iter().filter(|c| !c.is_hidden()).collect();
    visible.sort_by(|a, b| a.name().cmp(b.name()));
    visible
        .iter()
        .map(|c| match c.help() {
            Some(help) => format!("  {} - {}", c.name(), first_line(help)),
            None => format!("  {}", c.name()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
