//! Commands, command groups and the command tree.
//!
//! Extensions describe commands with a [`CommandSpec`] carrying a flat name
//! such as `settings_set_prefix`. When the command spec is registered, the
//! [`resolve`] step turns the flat name into a path (`settings` ›
//! `set_prefix`) and the [`CommandTree`] mounts the resulting [`Command`],
//! synthesizing help-only groups for missing path components.
//!
//! ```rust,ignore
//! CogBuilder::new("Mod")
//!     .command(CommandSpec::new("kick", kick).help("Kicks a member."))
//!     .command(CommandSpec::new("settings_set_log_channel", set_log_channel))
//!     .command(CommandSpec::new("settings_get_log_channel", get_log_channel));
//! ```

pub mod check;
pub mod help;
pub mod resolve;
pub mod split;
pub mod tree;

use std::fmt;
use std::sync::Arc;

pub use check::Check;
pub use resolve::{GroupingMode, split_name};
pub use split::{SplitError, shell_split};
pub use tree::{CommandTree, Resolved};

use crate::cog::CogHandle;
use crate::handler::{BoxedService, Handler, into_service};

// =============================================================================
// Owner
// =============================================================================

/// Who contributed a command, listener or task.
#[derive(Debug, Clone)]
pub struct Owner {
    /// Name of the contributing extension.
    pub extension: String,
    /// The cog it was declared on, if any.
    pub cog: Option<Arc<CogHandle>>,
}

impl Owner {
    pub fn extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            cog: None,
        }
    }

    pub fn cog(cog: Arc<CogHandle>) -> Self {
        Self {
            extension: cog.extension().to_string(),
            cog: Some(cog),
        }
    }
}

// =============================================================================
// CommandSpec
// =============================================================================

/// Declaration of a command, before its name has been resolved.
#[derive(Clone)]
pub struct CommandSpec {
    name: String,
    help: Option<String>,
    checks: Vec<Check>,
    enabled: bool,
    hidden: bool,
    group: bool,
    callback: Option<BoxedService>,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("checks", &self.checks)
            .finish_non_exhaustive()
    }
}

impl CommandSpec {
    /// A leaf command running `handler`.
    pub fn new<H, T>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T>,
        T: Send + 'static,
    {
        Self {
            callback: Some(into_service(handler)),
            ..Self::bare(name.into(), false)
        }
    }

    /// An explicit group that only dispatches to its subcommands.
    ///
    /// Invoking it without a subcommand shows its help.
    pub fn group(name: impl Into<String>) -> Self {
        Self::bare(name.into(), true)
    }

    /// An explicit group that runs `handler` when invoked without a
    /// subcommand.
    pub fn group_with<H, T>(name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<T>,
        T: Send + 'static,
    {
        Self {
            callback: Some(into_service(handler)),
            ..Self::bare(name.into(), true)
        }
    }

    fn bare(name: String, group: bool) -> Self {
        Self {
            name,
            help: None,
            checks: Vec::new(),
            enabled: true,
            hidden: false,
            group,
            callback: None,
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Adds a check; checks run in the order they were added.
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Hides the command from help listings.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Registers the command switched off.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The flat, unresolved name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_group(&self) -> bool {
        self.group
    }

    /// Builds the mounted command for `path`, with `inherited` checks running
    /// before the command's own.
    pub(crate) fn build(&self, path: Vec<String>, owner: Option<Owner>, inherited: &[Check]) -> Command {
        Command {
            path,
            declared_name: self.name.clone(),
            help: self.help.clone(),
            checks: inherited.iter().chain(&self.checks).cloned().collect(),
            enabled: self.enabled,
            hidden: self.hidden,
            is_group: self.group,
            owner,
            callback: self.callback.clone(),
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// A command mounted in the [`CommandTree`].
#[derive(Clone)]
pub struct Command {
    path: Vec<String>,
    declared_name: String,
    help: Option<String>,
    checks: Vec<Check>,
    enabled: bool,
    hidden: bool,
    is_group: bool,
    owner: Option<Owner>,
    callback: Option<BoxedService>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("path", &self.path)
            .field("declared_name", &self.declared_name)
            .field("is_group", &self.is_group)
            .field("extension", &self.extension())
            .finish_non_exhaustive()
    }
}

impl Command {
    /// A help-only group created for a missing path component.
    pub(crate) fn synthesized_group(path: Vec<String>) -> Self {
        let qualified = path.join(" ");
        Command {
            declared_name: path.join("_"),
            help: Some(format!("{qualified} command group")),
            path,
            checks: Vec::new(),
            enabled: true,
            hidden: false,
            is_group: true,
            owner: None,
            callback: None,
        }
    }

    /// The last path segment, i.e. what the user types at this level.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Space-separated full path, e.g. `settings set_prefix`.
    pub fn qualified_name(&self) -> String {
        self.path.join(" ")
    }

    /// The flat name the command was declared with.
    pub fn declared_name(&self) -> &str {
        &self.declared_name
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_group(&self) -> bool {
        self.is_group
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    /// Name of the contributing extension, `None` for core-level commands and
    /// synthesized groups.
    pub fn extension(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.extension.as_str())
    }

    pub fn cog(&self) -> Option<&Arc<CogHandle>> {
        self.owner.as_ref().and_then(|o| o.cog.as_ref())
    }

    /// The service run on invocation; `None` for help-only groups.
    pub fn callback(&self) -> Option<&BoxedService> {
        self.callback.as_ref()
    }

    pub(crate) fn is_owned_by(&self, extension: &str) -> bool {
        self.extension() == Some(extension)
    }
}
