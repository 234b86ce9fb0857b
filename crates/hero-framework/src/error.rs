//! Error types for the Hero framework.
//!
//! Errors fall into two families:
//!
//! - **Load-time** ([`RegistryError`], [`LifecycleError`]): returned to the
//!   caller of `load` / `unload` / `reload` after the registry has been rolled
//!   back to its last consistent state.
//! - **Dispatch-time** ([`ExtractError`], [`CommandError`]): confined to one
//!   invocation, logged and turned into a user-visible reply.

use std::fmt;

use hero_core::StoreError;
use thiserror::Error;
use tower::BoxError;

use crate::command::Command;

// =============================================================================
// Registry
// =============================================================================

/// Why a command could not take its place in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another command already owns the same path.
    NameTaken,
    /// A path component is already a leaf command and cannot become a group.
    LeafIsNotGroup {
        /// Space-separated path of the blocking leaf.
        group: String,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameTaken => f.write_str("name already registered"),
            Self::LeafIsNotGroup { group } => {
                write!(f, "'{group}' is a command, not a group")
            }
        }
    }
}

/// Errors raised while mutating the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// An extension of this name is already registered.
    #[error("extension '{0}' is already loaded")]
    AlreadyLoaded(String),

    /// No extension of this name is registered.
    #[error("extension '{0}' is not loaded")]
    NotLoaded(String),

    /// The command clashes with an existing one.
    #[error("command '{name}' conflicts with an existing command: {reason}")]
    CommandConflict {
        /// Flat name as declared.
        name: String,
        reason: ConflictReason,
    },

    /// The flat name cannot be resolved into a command path.
    #[error("invalid command name '{name}': {reason}")]
    InvalidCommandName {
        name: String,
        reason: &'static str,
    },
}

impl RegistryError {
    pub fn conflict(name: impl Into<String>, reason: ConflictReason) -> Self {
        Self::CommandConflict {
            name: name.into(),
            reason,
        }
    }

    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidCommandName {
            name: name.into(),
            reason,
        }
    }
}

/// Result type for registry mutations.
pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// Lifecycle
// =============================================================================

/// Errors returned by the extension lifecycle manager.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `load` was called for an extension that is already loaded.
    #[error("extension '{0}' is already loaded")]
    AlreadyLoaded(String),

    /// `unload` / `reload` was called for an extension that is not loaded.
    #[error("extension '{0}' is not loaded")]
    NotLoaded(String),

    /// Neither the local nor the bundled catalog knows the extension.
    #[error("extension '{0}' was not found")]
    ExtensionNotFound(String),

    /// Registering the extension's contributions failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A hook supplied by the extension failed.
    #[error("extension '{extension}' failed to set up: {message}")]
    Setup { extension: String, message: String },

    /// Fetching the extension's settings failed.
    #[error("settings store error: {0}")]
    Store(#[from] StoreError),

    /// A declared dependency is neither loaded nor loadable.
    #[error("extension '{extension}' depends on '{dependency}', which is not available")]
    MissingDependency {
        extension: String,
        dependency: String,
    },

    /// The extension is part of a dependency cycle.
    #[error("extension '{0}' is part of a dependency cycle")]
    DependencyCycle(String),

    /// A reload failed and the previous state could not be restored either.
    ///
    /// The extension is left unloaded; an operator has to intervene.
    #[error(
        "reload of extension '{extension}' failed ({reload}) and restoring the previous state also failed ({restore})"
    )]
    RestoreFailed {
        extension: String,
        reload: Box<LifecycleError>,
        restore: Box<LifecycleError>,
    },
}

impl LifecycleError {
    pub fn setup(extension: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Setup {
            extension: extension.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

// =============================================================================
// Extraction
// =============================================================================

/// Errors that can occur while extracting handler parameters.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The handler needs a chat message but the event is something else.
    #[error("event is not a chat message")]
    NotAMessage,

    /// The handler needs command arguments but was invoked as a listener.
    #[error("event is not a command invocation")]
    NotACommand,

    /// The handler asked for cog state of a type the cog does not hold.
    #[error("cog state of type '{0}' is not available")]
    MissingState(&'static str),

    /// The extension has no controller of the requested type.
    #[error("controller of type '{0}' is not available")]
    MissingController(&'static str),

    /// The extension declares no settings.
    #[error("extension '{0}' has no settings")]
    MissingSettings(String),

    /// Command arguments failed to parse.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The event payload could not be decoded.
    #[error("payload does not match '{ty}': {message}")]
    Payload { ty: &'static str, message: String },

    /// The extension's configuration could not be decoded.
    #[error("invalid configuration for extension '{extension}': {message}")]
    Config { extension: String, message: String },

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Returns `true` when the failure stems from what the user typed.
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::InvalidArguments(_))
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

// =============================================================================
// Dispatch
// =============================================================================

/// Failure of a single command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The user supplied arguments the command cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A handler parameter could not be extracted.
    #[error(transparent)]
    Extract(ExtractError),

    /// A check rejected the invocation.
    #[error("check '{check}' failed")]
    CheckFailed { check: String },

    /// A guild-only command was invoked in a direct message.
    #[error("command cannot be used in direct messages")]
    NoPrivateMessage,

    /// The command is registered but switched off.
    #[error("command is disabled")]
    Disabled,

    /// The handler returned an error.
    #[error("handler error: {0}")]
    Handler(BoxError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl CommandError {
    pub fn check_failed(check: impl Into<String>) -> Self {
        Self::CheckFailed {
            check: check.into(),
        }
    }

    /// Wraps an arbitrary handler error, recovering a [`CommandError`] that
    /// was boxed on the way out.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<CommandError>() {
            Ok(err) => *err,
            Err(err) => Self::Handler(err),
        }
    }

    /// The text shown to the invoking user.
    pub fn user_message(&self, command: &Command) -> String {
        match self {
            Self::InvalidInput(_) => invalid_input_message(command),
            Self::Extract(err) if err.is_user_input() => invalid_input_message(command),
            Self::CheckFailed { .. } => {
                "You do not have permission to use this command.".to_string()
            }
            Self::NoPrivateMessage => "This command cannot be used in direct messages.".to_string(),
            Self::Disabled => "This command has been disabled.".to_string(),
            Self::Extract(_) | Self::Handler(_) | Self::Panicked(_) => format!(
                "An error occurred while running the command **{}**.",
                command.qualified_name()
            ),
        }
    }

    /// Returns `true` for failures caused by a bug rather than by the user.
    pub fn is_internal(&self) -> bool {
        match self {
            Self::Extract(err) => !err.is_user_input(),
            Self::Handler(_) | Self::Panicked(_) => true,
            _ => false,
        }
    }
}

impl From<ExtractError> for CommandError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::InvalidArguments(msg) => Self::InvalidInput(msg),
            other => Self::Extract(other),
        }
    }
}

fn invalid_input_message(command: &Command) -> String {
    format!("Invalid input.\n{}", crate::command::help::command_help(command))
}

/// Result type for command invocations.
pub type CommandResult<T> = Result<T, CommandError>;
