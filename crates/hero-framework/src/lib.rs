//! # Hero Framework
//!
//! The engine of a Hero bot: extensions, their cogs, and the dispatch of
//! gateway events to commands and listeners.
//!
//! This layer provides:
//! - Static [`ExtensionDescriptor`]s, looked up in a local and a bundled
//!   [`catalog`], loaded and unloaded by the [`lifecycle`] manager with full
//!   rollback on failure
//! - [`CogBuilder`] for grouping commands, listeners and background tasks
//! - Flat command names (`settings_set_prefix`) resolved into a
//!   [`CommandTree`] of groups and subcommands
//! - Axum-style handlers with [`FromContext`] parameter extraction
//! - Task supervision tied to the gateway connection (resume after reconnect)
//! - The bundled `essentials` extension (with `builtin-extensions`)
//! - Clap-parsed command arguments (with `command`)
//!
//! ```rust,ignore
//! use hero_framework::prelude::*;
//!
//! async fn kick(Args(args): Args) -> String {
//!     format!("Kicked {}", args.join(", "))
//! }
//!
//! fn moderation(_: &ExtensionSetup) -> CogBuilder {
//!     CogBuilder::new("Mod")
//!         .check(guild_only())
//!         .command(CommandSpec::new("kick", kick))
//! }
//!
//! pub const MODERATION: ExtensionDescriptor =
//!     ExtensionDescriptor::new("moderation").cogs(&[moderation]);
//! ```

pub mod catalog;
pub mod cog;
pub mod command;
pub mod config;
pub mod context;
pub mod core;
pub mod dispatcher;
pub mod error;
pub mod extension;
pub mod extractor;
pub mod handler;
pub mod lifecycle;
pub mod registry;
pub mod task;
pub mod waiter;

#[cfg(feature = "builtin-extensions")]
pub mod builtin;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{BUNDLED_EXTENSIONS, ExtensionCatalog, ExtensionSource};
pub use cog::{CogBuilder, CogHandle};
pub use command::check::{guild_only, owner_only, staff_only, test_only};
pub use command::{Check, Command, CommandSpec, CommandTree, GroupingMode, Owner};
pub use config::CoreConfig;
pub use context::{Context, Invocation};
pub use crate::core::{Core, CoreBuilder, Presence};
pub use dispatcher::EventDispatcher;
pub use error::{
    CommandError, CommandResult, ConflictReason, ExtractError, ExtractResult, LifecycleError,
    LifecycleResult, RegistryError, RegistryResult,
};
pub use extension::{
    ControllerContext, Extension, ExtensionDescriptor, ExtensionSetup, SettingsHandle,
};
pub use extractor::{
    Args, Controller, Db, ExtCache, ExtensionConfig, FromContext, Payload, RawArgs, Settings, State,
};
pub use handler::{Handler, HandlerResponse};
pub use lifecycle::{BootReport, ExtensionState, LoadOutcome};
pub use registry::RegistrySummary;
pub use task::{TaskContext, TaskHandle, TaskSpec};

#[cfg(feature = "command")]
pub use extractor::Parsed;

/// Re-exported so downstream crates can contribute to
/// [`BUNDLED_EXTENSIONS`] without depending on `linkme` directly.
pub use linkme;

/// Everything an extension author usually needs.
pub mod prelude {
    pub use crate::{
        Args, BootReport, Check, CogBuilder, CommandError, CommandSpec, Context, Controller,
        ControllerContext, Core, Db, ExtCache, ExtensionConfig, ExtensionDescriptor,
        ExtensionSetup, LifecycleError, Payload, RawArgs, Settings, State, TaskContext, TaskSpec,
        guild_only, owner_only, staff_only, test_only,
    };
    pub use hero_core::{Lookup, MessagePayload, UserRecord};
    pub use tower::BoxError;

    #[cfg(feature = "command")]
    pub use crate::Parsed;
}
