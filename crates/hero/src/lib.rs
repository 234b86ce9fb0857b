//! # Hero
//!
//! An extension-based chat bot framework.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  events  ┌────────────┐     ┌─────────────────────────────────┐
//! │ Gateway  │─────────▶│ Dispatcher │────▶│ listeners (one task each)       │
//! │          │◀─────────│            │────▶│ command resolver ─▶ checks ─▶ handler
//! └──────────┘  sends   └────────────┘     └─────────────────────────────────┘
//!                              ▲
//!                              │ registry (commands, listeners, tasks)
//!                       ┌──────┴───────┐
//!                       │  Extensions  │  load / unload / reload with rollback
//!                       └──────────────┘
//! ```
//!
//! - **Gateway**: connection to the chat platform ([`core::Gateway`])
//! - **Extensions**: units of functionality, each contributing cogs
//! - **Cogs**: groups of commands, listeners and background tasks
//! - **Handlers**: async functions whose parameters are extracted from the
//!   invocation context
//! - **Runtime**: configuration, logging, boot and shutdown
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hero::prelude::*;
//!
//! async fn hello(ctx: Arc<Context>) -> String {
//!     format!("Hello, <@{}>!", ctx.author_id().unwrap_or_default())
//! }
//!
//! fn greeter(_: &ExtensionSetup) -> CogBuilder {
//!     CogBuilder::new("Greeter").command(CommandSpec::new("hello", hello))
//! }
//!
//! const GREETER: ExtensionDescriptor = ExtensionDescriptor::new("greeter").cogs(&[greeter]);
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     HeroRuntime::builder(my_gateway())
//!         .extension(GREETER)
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `builtin-extensions`: bundled `essentials` extension (default)
//! - `command`: clap-parsed command arguments (default)
//! - `toml-config` / `yaml-config`: config file formats
//! - `json-log`: JSON log lines

pub use hero_core as core;
pub use hero_framework as framework;
pub use hero_runtime as runtime;

/// Everything a bot or extension crate usually needs.
///
/// ```rust,ignore
/// use hero::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime
    pub use hero_runtime::{HeroConfig, HeroRuntime, Profile};

    // Extensions, cogs, commands, handlers
    pub use hero_framework::prelude::*;

    // Collaborators
    pub use hero_core::{Cache, GatewayEvent, OutgoingMessage, Store};

    // Logging
    pub use hero_runtime::prelude::*;
}
