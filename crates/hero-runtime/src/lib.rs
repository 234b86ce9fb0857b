//! # Hero Runtime
//!
//! Everything around the framework that a running bot process needs:
//!
//! - [`HeroConfig`] loaded with figment from defaults, `hero.<profile>.toml`,
//!   `hero.toml` and `HERO_*` environment variables
//! - [`LoggingBuilder`] for the global `tracing` subscriber
//! - [`HeroRuntime`]: boot, event pump and signal-driven shutdown
//!
//! ```rust,ignore
//! use hero_runtime::HeroRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = HeroRuntime::builder(my_gateway())
//!         .extension(moderation::DESCRIPTOR)
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, HeroConfig, Profile, load_config,
    load_config_from_file, validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingGuard, SpanEvents};
pub use runtime::{HeroRuntime, RuntimeBuilder, shutdown_signal};

// Re-export tracing for use by extension crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
