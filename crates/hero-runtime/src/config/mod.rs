//! Configuration for a Hero bot.
//!
//! [`HeroConfig`] is loaded once at startup by the figment-based
//! [`ConfigLoader`], checked by [`validate_config`] and then turned into the
//! framework's immutable [`CoreConfig`](hero_framework::CoreConfig).

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, CacheConfig, CommandsConfig, ExtensionsConfig, HeroConfig, LogFormat, LogLevel,
    LogOutput, LogRotation, LoggingConfig, SpanEventConfig, StoreConfig, TasksConfig,
};
pub use validation::validate_config;
