//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, CacheConfig, ExtensionsConfig, HeroConfig, StoreConfig};

/// Cache backend names this build can provide.
pub(crate) const CACHE_BACKENDS: &[&str] = &["memory", "simple"];
/// Store backend names this build can provide.
pub(crate) const STORE_BACKENDS: &[&str] = &["memory"];

/// Validates the entire configuration.
pub fn validate_config(config: &HeroConfig) -> ConfigResult<()> {
    validate_bot(&config.bot)?;
    validate_extensions(&config.extensions)?;
    validate_backends(&config.cache, &config.store)?;

    if config.tasks.cancel_grace_ms == 0 {
        return Err(ConfigError::validation(
            "tasks.cancel_grace_ms must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_bot(bot: &BotConfig) -> ConfigResult<()> {
    if bot.namespace.trim().is_empty() {
        return Err(ConfigError::validation("bot.namespace cannot be empty"));
    }

    if bot.prefixes.is_empty() {
        return Err(ConfigError::validation(
            "bot.prefixes needs at least one prefix",
        ));
    }

    if bot.prefixes.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::validation("bot.prefixes cannot contain an empty prefix"));
    }

    Ok(())
}

fn validate_extensions(extensions: &ExtensionsConfig) -> ConfigResult<()> {
    let disabled: HashSet<&str> = extensions.disabled.iter().map(String::as_str).collect();

    if let Some(name) = extensions
        .enabled
        .iter()
        .find(|name| disabled.contains(name.as_str()))
    {
        return Err(ConfigError::validation(format!(
            "extension '{name}' is both enabled and disabled"
        )));
    }

    Ok(())
}

fn validate_backends(cache: &CacheConfig, store: &StoreConfig) -> ConfigResult<()> {
    if !CACHE_BACKENDS.contains(&cache.backend.to_lowercase().as_str()) {
        return Err(ConfigError::unsupported_backend("cache", &cache.backend));
    }

    if !STORE_BACKENDS.contains(&store.backend.to_lowercase().as_str()) {
        return Err(ConfigError::unsupported_backend("store", &store.backend));
    }

    Ok(())
}
