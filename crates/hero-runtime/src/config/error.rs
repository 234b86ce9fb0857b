//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating the configuration.
///
/// All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The merged sources could not be extracted into [`HeroConfig`](super::HeroConfig).
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// A value is present but not acceptable.
    #[error("Invalid configuration: {message}")]
    ValidationError { message: String },

    /// A storage or cache backend this build cannot provide.
    #[error("Unsupported {kind} backend: {name}")]
    UnsupportedBackend { kind: &'static str, name: String },

    /// `HERO_PROFILE` or `--profile` named an unknown profile.
    #[error("Unknown profile '{0}', expected 'test' or 'prod'")]
    InvalidProfile(String),
}

impl ConfigError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Creates an unsupported-backend error.
    pub fn unsupported_backend(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            kind,
            name: name.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
