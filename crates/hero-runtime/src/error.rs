//! Runtime error types.

use hero_core::GatewayError;
use hero_framework::LifecycleError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop a Hero runtime from starting or running.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An extension operation requested through the runtime failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The gateway refused to connect or close.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// `start` was called twice.
    #[error("Runtime is already running")]
    AlreadyRunning,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
