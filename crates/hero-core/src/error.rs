//! Error types for the collaborator interfaces.

use thiserror::Error;

/// Errors raised by a [`Gateway`](crate::Gateway) implementation.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The gateway (or its event sink) has been closed.
    #[error("gateway closed")]
    Closed,

    /// Connecting to the platform failed.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// An outbound message could not be delivered.
    #[error("failed to send message: {0}")]
    Send(String),
}

impl GatewayError {
    /// Creates a send error.
    pub fn send(msg: impl Into<String>) -> Self {
        Self::Send(msg.into())
    }
}

/// Errors raised by a [`Store`](crate::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend rejected the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A record or settings value could not be (de)serialised.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Errors raised by a [`CacheBackend`](crate::CacheBackend).
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend rejected the operation.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// A cached value could not be (de)serialised.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
