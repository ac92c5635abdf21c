//! Error types for the store backends.

use thiserror::Error;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// A cached value failed to encode or decode.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Backend-agnostic failure surfaced to callers.
    #[error("storage error: {0}")]
    Backend(String),
}
