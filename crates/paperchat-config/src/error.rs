//! Error types for config loading and validation.

use thiserror::Error;

/// Errors returned while loading or validating config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that does not parse.
    #[error("invalid value for {name}: {message}")]
    InvalidVar { name: String, message: String },
    /// A required setting is missing for the selected configuration.
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    /// Generic validation failure.
    #[error("invalid config: {0}")]
    Invalid(String),
}
