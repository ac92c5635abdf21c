//! Configuration models and environment loading.
//!
//! This crate owns the paperchat config schema, defaults, and the
//! environment-variable loader used by the server binary.

mod error;
mod model;

/// Public error type returned by config loading and validation APIs.
pub use error::ConfigError;
/// Configuration schema models.
pub use model::*;
