//! Error taxonomy for chat request handling.

use chrono::{DateTime, Utc};
use paperchat_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the chat service.
///
/// Every variant is scoped to a single request; none should take the
/// process down.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request carried no message text.
    #[error("message must not be empty")]
    EmptyMessage,
    /// The message exceeds the per-message token budget.
    #[error("message too long ({tokens} tokens, limit {max})")]
    MessageTooLong { tokens: usize, max: usize },
    /// The client's hourly quota is spent.
    #[error("rate limit exceeded")]
    RateLimited { reset_at: Option<DateTime<Utc>> },
    /// The conversation reached its message cap; the client must clear it.
    #[error("conversation limit reached ({max} messages)")]
    ConversationLimit { max: usize },
    /// The conversation sat idle past the timeout and was removed.
    #[error("conversation timed out due to inactivity")]
    InactivityTimeout,
    /// No paper with this id exists in the catalog.
    #[error("unknown paper: {0}")]
    UnknownPaper(String),
    /// A required collaborator is not configured.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(&'static str),
    /// Store backend failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    /// Upstream completion failure.
    #[error("completion error: {0}")]
    Completion(String),
}
