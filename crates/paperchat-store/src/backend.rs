//! Capability interface implemented by both store backends.

use crate::error::StoreError;
use crate::types::{Conversation, RateDecision, Role, StoredMessage};
use async_trait::async_trait;

/// Storage abstraction for conversations and rate-limit counters.
///
/// The store is the sole owner of both record types. Callers hold loaded
/// records only transiently; a record may be mutated or evicted by another
/// request between two calls.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Fetch the conversation for a (client, paper) pair.
    ///
    /// The redis backend refreshes the entry's expiration on hit; the
    /// memory backend leaves expiry to the sweep.
    async fn get_conversation(
        &self,
        client_id: &str,
        paper_id: &str,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Install a new conversation, destroying any other conversation the
    /// client holds. At most one conversation per client is live at any
    /// instant; the destroy-then-install pair is atomic.
    async fn init_conversation(
        &self,
        client_id: &str,
        paper_id: &str,
        messages: Vec<StoredMessage>,
        message_count: usize,
    ) -> Result<(), StoreError>;

    /// Append a message, increment the count, and bump `last_activity`.
    /// No-op (with a warning) if the conversation does not exist.
    async fn add_message(
        &self,
        client_id: &str,
        paper_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    /// Delete one conversation, or all of the client's conversations when
    /// `paper_id` is `None`. Idempotent.
    async fn delete_conversation(
        &self,
        client_id: &str,
        paper_id: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Current user+assistant message count; 0 if the conversation is absent.
    async fn get_message_count(
        &self,
        client_id: &str,
        paper_id: &str,
    ) -> Result<usize, StoreError>;

    /// Check the client's hourly quota, lazily initializing the counter and
    /// resetting it when the window has expired.
    ///
    /// The redis backend fails open here: a backend error yields an allowed
    /// decision with full remaining quota.
    async fn check_rate_limit(&self, client_id: &str) -> Result<RateDecision, StoreError>;

    /// Increment the hourly counter. Does not check the limit; callers run
    /// `check_rate_limit` first. Between the check and the increment another
    /// request for the same client can also pass the check, so the enforced
    /// limit is soft under concurrency.
    async fn increment_rate_limit(&self, client_id: &str) -> Result<(), StoreError>;

    /// Remove conversations past the inactivity timeout, returning how many
    /// were removed. No-op for the redis backend, where expiration is
    /// automatic; it exists there for interface parity.
    async fn cleanup_inactive(&self) -> Result<usize, StoreError>;
}
