//! In-process store backend guarded by a single coarse lock.

use crate::backend::ChatStore;
use crate::error::StoreError;
use crate::types::{Conversation, RateDecision, Role, StoredMessage};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Per-client hourly rate window.
#[derive(Debug, Clone)]
struct RateWindow {
    count: u32,
    window_start: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    /// client -> paper -> conversation.
    conversations: HashMap<String, HashMap<String, Conversation>>,
    /// client -> hourly counter.
    rate_limits: HashMap<String, RateWindow>,
}

/// Mutex-guarded in-memory backend.
///
/// Valid only for a single server process; multi-process deployments must
/// use `RedisChatStore`. Every operation takes the one lock briefly and the
/// lock is never held across an await point.
pub struct MemoryChatStore {
    tables: Mutex<Tables>,
    max_messages_per_hour: u32,
    inactivity_timeout: Duration,
}

impl MemoryChatStore {
    /// Create a store with the given rate ceiling and inactivity timeout.
    pub fn new(max_messages_per_hour: u32, inactivity_timeout_minutes: u64) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            max_messages_per_hour,
            inactivity_timeout: Duration::minutes(inactivity_timeout_minutes as i64),
        }
    }

    /// Shift a conversation's `last_activity` backwards. Test hook for
    /// exercising the sweep without waiting out the timeout.
    #[cfg(test)]
    fn backdate_activity(&self, client_id: &str, paper_id: &str, by: Duration) {
        let mut tables = self.tables.lock();
        if let Some(conversation) = tables
            .conversations
            .get_mut(client_id)
            .and_then(|papers| papers.get_mut(paper_id))
        {
            conversation.last_activity -= by;
        }
    }

    /// Shift a client's rate window backwards. Test hook for window expiry.
    #[cfg(test)]
    fn backdate_window(&self, client_id: &str, by: Duration) {
        let mut tables = self.tables.lock();
        if let Some(window) = tables.rate_limits.get_mut(client_id) {
            window.window_start -= by;
        }
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_conversation(
        &self,
        client_id: &str,
        paper_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .conversations
            .get(client_id)
            .and_then(|papers| papers.get(paper_id))
            .cloned())
    }

    async fn init_conversation(
        &self,
        client_id: &str,
        paper_id: &str,
        messages: Vec<StoredMessage>,
        message_count: usize,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        // One conversation per client: replacing the whole per-client map
        // drops any conversation for a different paper in the same lock
        // region, so there is no window where both exist.
        let fresh = HashMap::from([(
            paper_id.to_string(),
            Conversation::new(messages, message_count),
        )]);
        let previous = tables.conversations.insert(client_id.to_string(), fresh);
        if previous.is_some_and(|old| !old.is_empty()) {
            info!("superseded existing conversation (client_id={client_id})");
        }
        Ok(())
    }

    async fn add_message(
        &self,
        client_id: &str,
        paper_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        match tables
            .conversations
            .get_mut(client_id)
            .and_then(|papers| papers.get_mut(paper_id))
        {
            Some(conversation) => {
                conversation.messages.push(StoredMessage::new(role, content));
                conversation.message_count += 1;
                conversation.last_activity = Utc::now();
            }
            None => {
                warn!(
                    "add_message on missing conversation (client_id={client_id}, paper_id={paper_id})"
                );
            }
        }
        Ok(())
    }

    async fn delete_conversation(
        &self,
        client_id: &str,
        paper_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        match paper_id {
            Some(paper_id) => {
                if let Some(papers) = tables.conversations.get_mut(client_id) {
                    papers.remove(paper_id);
                    if papers.is_empty() {
                        tables.conversations.remove(client_id);
                    }
                }
            }
            None => {
                tables.conversations.remove(client_id);
            }
        }
        Ok(())
    }

    async fn get_message_count(
        &self,
        client_id: &str,
        paper_id: &str,
    ) -> Result<usize, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .conversations
            .get(client_id)
            .and_then(|papers| papers.get(paper_id))
            .map(|conversation| conversation.message_count)
            .unwrap_or(0))
    }

    async fn check_rate_limit(&self, client_id: &str) -> Result<RateDecision, StoreError> {
        let mut tables = self.tables.lock();
        let now = Utc::now();
        let window = tables
            .rate_limits
            .entry(client_id.to_string())
            .or_insert_with(|| RateWindow {
                count: 0,
                window_start: now,
            });

        if now - window.window_start > Duration::hours(1) {
            window.count = 0;
            window.window_start = now;
        }

        if window.count >= self.max_messages_per_hour {
            return Ok(RateDecision::denied(window.window_start + Duration::hours(1)));
        }
        Ok(RateDecision::allowed(
            self.max_messages_per_hour - window.count,
        ))
    }

    async fn increment_rate_limit(&self, client_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if let Some(window) = tables.rate_limits.get_mut(client_id) {
            window.count += 1;
        }
        Ok(())
    }

    async fn cleanup_inactive(&self) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock();
        let now = Utc::now();
        let timeout = self.inactivity_timeout;
        let mut removed = 0usize;

        tables.conversations.retain(|_, papers| {
            papers.retain(|_, conversation| {
                let keep = now - conversation.last_activity <= timeout;
                if !keep {
                    removed += 1;
                }
                keep
            });
            !papers.is_empty()
        });

        if removed > 0 {
            info!("cleaned up {removed} inactive conversations");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryChatStore;
    use crate::backend::ChatStore;
    use crate::types::{RateDecision, Role, StoredMessage};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn seed() -> Vec<StoredMessage> {
        vec![StoredMessage::new(Role::System, "You are discussing paper X.")]
    }

    #[tokio::test]
    async fn init_for_second_paper_supersedes_first() {
        let store = MemoryChatStore::new(20, 10);
        store
            .init_conversation("c1", "paper-1", seed(), 0)
            .await
            .expect("init");
        store
            .init_conversation("c1", "paper-2", seed(), 0)
            .await
            .expect("init");

        assert_eq!(store.get_conversation("c1", "paper-1").await.expect("get"), None);
        let second = store
            .get_conversation("c1", "paper-2")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(second.message_count, 0);
    }

    #[tokio::test]
    async fn message_count_tracks_appends() {
        let store = MemoryChatStore::new(20, 10);
        store
            .init_conversation("c1", "paper-1", seed(), 0)
            .await
            .expect("init");
        for i in 0..4 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store
                .add_message("c1", "paper-1", role, "text")
                .await
                .expect("add");
        }
        assert_eq!(store.get_message_count("c1", "paper-1").await.expect("count"), 4);

        let conversation = store
            .get_conversation("c1", "paper-1")
            .await
            .expect("get")
            .expect("present");
        // System seed plus four appends.
        assert_eq!(conversation.messages.len(), 5);
    }

    #[tokio::test]
    async fn add_message_on_missing_conversation_is_noop() {
        let store = MemoryChatStore::new(20, 10);
        store
            .add_message("c1", "paper-1", Role::User, "text")
            .await
            .expect("add");
        assert_eq!(store.get_message_count("c1", "paper-1").await.expect("count"), 0);
    }

    #[tokio::test]
    async fn delete_without_paper_removes_everything_for_client() {
        let store = MemoryChatStore::new(20, 10);
        store
            .init_conversation("c1", "paper-1", seed(), 0)
            .await
            .expect("init");
        store.delete_conversation("c1", None).await.expect("delete");
        assert_eq!(store.get_conversation("c1", "paper-1").await.expect("get"), None);
        // Idempotent on a now-missing client.
        store.delete_conversation("c1", None).await.expect("delete");
    }

    #[tokio::test]
    async fn rate_limit_denies_at_ceiling_and_resets_after_window() {
        let store = MemoryChatStore::new(20, 10);
        let first = store.check_rate_limit("c1").await.expect("check");
        assert_eq!(first, RateDecision::allowed(20));

        for _ in 0..20 {
            store.increment_rate_limit("c1").await.expect("increment");
        }
        let denied = store.check_rate_limit("c1").await.expect("check");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.reset_at.is_some());

        store.backdate_window("c1", Duration::minutes(61));
        let reset = store.check_rate_limit("c1").await.expect("check");
        assert_eq!(reset, RateDecision::allowed(20));
    }

    #[tokio::test]
    async fn increment_before_check_does_not_create_counter() {
        let store = MemoryChatStore::new(20, 10);
        store.increment_rate_limit("c1").await.expect("increment");
        let decision = store.check_rate_limit("c1").await.expect("check");
        assert_eq!(decision, RateDecision::allowed(20));
    }

    #[tokio::test]
    async fn cleanup_removes_conversations_past_the_timeout() {
        let store = MemoryChatStore::new(20, 10);
        store
            .init_conversation("c1", "paper-1", seed(), 0)
            .await
            .expect("init");
        store
            .init_conversation("c2", "paper-2", seed(), 0)
            .await
            .expect("init");
        store.backdate_activity("c1", "paper-1", Duration::minutes(11));

        assert_eq!(store.cleanup_inactive().await.expect("cleanup"), 1);
        assert_eq!(store.get_conversation("c1", "paper-1").await.expect("get"), None);
        assert!(
            store
                .get_conversation("c2", "paper-2")
                .await
                .expect("get")
                .is_some()
        );
    }
}
