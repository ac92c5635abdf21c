//! Redis store backend for multi-process deployments.
//!
//! Every conversation and rate counter is a TTL'd value, so expiry needs no
//! sweep. Key shapes:
//! - `chat:session:{client}:{paper}` -> JSON conversation, TTL = inactivity timeout
//! - `rate_limit:{client}:hour`      -> counter, one-hour TTL
//! - `chat:sessions:{client}`        -> set of the client's active paper ids
//!
//! The sessions set exists so "destroy all others for this client" works
//! without a key scan; it carries the same TTL as the conversations it
//! indexes. Multi-step sequences are best-effort rather than transactional;
//! a failure mid-sequence leaves entries that self-heal via expiration.

use crate::backend::ChatStore;
use crate::error::StoreError;
use crate::types::{Conversation, RateDecision, Role, StoredMessage};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::{debug, info, warn};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Rate windows always span one hour.
const RATE_WINDOW_SECS: u64 = 3600;

/// Redis-backed implementation of `ChatStore`.
pub struct RedisChatStore {
    conn: ConnectionManager,
    max_messages_per_hour: u32,
    inactivity_ttl_secs: u64,
}

impl RedisChatStore {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(
        url: &str,
        max_messages_per_hour: u32,
        inactivity_ttl_secs: u64,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        info!("connected to redis chat store");
        Ok(Self {
            conn,
            max_messages_per_hour,
            inactivity_ttl_secs,
        })
    }

    fn conversation_key(client_id: &str, paper_id: &str) -> String {
        format!("chat:session:{client_id}:{paper_id}")
    }

    fn rate_limit_key(client_id: &str) -> String {
        format!("rate_limit:{client_id}:hour")
    }

    fn sessions_key(client_id: &str) -> String {
        format!("chat:sessions:{client_id}")
    }

    /// Rate-limit check body; errors here are caught by the fail-open wrapper.
    async fn try_check_rate_limit(&self, client_id: &str) -> Result<RateDecision, StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::rate_limit_key(client_id);

        let count: Option<u32> = conn.get(&key).await?;
        let count = count.unwrap_or(0);

        if count == 0 {
            // Fresh window: install the counter with a one-hour TTL.
            let _: () = conn.set_ex(&key, 0u32, RATE_WINDOW_SECS).await?;
        }

        if count >= self.max_messages_per_hour {
            let ttl: i64 = conn.ttl(&key).await?;
            if ttl > 0 {
                return Ok(RateDecision::denied(Utc::now() + Duration::seconds(ttl)));
            }
            // The window expired between the read and the TTL query; reset
            // and deny this request without a reset time.
            let _: () = conn.set_ex(&key, 0u32, RATE_WINDOW_SECS).await?;
            return Ok(RateDecision {
                allowed: false,
                remaining: 0,
                reset_at: None,
            });
        }

        Ok(RateDecision::allowed(self.max_messages_per_hour - count))
    }
}

#[async_trait]
impl ChatStore for RedisChatStore {
    async fn get_conversation(
        &self,
        client_id: &str,
        paper_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::conversation_key(client_id, paper_id);
        let data: Option<String> = conn.get(&key).await?;
        match data {
            Some(data) => {
                // Sliding expiry: reads keep an active conversation alive.
                let _: () = conn.expire(&key, self.inactivity_ttl_secs as i64).await?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn init_conversation(
        &self,
        client_id: &str,
        paper_id: &str,
        messages: Vec<StoredMessage>,
        message_count: usize,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let sessions_key = Self::sessions_key(client_id);
        let existing: Vec<String> = conn.smembers(&sessions_key).await?;

        let conversation = Conversation::new(messages, message_count);
        let payload = serde_json::to_string(&conversation)?;
        let key = Self::conversation_key(client_id, paper_id);

        // Destroy-then-install runs as one pipeline so no other conversation
        // for this client survives alongside the new one.
        let mut pipe = redis::pipe();
        for old_paper in &existing {
            pipe.del(Self::conversation_key(client_id, old_paper));
        }
        pipe.del(&sessions_key)
            .set_ex(&key, payload, self.inactivity_ttl_secs)
            .sadd(&sessions_key, paper_id)
            .expire(&sessions_key, self.inactivity_ttl_secs as i64);
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn add_message(
        &self,
        client_id: &str,
        paper_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::conversation_key(client_id, paper_id);

        let data: Option<String> = conn.get(&key).await?;
        let Some(data) = data else {
            warn!(
                "add_message on missing conversation (client_id={client_id}, paper_id={paper_id})"
            );
            return Ok(());
        };

        let mut conversation: Conversation = serde_json::from_str(&data)?;
        conversation.messages.push(StoredMessage::new(role, content));
        conversation.message_count += 1;
        conversation.last_activity = Utc::now();

        let payload = serde_json::to_string(&conversation)?;
        let _: () = conn.set_ex(&key, payload, self.inactivity_ttl_secs).await?;
        let _: () = conn
            .expire(&Self::sessions_key(client_id), self.inactivity_ttl_secs as i64)
            .await?;
        Ok(())
    }

    async fn delete_conversation(
        &self,
        client_id: &str,
        paper_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let sessions_key = Self::sessions_key(client_id);

        match paper_id {
            Some(paper_id) => {
                let _: () = conn.del(Self::conversation_key(client_id, paper_id)).await?;
                let _: () = conn.srem(&sessions_key, paper_id).await?;
                let members: i64 = conn.scard(&sessions_key).await?;
                if members == 0 {
                    let _: () = conn.del(&sessions_key).await?;
                }
            }
            None => {
                let papers: Vec<String> = conn.smembers(&sessions_key).await?;
                let mut pipe = redis::pipe();
                for paper in &papers {
                    pipe.del(Self::conversation_key(client_id, paper));
                }
                pipe.del(&sessions_key);
                let _: () = pipe.query_async(&mut conn).await?;
            }
        }
        Ok(())
    }

    async fn get_message_count(
        &self,
        client_id: &str,
        paper_id: &str,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn
            .get(Self::conversation_key(client_id, paper_id))
            .await?;
        match data {
            Some(data) => {
                let conversation: Conversation = serde_json::from_str(&data)?;
                Ok(conversation.message_count)
            }
            None => Ok(0),
        }
    }

    async fn check_rate_limit(&self, client_id: &str) -> Result<RateDecision, StoreError> {
        match self.try_check_rate_limit(client_id).await {
            Ok(decision) => Ok(decision),
            Err(err) => {
                // Fail open: an unreachable cache degrades to "unlimited"
                // rather than making the chat unusable.
                warn!("rate limit check failed, allowing request (client_id={client_id}): {err}");
                Ok(RateDecision::allowed(self.max_messages_per_hour))
            }
        }
    }

    async fn increment_rate_limit(&self, client_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::rate_limit_key(client_id);
        match conn.incr::<_, _, i64>(&key, 1).await {
            Ok(new_count) => {
                if new_count == 1 {
                    // First write in a fresh key; attach the window TTL now.
                    let _: () = conn.expire(&key, RATE_WINDOW_SECS as i64).await?;
                }
                Ok(())
            }
            Err(err) => {
                // Best effort, same availability stance as the check.
                warn!("rate limit increment failed (client_id={client_id}): {err}");
                Ok(())
            }
        }
    }

    async fn cleanup_inactive(&self) -> Result<usize, StoreError> {
        // TTLs already evict stale entries; present for interface parity.
        debug!("cleanup_inactive called on redis backend; expiry is automatic");
        Ok(0)
    }
}
