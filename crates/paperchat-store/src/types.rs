//! Value types shared by the store backends and the chat service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Speaker role for a stored message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Seeded paper-context message.
    System,
    /// Visitor-authored message.
    User,
    /// Completion-service message.
    Assistant,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a role from a lowercase string.
    pub fn parse(value: &str) -> Self {
        if value == "system" {
            Role::System
        } else if value == "assistant" {
            Role::Assistant
        } else {
            Role::User
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Role::parse(value))
    }
}

/// Message stored in a conversation transcript. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    /// Role that produced the message.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl StoredMessage {
    /// Build a message from a role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Stored conversation for one (client, paper) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Ordered transcript, starting with the seeded system message.
    pub messages: Vec<StoredMessage>,
    /// Count of user+assistant messages; excludes the system seed.
    pub message_count: usize,
    /// Timestamp of the most recent append or creation.
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    /// Build a fresh conversation from seed messages.
    pub fn new(messages: Vec<StoredMessage>, message_count: usize) -> Self {
        Self {
            messages,
            message_count,
            last_activity: Utc::now(),
        }
    }
}

/// Outcome of a rate-limit check for one client.
#[derive(Debug, Clone, PartialEq)]
pub struct RateDecision {
    /// Whether the client is under the limit.
    pub allowed: bool,
    /// Messages remaining in the current window.
    pub remaining: u32,
    /// When the window resets; set only when the limit is hit.
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateDecision {
    /// Decision that admits the request with the given remaining quota.
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at: None,
        }
    }

    /// Decision that rejects the request until the window resets.
    pub fn denied(reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at: Some(reset_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Conversation, Role, StoredMessage};
    use pretty_assertions::assert_eq;

    #[test]
    fn role_parses_and_formats() {
        assert_eq!(Role::parse("system"), Role::System);
        assert_eq!(Role::parse("assistant"), Role::Assistant);
        assert_eq!(Role::parse("user"), Role::User);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn conversation_round_trips_through_json() {
        let conversation = Conversation::new(
            vec![
                StoredMessage::new(Role::System, "You are discussing paper X."),
                StoredMessage::new(Role::User, "What dataset did the authors use?"),
            ],
            1,
        );
        let encoded = serde_json::to_string(&conversation).expect("encode");
        let decoded: Conversation = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.messages, conversation.messages);
        assert_eq!(decoded.message_count, conversation.message_count);
    }
}
