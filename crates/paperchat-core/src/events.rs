//! Wire events pushed to the client over the chat stream.

use serde::{Deserialize, Serialize};

/// One event in the chat response stream: zero or more chunks followed by
/// exactly one terminal `complete` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// Incremental completion text.
    Chunk { content: String },
    /// Successful end of stream with quota metadata.
    Complete {
        remaining_messages: u32,
        message_count: usize,
    },
    /// Terminal failure; no detail about the upstream cause is leaked.
    Error { message: String },
}
