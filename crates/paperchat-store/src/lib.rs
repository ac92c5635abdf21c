//! Conversation and rate-limit storage for the paperchat service.
//!
//! This crate owns the value types, the `ChatStore` capability trait, and
//! the two interchangeable backends: a mutex-guarded in-process table and a
//! TTL-based Redis cache usable across multiple server processes.

mod backend;
mod error;
mod memory;
mod redis_store;
mod types;

pub use backend::ChatStore;
pub use error::StoreError;
pub use memory::MemoryChatStore;
pub use redis_store::RedisChatStore;
pub use types::{Conversation, RateDecision, Role, StoredMessage};
