//! Chat orchestration for the paperchat service.
//!
//! This crate owns the request protocol that drives the store: validation,
//! rate limiting, conversation lookup-or-create, inactivity handling, and
//! the streamed completion with deferred persistence. The paper catalog,
//! completion service, and analytics sink are capability seams so the
//! server and tests can supply their own implementations.

pub mod analytics;
pub mod catalog;
pub mod cleanup;
pub mod completion;
mod error;
mod events;
mod service;

pub use analytics::{MessageLog, MessageLogRecord, NoopMessageLog, SqliteMessageLog};
pub use catalog::{FileCatalog, Paper, PaperCatalog};
pub use cleanup::spawn_cleanup_task;
pub use completion::{CompletionClient, CompletionStream, OpenAiCompletionClient};
pub use error::ChatError;
pub use events::ChatEvent;
pub use service::{ChatService, estimate_tokens};
