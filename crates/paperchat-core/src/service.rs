//! The chat request protocol: validation, rate limiting, conversation
//! lookup-or-create, inactivity handling, and streamed completion with
//! deferred persistence.

use crate::analytics::{MessageLog, MessageLogRecord};
use crate::catalog::{Paper, PaperCatalog};
use crate::completion::CompletionClient;
use crate::error::ChatError;
use crate::events::ChatEvent;
use chrono::{Duration, Utc};
use log::{debug, error, warn};
use paperchat_config::LimitsConfig;
use paperchat_store::{ChatStore, Conversation, Role, StoredMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Approximate token count for a message: four characters per token.
/// Deliberately rough; quota math only needs a best-effort estimate.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Orchestrator for chat requests. Holds the store as its only persistent
/// dependency; catalog, completion, and analytics are injected seams.
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    catalog: Arc<dyn PaperCatalog>,
    completion: Option<Arc<dyn CompletionClient>>,
    analytics: Arc<dyn MessageLog>,
    limits: LimitsConfig,
}

impl ChatService {
    /// Assemble the service from its collaborators.
    pub fn new(
        store: Arc<dyn ChatStore>,
        catalog: Arc<dyn PaperCatalog>,
        completion: Option<Arc<dyn CompletionClient>>,
        analytics: Arc<dyn MessageLog>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            completion,
            analytics,
            limits,
        }
    }

    /// Handle one chat request end to end.
    ///
    /// Returns the event stream on success: zero or more `chunk` events and
    /// one terminal event. Rejections before the stream starts come back as
    /// `ChatError`. If the client goes away mid-stream the partial
    /// assistant text is dropped unpersisted; the user message and the
    /// rate-limit increment are not rolled back.
    pub async fn chat(
        &self,
        client_id: &str,
        paper_id: &str,
        message: &str,
        source_addr: Option<String>,
    ) -> Result<ReceiverStream<ChatEvent>, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let tokens = estimate_tokens(message);
        if tokens > self.limits.max_message_tokens {
            return Err(ChatError::MessageTooLong {
                tokens,
                max: self.limits.max_message_tokens,
            });
        }
        let completion = self
            .completion
            .clone()
            .ok_or(ChatError::ServiceUnavailable("completion client not configured"))?;

        let decision = self.store.check_rate_limit(client_id).await?;
        if !decision.allowed {
            return Err(ChatError::RateLimited {
                reset_at: decision.reset_at,
            });
        }

        let conversation = match self.store.get_conversation(client_id, paper_id).await? {
            Some(conversation) => conversation,
            None => self.start_conversation(client_id, paper_id).await?,
        };

        // The cap counts user turns; each full turn stores two messages.
        let user_turns = conversation.message_count.div_ceil(2);
        if user_turns >= self.limits.max_conversation_messages {
            return Err(ChatError::ConversationLimit {
                max: self.limits.max_conversation_messages,
            });
        }

        let timeout = Duration::minutes(self.limits.inactivity_timeout_minutes as i64);
        if Utc::now() - conversation.last_activity > timeout {
            // The request that discovers the timeout is not served; the
            // client retries and starts fresh.
            self.store
                .delete_conversation(client_id, Some(paper_id))
                .await?;
            return Err(ChatError::InactivityTimeout);
        }

        self.store
            .add_message(client_id, paper_id, Role::User, message)
            .await?;
        self.log_message(client_id, paper_id, Role::User, message, source_addr.clone());
        self.store.increment_rate_limit(client_id).await?;

        let mut transcript = conversation.messages;
        transcript.push(StoredMessage::new(Role::User, message));
        let mut upstream = completion.stream_chat(&transcript).await?;

        let remaining_messages = decision.remaining.saturating_sub(1);
        let store = self.store.clone();
        let analytics = self.analytics.clone();
        let client_id = client_id.to_string();
        let paper_id = paper_id.to_string();

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            use futures_util::StreamExt;

            let mut accumulated = String::new();
            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(content) => {
                        accumulated.push_str(&content);
                        if tx.send(ChatEvent::Chunk { content }).await.is_err() {
                            debug!(
                                "client disconnected mid-stream, dropping partial reply (client_id={client_id}, paper_id={paper_id})"
                            );
                            return;
                        }
                    }
                    Err(err) => {
                        error!("completion stream failed (client_id={client_id}): {err}");
                        let _ = tx
                            .send(ChatEvent::Error {
                                message: "completion service failed".to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }

            // Single persistence step now the full reply is in hand.
            if let Err(err) = store
                .add_message(&client_id, &paper_id, Role::Assistant, &accumulated)
                .await
            {
                error!("failed to persist assistant reply (client_id={client_id}): {err}");
                let _ = tx
                    .send(ChatEvent::Error {
                        message: "failed to save reply".to_string(),
                    })
                    .await;
                return;
            }
            let assistant_record = MessageLogRecord {
                client_id: client_id.clone(),
                paper_id: paper_id.clone(),
                role: Role::Assistant,
                content: accumulated.clone(),
                token_count: estimate_tokens(&accumulated),
                source_addr,
                timestamp: Utc::now(),
            };
            if let Err(err) = analytics.record(&assistant_record) {
                warn!("analytics write failed (client_id={client_id}): {err}");
            }

            let message_count = match store.get_message_count(&client_id, &paper_id).await {
                Ok(stored) => stored.div_ceil(2),
                Err(err) => {
                    warn!("post-stream count read failed (client_id={client_id}): {err}");
                    user_turns + 1
                }
            };
            let _ = tx
                .send(ChatEvent::Complete {
                    remaining_messages,
                    message_count,
                })
                .await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Delete the client's conversation for a paper. Idempotent.
    pub async fn clear(&self, client_id: &str, paper_id: &str) -> Result<(), ChatError> {
        self.store
            .delete_conversation(client_id, Some(paper_id))
            .await?;
        Ok(())
    }

    /// Create and install a conversation seeded from the paper catalog.
    async fn start_conversation(
        &self,
        client_id: &str,
        paper_id: &str,
    ) -> Result<Conversation, ChatError> {
        let paper = self
            .catalog
            .paper(paper_id)
            .ok_or_else(|| ChatError::UnknownPaper(paper_id.to_string()))?;
        let body = self.catalog.body_text(paper_id).unwrap_or_default();
        let seed = vec![StoredMessage::new(Role::System, seed_prompt(&paper, &body))];
        self.store
            .init_conversation(client_id, paper_id, seed.clone(), 0)
            .await?;
        Ok(Conversation::new(seed, 0))
    }

    /// Record a message in the analytics sink; failures never fail the
    /// request.
    fn log_message(
        &self,
        client_id: &str,
        paper_id: &str,
        role: Role,
        content: &str,
        source_addr: Option<String>,
    ) {
        let record = MessageLogRecord {
            client_id: client_id.to_string(),
            paper_id: paper_id.to_string(),
            role,
            content: content.to_string(),
            token_count: estimate_tokens(content),
            source_addr,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.analytics.record(&record) {
            warn!("analytics write failed (client_id={client_id}): {err}");
        }
    }
}

/// Build the system seed that pins the assistant to one paper.
fn seed_prompt(paper: &Paper, body: &str) -> String {
    let mut prompt = format!(
        "You are an assistant answering questions about the paper \"{}\"",
        paper.title
    );
    if !paper.authors.is_empty() {
        prompt.push_str(&format!(" by {}", paper.authors.join(", ")));
    }
    match (paper.year, paper.venue.as_deref()) {
        (Some(year), Some(venue)) => prompt.push_str(&format!(" ({venue}, {year})")),
        (Some(year), None) => prompt.push_str(&format!(" ({year})")),
        (None, Some(venue)) => prompt.push_str(&format!(" ({venue})")),
        (None, None) => {}
    }
    prompt.push_str(
        ".\nAnswer only questions about this paper, using the text below. \
         If a question is unrelated to the paper, say so briefly.\n\n",
    );
    prompt.push_str(body);
    prompt
}

#[cfg(test)]
mod tests {
    use super::{estimate_tokens, seed_prompt};
    use crate::catalog::Paper;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn seed_prompt_includes_metadata_and_body() {
        let paper = Paper {
            id: "paper-42".to_string(),
            title: "A Study".to_string(),
            authors: vec!["Doe".to_string(), "Roe".to_string()],
            year: Some(2021),
            venue: Some("ICML".to_string()),
        };
        let prompt = seed_prompt(&paper, "Body text.");
        assert!(prompt.contains("\"A Study\""));
        assert!(prompt.contains("Doe, Roe"));
        assert!(prompt.contains("(ICML, 2021)"));
        assert!(prompt.ends_with("Body text."));
    }
}
