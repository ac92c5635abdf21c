//! Completion-service seam and the OpenAI-compatible HTTP implementation.

use crate::error::ChatError;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use log::debug;
use paperchat_store::StoredMessage;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Stream of completion text chunks.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Upstream completion service abstraction.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a streamed completion for the given role-tagged transcript.
    async fn stream_chat(&self, messages: &[StoredMessage]) -> Result<CompletionStream, ChatError>;
}

/// Client for OpenAI-compatible streaming chat-completions endpoints.
pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompletionClient {
    /// Build a client against the given base URL and model.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Parse complete `data:` lines out of the line buffer, forwarding
    /// content deltas. Returns false once the consumer is gone or the
    /// stream is done.
    async fn drain_lines(
        buffer: &mut String,
        tx: &mpsc::Sender<Result<String, ChatError>>,
    ) -> bool {
        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..=pos);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                return false;
            }
            let parsed: StreamChunk = match serde_json::from_str(data) {
                Ok(parsed) => parsed,
                Err(err) => {
                    let _ = tx
                        .send(Err(ChatError::Completion(format!(
                            "bad stream payload: {err}"
                        ))))
                        .await;
                    return false;
                }
            };
            let delta = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content);
            if let Some(content) = delta
                && !content.is_empty()
                && tx.send(Ok(content)).await.is_err()
            {
                debug!("completion consumer dropped; aborting upstream read");
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn stream_chat(&self, messages: &[StoredMessage]) -> Result<CompletionStream, ChatError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|message| WireMessage {
                    role: message.role.as_str(),
                    content: &message.content,
                })
                .collect(),
            stream: true,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ChatError::Completion(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ChatError::Completion(format!(
                "upstream returned status {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        if !Self::drain_lines(&mut buffer, &tx).await {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ChatError::Completion(err.to_string()))).await;
                        return;
                    }
                }
            }
        });
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
