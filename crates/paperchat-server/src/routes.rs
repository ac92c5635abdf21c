//! HTTP surface: chat endpoints, SSE encoding, and cookie identity.

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use futures_util::StreamExt;
use log::warn;
use paperchat_core::{ChatError, ChatService};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const SESSION_COOKIE: &str = "chat_session";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
}

/// Assemble the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/clear", post(clear))
        .with_state(state)
}

#[derive(Deserialize)]
struct ChatRequest {
    paper_id: String,
    message: String,
}

#[derive(Deserialize)]
struct ClearRequest {
    paper_id: String,
}

/// Client identity resolved from the session cookie, minting a fresh id
/// (and a `Set-Cookie` header) when the cookie is absent.
struct Identity {
    client_id: String,
    set_cookie: Option<HeaderValue>,
}

impl Identity {
    fn resolve(headers: &HeaderMap) -> Self {
        if let Some(client_id) = session_cookie(headers) {
            return Self {
                client_id,
                set_cookie: None,
            };
        }
        let client_id = Uuid::new_v4().to_string();
        let cookie = format!("{SESSION_COOKIE}={client_id}; Path=/; HttpOnly; SameSite=Lax");
        Self {
            client_id,
            // The cookie value is a UUID and the attributes are fixed, so
            // this cannot produce an invalid header value.
            set_cookie: HeaderValue::from_str(&cookie).ok(),
        }
    }

    fn apply(self, mut response: Response) -> Response {
        if let Some(value) = self.set_cookie {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        response
    }
}

/// Extract the session id from the `Cookie` header, if present.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

/// Best-effort client source address from the usual proxy header.
fn source_addr(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let identity = Identity::resolve(&headers);
    let stream = state
        .service
        .chat(
            &identity.client_id,
            &request.paper_id,
            &request.message,
            source_addr(&headers),
        )
        .await;

    let response = match stream {
        Ok(events) => {
            let events = events.map(|event| {
                // Every event serializes; the variants hold only strings
                // and integers.
                let data = serde_json::to_string(&event).unwrap_or_default();
                Ok::<Event, Infallible>(Event::default().data(data))
            });
            Sse::new(events)
                .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
                .into_response()
        }
        Err(err) => reject(err),
    };
    identity.apply(response)
}

async fn clear(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ClearRequest>,
) -> Response {
    let identity = Identity::resolve(&headers);
    let response = match state
        .service
        .clear(&identity.client_id, &request.paper_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => reject(err),
    };
    identity.apply(response)
}

/// Map a rejection to its HTTP status and a JSON error body.
fn reject(err: ChatError) -> Response {
    let status = match &err {
        ChatError::EmptyMessage | ChatError::MessageTooLong { .. } | ChatError::UnknownPaper(_) => {
            StatusCode::BAD_REQUEST
        }
        ChatError::RateLimited { .. } | ChatError::ConversationLimit { .. } => {
            StatusCode::TOO_MANY_REQUESTS
        }
        ChatError::InactivityTimeout => StatusCode::REQUEST_TIMEOUT,
        ChatError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Completion(_) => StatusCode::BAD_GATEWAY,
        ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("request rejected with {status}: {err}");
    }
    let mut body = json!({ "error": err.to_string() });
    if let ChatError::RateLimited {
        reset_at: Some(reset_at),
    } = &err
    {
        body["reset_at"] = json!(reset_at.to_rfc3339());
    }
    (status, Json(body)).into_response()
}
