use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::ChatMessage;
use crate::llm::{LlmService, DEFAULT_MAX_TOKENS};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatHistoryItem {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatHistory {
    pub messages: Vec<ChatHistoryItem>,
}

/// Streams the generated reply as a chunked plain-text body, one fragment
/// per chunk, in generation order. A mid-stream engine failure ends the
/// body; whatever was already flushed stays flushed.
pub async fn chat_completion(
    State(state): State<AppState>,
    Json(data): Json<ChatHistory>,
) -> Response {
    let history: Vec<ChatMessage> = data
        .messages
        .into_iter()
        .map(|item| ChatMessage {
            role: item.role,
            content: item.content,
        })
        .collect();

    let generation_id = Uuid::new_v4();
    tracing::info!(%generation_id, turns = history.len(), "starting chat completion");

    let service = LlmService::new(state.engine().await);
    let fragments = service.generate(history, DEFAULT_MAX_TOKENS, Vec::new());

    let body = Body::from_stream(fragments.map(move |fragment| match fragment {
        Ok(text) => Ok(Bytes::from(text)),
        Err(e) => {
            tracing::error!(%generation_id, error = %e, "generation failed mid-stream");
            Err(std::io::Error::other(e.to_string()))
        }
    }));

    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}
