use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use memoh_core::{Attachment, ChatRequest, ConversationType};
use memoh_store::PersistedMessage;
use serde::Deserialize;

use crate::app::AppState;
use crate::http::ApiError;

/// §3's note that bot-scoped chats have `BotID == ChatID` — these handlers
/// never take a separate chat id, they derive it from the path.
fn chat_request(bot_id: String, body: SendMessageBody) -> ChatRequest {
    ChatRequest {
        bot_id: bot_id.clone(),
        chat_id: bot_id,
        query: body.query,
        attachments: body.attachments.unwrap_or_default(),
        messages: Vec::new(),
        model: body.model,
        provider: body.provider,
        skills: body.skills.unwrap_or_default(),
        channels: vec!["http".to_string()],
        current_channel: Some("http".to_string()),
        conversation_type: ConversationType::Direct,
        source_channel_identity_id: None,
        user_id: body.user_id,
        display_name: body.display_name,
        external_message_id: body.external_message_id,
        route_id: None,
        container_id: None,
        token: None,
        max_context_load_time: body.max_context_load_time.unwrap_or(0),
        user_message_persisted: false,
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub external_message_id: Option<String>,
    #[serde(default)]
    pub max_context_load_time: Option<i64>,
}

/// `POST /bots/{bot_id}/messages`.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Json<Vec<PersistedMessage>>, ApiError> {
    let req = chat_request(bot_id.clone(), body);
    let messages = state.resolver.chat(&req).await?;
    state.events.publish(&bot_id, &bot_id);
    Ok(Json(messages))
}

/// `POST /bots/{bot_id}/messages/stream`, SSE-framed per §4.1's encode side.
pub async fn stream_message(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Response, ApiError> {
    let req = chat_request(bot_id.clone(), body);
    let mut rx = state.resolver.stream_chat(req).await?;
    let chat_id = bot_id.clone();

    let frames = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match event {
                Ok(evt) => {
                    if evt.is_terminal() {
                        state.events.publish(&chat_id, &chat_id);
                    }
                    let kind = event_kind(&evt);
                    let payload = serde_json::to_string(&evt).unwrap_or_else(|_| "{}".to_string());
                    yield Ok::<String, Infallible>(memoh_sse::frame_event(Some(kind), &payload));
                }
                Err(e) => {
                    yield Ok(memoh_sse::frame_event(Some("error"), &format!("{{\"message\":{:?}}}", e.to_string())));
                }
            }
        }
    };

    let body = Body::from_stream(frames);
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .expect("static SSE response headers are always valid"))
}

fn event_kind(event: &memoh_core::StreamEvent) -> &'static str {
    use memoh_core::StreamEvent::*;
    match event {
        AgentStart { .. } => "agent_start",
        ReasoningStart => "reasoning_start",
        ReasoningDelta { .. } => "reasoning_delta",
        ReasoningEnd => "reasoning_end",
        TextStart => "text_start",
        TextDelta { .. } => "text_delta",
        TextEnd => "text_end",
        ToolCallStart { .. } => "tool_call_start",
        ToolCallEnd { .. } => "tool_call_end",
        AttachmentDelta { .. } => "attachment_delta",
        AgentEnd { .. } => "agent_end",
        Error { .. } => "error",
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub before: Option<i64>,
}

fn default_limit() -> i64 {
    50
}

/// `GET /bots/{bot_id}/messages?limit&before`.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
    Query(q): Query<ListMessagesQuery>,
) -> Result<Json<Vec<PersistedMessage>>, ApiError> {
    let messages = state.resolver.store.list_page(&bot_id, &bot_id, q.limit, q.before)?;
    Ok(Json(messages))
}

/// `DELETE /bots/{bot_id}/messages`.
pub async fn clear_messages(State(state): State<Arc<AppState>>, Path(bot_id): Path<String>) -> Result<StatusCode, ApiError> {
    state.resolver.store.clear_chat(&bot_id, &bot_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct MessageEventsQuery {
    /// Accepted for API-shape compatibility; there is no durable event log to
    /// replay against, so this subscribes live and never backfills.
    #[serde(default)]
    #[allow(dead_code)]
    pub since: Option<String>,
}

/// `GET /bots/{bot_id}/messages/events?since` — live-only subscription to
/// `message_created` notifications for this bot's chat.
pub async fn message_events(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
    Query(_q): Query<MessageEventsQuery>,
) -> Response {
    let mut rx = state.events.subscribe();
    let needle = format!("\"bot_id\":\"{bot_id}\"");

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(payload) if payload.contains(&needle) => {
                    yield Ok::<String, Infallible>(memoh_sse::frame_event(Some("message_created"), &payload));
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    let body = Body::from_stream(stream);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .expect("static SSE response headers are always valid")
        .into_response()
}
