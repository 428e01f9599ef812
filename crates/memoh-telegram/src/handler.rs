//! Telegram inbound message handler registered in the teloxide Dispatcher.
//!
//! Implements §4.6 step 1 (translate platform payload to `ChatRequest`) and
//! hands off to a `MessageSink`, which owns steps 2-5 (it is the thing that
//! knows about the resolver and the orchestrator; this crate does not
//! depend on `memoh-resolver` to avoid a dependency cycle through
//! `memoh-gateway`).

use std::sync::Arc;

use async_trait::async_trait;
use memoh_core::config::TelegramConfig;
use memoh_core::{ChatRequest, ConversationType};
use teloxide::prelude::*;
use tracing::warn;

use crate::allow::is_allowed;
use crate::attach::extract_attachments;

/// Receives a fully translated inbound chat turn. The gateway binary
/// implements this by calling `memoh_resolver::Resolver::stream_chat` and
/// `memoh_channels::drive_stream`.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn handle(&self, req: ChatRequest);
}

pub async fn handle_message(bot: Bot, msg: Message, sink: Arc<dyn MessageSink>, config: TelegramConfig) -> ResponseResult<()> {
    if msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(());
    }

    let from = match msg.from.as_ref() {
        Some(u) => u,
        None => return Ok(()),
    };

    let chat_id = msg.chat.id.0.to_string();
    if !is_allowed(&config.allowed_chat_ids, &chat_id) {
        return Ok(());
    }

    let text = msg.text().or(msg.caption()).unwrap_or("").to_string();
    let attachments = extract_attachments(&bot, &msg).await;

    if text.is_empty() && attachments.is_empty() {
        return Ok(());
    }

    let bot_id = config.bot_id.clone().unwrap_or_default();
    let display_name = display_name(from.username.as_deref(), &from.first_name, from.last_name.as_deref());

    let req = ChatRequest {
        bot_id,
        chat_id: chat_id.clone(),
        query: text,
        attachments,
        messages: Vec::new(),
        model: None,
        provider: None,
        skills: Vec::new(),
        channels: vec!["telegram".to_string()],
        current_channel: Some("telegram".to_string()),
        conversation_type: if msg.chat.is_private() { ConversationType::Direct } else { ConversationType::Group },
        source_channel_identity_id: Some(format!("telegram:{}", from.id.0)),
        user_id: None,
        display_name,
        external_message_id: Some(msg.id.0.to_string()),
        route_id: None,
        container_id: None,
        token: None,
        max_context_load_time: 0,
        user_message_persisted: false,
    };

    sink.handle(req).await;
    Ok(())
}

fn display_name(username: Option<&str>, first_name: &str, last_name: Option<&str>) -> Option<String> {
    if let Some(username) = username {
        return Some(username.to_string());
    }
    let mut name = first_name.to_string();
    if let Some(last) = last_name {
        name.push(' ');
        name.push_str(last);
    }
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_username() {
        assert_eq!(display_name(Some("ada"), "Ada", None), Some("ada".to_string()));
    }

    #[test]
    fn display_name_falls_back_to_full_name() {
        assert_eq!(display_name(None, "Ada", Some("Lovelace")), Some("Ada Lovelace".to_string()));
    }
}
