use std::sync::Arc;

use memoh_core::error::Result;
use memoh_core::{ChatRequest, ModelMessage};
use memoh_memory::SqliteMemoryClient;
use memoh_store::{NewMessage, PersistedMessage, SqliteMessageStore};
use memoh_users::IdentityDirectory;
use serde_json::Value;
use tracing::warn;

pub struct StoreRoundDeps {
    pub store: Arc<SqliteMessageStore>,
    pub memory: Arc<SqliteMemoryClient>,
    pub identities: Arc<IdentityDirectory>,
}

/// Implements §4.4's StoreRound algorithm.
pub fn store_round(req: &ChatRequest, gateway_messages: Vec<ModelMessage>, deps: &StoreRoundDeps) -> Result<Vec<PersistedMessage>> {
    let full_round = build_full_round(req, gateway_messages);

    let platform = req.current_channel.clone().or_else(|| req.channels.first().cloned());
    let sender = deps.identities.resolve_sender(
        req.source_channel_identity_id.as_deref(),
        req.user_id.as_deref(),
        req.display_name.as_deref(),
    )?;

    let asset_hashes: Vec<String> = req.attachments.iter().filter_map(|a| a.content_hash.clone()).collect();
    let mut user_message_attached_assets = false;

    let mut persisted = Vec::with_capacity(full_round.len());
    for message in full_round {
        let is_user_query_message = message.role == "user" && content_text(&message.content).as_deref() == Some(req.query.as_str());

        let (external_message_id, source_reply_to_message_id) = if is_user_query_message {
            (req.external_message_id.clone(), None)
        } else {
            (None, req.external_message_id.clone())
        };

        let assets = if is_user_query_message && !user_message_attached_assets {
            user_message_attached_assets = true;
            asset_hashes.clone()
        } else {
            Vec::new()
        };

        let record = deps.store.persist_message(NewMessage {
            bot_id: req.bot_id.clone(),
            chat_id: req.chat_id.clone(),
            message,
            route_id: req.route_id.clone(),
            platform: platform.clone(),
            sender_channel_identity_id: sender.sender_channel_identity_id.clone(),
            sender_user_id: sender.sender_user_id.clone(),
            display_name: Some(sender.display_name.clone()),
            external_message_id,
            source_reply_to_message_id,
            asset_content_hashes: assets,
        })?;
        persisted.push(record);
    }

    spawn_memory_extraction(req.bot_id.clone(), persisted.iter().map(|p| p.message.clone()).collect(), Arc::clone(&deps.memory));

    Ok(persisted)
}

fn build_full_round(req: &ChatRequest, gateway_messages: Vec<ModelMessage>) -> Vec<ModelMessage> {
    let query_matches = |m: &ModelMessage| m.role == "user" && content_text(&m.content).as_deref() == Some(req.query.as_str());

    let echoed = gateway_messages.iter().any(query_matches);
    let remainder: Vec<ModelMessage> = gateway_messages.into_iter().filter(|m| !query_matches(m)).collect();

    let mut full_round = Vec::new();
    if !req.user_message_persisted {
        if echoed {
            full_round.push(ModelMessage {
                role: "user".to_string(),
                content: Value::String(req.query.clone()),
                tool_call_id: None,
                tool_calls: None,
                usage_input_tokens: None,
            });
        } else if !req.query.trim().is_empty() {
            full_round.push(ModelMessage {
                role: "user".to_string(),
                content: Value::String(req.query.clone()),
                tool_call_id: None,
                tool_calls: None,
                usage_input_tokens: None,
            });
        }
    }
    full_round.extend(remainder);
    full_round
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Detached: does not inherit the request's cancellation context (§9 "Async
/// extraction with detached lifetime").
fn spawn_memory_extraction(bot_id: String, messages: Vec<ModelMessage>, memory: Arc<SqliteMemoryClient>) {
    tokio::spawn(async move {
        let non_empty: Vec<ModelMessage> = messages
            .into_iter()
            .filter(|m| content_text(&m.content).map(|s| !s.trim().is_empty()).unwrap_or(false))
            .collect();
        if non_empty.is_empty() {
            return;
        }
        if let Err(e) = memory.add_model_messages(&bot_id, &non_empty) {
            warn!(error = %e, bot_id, "memory extraction failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoh_core::ConversationType;
    use serde_json::json;

    fn base_request() -> ChatRequest {
        ChatRequest {
            bot_id: "b1".into(),
            chat_id: "c1".into(),
            query: "hello".into(),
            attachments: Vec::new(),
            messages: Vec::new(),
            model: None,
            provider: None,
            skills: Vec::new(),
            channels: vec!["telegram".into()],
            current_channel: Some("telegram".into()),
            conversation_type: ConversationType::Direct,
            source_channel_identity_id: None,
            user_id: None,
            display_name: None,
            external_message_id: Some("42".into()),
            route_id: None,
            container_id: None,
            token: None,
            max_context_load_time: 0,
            user_message_persisted: false,
        }
    }

    fn deps() -> StoreRoundDeps {
        StoreRoundDeps {
            store: Arc::new(SqliteMessageStore::in_memory().unwrap()),
            memory: Arc::new(SqliteMemoryClient::in_memory().unwrap()),
            identities: Arc::new(IdentityDirectory::in_memory().unwrap()),
        }
    }

    #[tokio::test]
    async fn s1_echo_round_persists_user_and_assistant() {
        let req = base_request();
        let deps = deps();
        let gateway_messages = vec![ModelMessage {
            role: "assistant".into(),
            content: json!("hi"),
            tool_call_id: None,
            tool_calls: None,
            usage_input_tokens: None,
        }];
        let persisted = store_round(&req, gateway_messages, &deps).unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].message.role, "user");
        assert_eq!(persisted[1].message.role, "assistant");
    }

    #[tokio::test]
    async fn s6_cross_channel_threading() {
        let req = base_request();
        let deps = deps();
        let gateway_messages = vec![ModelMessage {
            role: "assistant".into(),
            content: json!("hi"),
            tool_call_id: None,
            tool_calls: None,
            usage_input_tokens: None,
        }];
        let persisted = store_round(&req, gateway_messages, &deps).unwrap();
        let user_msg = &persisted[0];
        assert_eq!(user_msg.external_message_id.as_deref(), Some("42"));
        assert!(user_msg.source_reply_to_message_id.is_none());
        let assistant_msg = &persisted[1];
        assert_eq!(assistant_msg.source_reply_to_message_id.as_deref(), Some("42"));
        assert!(assistant_msg.external_message_id.is_none());
    }

    #[tokio::test]
    async fn does_not_duplicate_gateway_echoed_user_message() {
        let req = base_request();
        let deps = deps();
        let gateway_messages = vec![
            ModelMessage { role: "user".into(), content: json!("hello"), tool_call_id: None, tool_calls: None, usage_input_tokens: None },
            ModelMessage { role: "assistant".into(), content: json!("hi"), tool_call_id: None, tool_calls: None, usage_input_tokens: None },
        ];
        let persisted = store_round(&req, gateway_messages, &deps).unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted.iter().filter(|m| m.message.role == "user").count(), 1);
    }

    #[tokio::test]
    async fn skips_user_message_when_already_persisted() {
        let mut req = base_request();
        req.user_message_persisted = true;
        let deps = deps();
        let gateway_messages = vec![ModelMessage {
            role: "assistant".into(),
            content: json!("hi"),
            tool_call_id: None,
            tool_calls: None,
            usage_input_tokens: None,
        }];
        let persisted = store_round(&req, gateway_messages, &deps).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].message.role, "assistant");
    }

    #[tokio::test]
    async fn asset_refs_attach_only_to_user_message() {
        let mut req = base_request();
        req.attachments.push(memoh_core::Attachment {
            kind: memoh_core::AttachmentType::Image,
            base64: None,
            path: None,
            url: None,
            content_hash: Some("hash1".into()),
            mime: None,
            name: None,
            metadata: None,
        });
        let deps = deps();
        let gateway_messages = vec![ModelMessage {
            role: "assistant".into(),
            content: json!("hi"),
            tool_call_id: None,
            tool_calls: None,
            usage_input_tokens: None,
        }];
        let persisted = store_round(&req, gateway_messages, &deps).unwrap();
        assert_eq!(persisted[0].asset_content_hashes, vec!["hash1"]);
        assert!(persisted[1].asset_content_hashes.is_empty());
    }
}
