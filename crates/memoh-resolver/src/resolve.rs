use memoh_core::error::{MemohError, Result};
use memoh_core::{ChatRequest, ConversationType, ModelMessage, DEFAULT_MAX_CONTEXT_LOAD_MINUTES};
use memoh_memory::{SearchRequest, SqliteMemoryClient};
use memoh_store::SqliteMessageStore;
use tracing::warn;

use crate::gateway_types::{GatewayChatPayload, GatewayIdentity, GatewayModelConfig, ALLOWED_CLIENT_TYPES};
use crate::memory_context::build_memory_context_message;
use crate::traits::{ModelCatalog, SettingsProvider, SkillLoader};

const MEMORY_SEARCH_LIMIT: usize = 4;

pub struct ResolveDeps<'a> {
    pub settings: &'a dyn SettingsProvider,
    pub models: &'a dyn ModelCatalog,
    pub skills: &'a dyn SkillLoader,
    pub store: &'a SqliteMessageStore,
    pub memory: &'a SqliteMemoryClient,
}

/// Implements §4.4's shared resolve step. Returns the gateway payload ready
/// to POST to `/chat/`, `/chat/stream`, or `/chat/trigger-schedule`.
pub async fn resolve(req: &ChatRequest, deps: &ResolveDeps<'_>, query_for_payload: Option<String>) -> Result<GatewayChatPayload> {
    // 1. validation
    if req.bot_id.trim().is_empty() || req.chat_id.trim().is_empty() {
        return Err(MemohError::Validation("bot_id and chat_id are required".into()));
    }
    if req.query.trim().is_empty() && req.attachments.is_empty() {
        return Err(MemohError::Validation("query or attachments required".into()));
    }

    // 2. settings + history window
    let bot_settings = deps.settings.bot_settings(&req.bot_id).await?;
    let chat_settings = deps.settings.chat_settings(&req.bot_id, &req.chat_id).await?;

    let skip_history = req.max_context_load_time < 0;
    let max_ctx = first_positive(&[
        req.max_context_load_time,
        chat_settings.max_context_load_time.unwrap_or(0),
        bot_settings.max_context_load_time.unwrap_or(0),
        DEFAULT_MAX_CONTEXT_LOAD_MINUTES,
    ]);

    // 3 & 4. model selection + client-type allow-list
    let effective_model = req
        .model
        .clone()
        .or_else(|| chat_settings.model_id.clone())
        .or_else(|| bot_settings.chat_model_id.clone());
    let resolved_model = deps
        .models
        .resolve(effective_model.as_deref(), req.provider.as_deref())
        .await?;
    if !ALLOWED_CLIENT_TYPES.contains(&resolved_model.client_type.as_str()) {
        return Err(MemohError::Validation(format!(
            "unsupported client type: {}",
            resolved_model.client_type
        )));
    }

    // 5. load prior messages
    let history: Vec<ModelMessage> = if skip_history {
        Vec::new()
    } else {
        deps.store
            .list_since(&req.bot_id, &req.chat_id, max_ctx)?
            .into_iter()
            .map(|p| p.message)
            .collect()
    };

    // 6. memory context — best-effort per §7 (FailStorage is logged, does
    // not abort delivery); a search failure degrades to no memory context
    // rather than failing the whole turn.
    let memory_results = deps
        .memory
        .search(SearchRequest {
            query: &req.query,
            bot_id: &req.bot_id,
            limit: MEMORY_SEARCH_LIMIT,
        })
        .unwrap_or_else(|e| {
            warn!(bot_id = %req.bot_id, error = %e, "memory search failed, continuing without memory context");
            Vec::new()
        });
    let memory_message = build_memory_context_message(memory_results);

    // 7. concatenate and drop blanks
    let mut messages: Vec<ModelMessage> = history;
    if let Some(m) = memory_message {
        messages.push(m);
    }
    messages.extend(req.messages.clone());
    messages.retain(|m| !m.is_blank());

    // 8. route attachments
    let routed_attachments = memoh_router::route(&resolved_model.input_modalities, &req.attachments);

    // 9. load skills
    let usable_skills = deps.skills.load(&req.skills).await?;

    // 10. produce payload
    Ok(GatewayChatPayload {
        model: GatewayModelConfig {
            model_id: resolved_model.model_id,
            client_type: resolved_model.client_type,
            input: resolved_model.input_modalities.iter().map(modality_wire_name).collect(),
            api_key: resolved_model.api_key,
            base_url: resolved_model.base_url,
        },
        active_context_time: max_ctx,
        channels: req.channels.clone(),
        current_channel: req.current_channel.clone(),
        allowed_actions: None,
        messages,
        skills: req.skills.clone(),
        usable_skills,
        query: query_for_payload,
        identity: GatewayIdentity {
            bot_id: req.bot_id.clone(),
            container_id: req.container_id.clone(),
            channel_identity_id: req.source_channel_identity_id.clone(),
            display_name: req.display_name.clone(),
            current_platform: req.current_channel.clone(),
            conversation_type: Some(conversation_type_wire_name(req.conversation_type)),
            session_token: req.token.clone(),
        },
        attachments: routed_attachments,
        schedule: None,
    })
}

fn first_positive(candidates: &[i64]) -> i64 {
    candidates.iter().copied().find(|&v| v > 0).unwrap_or(DEFAULT_MAX_CONTEXT_LOAD_MINUTES)
}

fn modality_wire_name(m: &memoh_core::Modality) -> String {
    match m {
        memoh_core::Modality::Text => "text",
        memoh_core::Modality::Image => "image",
        memoh_core::Modality::Audio => "audio",
        memoh_core::Modality::Video => "video",
        memoh_core::Modality::File => "file",
    }
    .to_string()
}

fn conversation_type_wire_name(t: ConversationType) -> String {
    match t {
        ConversationType::Direct => "direct",
        ConversationType::Group => "group",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::fixed::{FixedModelCatalog, NoopSettingsProvider, StaticSkillLoader};
    use crate::traits::ResolvedModel;
    use memoh_core::Modality;

    fn deps_fixture<'a>(
        settings: &'a NoopSettingsProvider,
        models: &'a FixedModelCatalog,
        skills: &'a StaticSkillLoader,
        store: &'a SqliteMessageStore,
        memory: &'a SqliteMemoryClient,
    ) -> ResolveDeps<'a> {
        ResolveDeps { settings, models, skills, store, memory }
    }

    #[tokio::test]
    async fn rejects_blank_bot_id() {
        let settings = NoopSettingsProvider::default();
        let models = FixedModelCatalog {
            default: ResolvedModel {
                model_id: "gpt".into(),
                client_type: "openai".into(),
                input_modalities: vec![Modality::Text],
                api_key: None,
                base_url: None,
            },
        };
        let skills = StaticSkillLoader::default();
        let store = SqliteMessageStore::in_memory().unwrap();
        let memory = SqliteMemoryClient::in_memory().unwrap();
        let deps = deps_fixture(&settings, &models, &skills, &store, &memory);

        let req = ChatRequest {
            bot_id: "".into(),
            ..blank_request()
        };
        let err = resolve(&req, &deps, Some(req.query.clone())).await.unwrap_err();
        assert_eq!(err.code(), "FAIL_VALIDATION");
    }

    #[tokio::test]
    async fn rejects_unsupported_client_type() {
        let settings = NoopSettingsProvider::default();
        let models = FixedModelCatalog {
            default: ResolvedModel {
                model_id: "m".into(),
                client_type: "not-a-real-client".into(),
                input_modalities: vec![Modality::Text],
                api_key: None,
                base_url: None,
            },
        };
        let skills = StaticSkillLoader::default();
        let store = SqliteMessageStore::in_memory().unwrap();
        let memory = SqliteMemoryClient::in_memory().unwrap();
        let deps = deps_fixture(&settings, &models, &skills, &store, &memory);

        let mut req = blank_request();
        req.bot_id = "b1".into();
        req.chat_id = "c1".into();
        req.query = "hi".into();
        let err = resolve(&req, &deps, Some(req.query.clone())).await.unwrap_err();
        assert_eq!(err.code(), "FAIL_VALIDATION");
    }

    #[tokio::test]
    async fn s4_image_dropped_for_text_only_model_end_to_end() {
        let settings = NoopSettingsProvider::default();
        let models = FixedModelCatalog {
            default: ResolvedModel {
                model_id: "m".into(),
                client_type: "openai".into(),
                input_modalities: vec![Modality::Text],
                api_key: None,
                base_url: None,
            },
        };
        let skills = StaticSkillLoader::default();
        let store = SqliteMessageStore::in_memory().unwrap();
        let memory = SqliteMemoryClient::in_memory().unwrap();
        let deps = deps_fixture(&settings, &models, &skills, &store, &memory);

        let mut req = blank_request();
        req.bot_id = "b1".into();
        req.chat_id = "c1".into();
        req.query = "".into();
        req.attachments.push(memoh_core::Attachment {
            kind: memoh_core::AttachmentType::Image,
            base64: Some("xx".into()),
            path: None,
            url: None,
            content_hash: None,
            mime: None,
            name: None,
            metadata: None,
        });

        let payload = resolve(&req, &deps, Some(req.query.clone())).await.unwrap();
        assert!(payload.attachments.is_empty());
    }

    fn blank_request() -> ChatRequest {
        ChatRequest {
            bot_id: String::new(),
            chat_id: String::new(),
            query: String::new(),
            attachments: Vec::new(),
            messages: Vec::new(),
            model: None,
            provider: None,
            skills: Vec::new(),
            channels: Vec::new(),
            current_channel: None,
            conversation_type: ConversationType::Direct,
            source_channel_identity_id: None,
            user_id: None,
            display_name: None,
            external_message_id: None,
            route_id: None,
            container_id: None,
            token: None,
            max_context_load_time: 0,
            user_message_persisted: false,
        }
    }
}
