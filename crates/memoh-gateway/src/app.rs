use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use memoh_channels::ChannelManager;
use memoh_core::config::ModelConfig;
use memoh_core::error::Result;
use memoh_core::{MemohConfig, Modality};
use memoh_memory::SqliteMemoryClient;
use memoh_resolver::traits::fixed::{FixedModelCatalog, NoopSettingsProvider, StaticSkillLoader};
use memoh_resolver::traits::ResolvedModel;
use memoh_resolver::{GatewayClient, Resolver};
use memoh_store::SqliteMessageStore;
use memoh_users::IdentityDirectory;

use crate::broadcast::EventBroadcaster;
use crate::http;

/// Central shared state, passed as `Arc<AppState>` to every Axum handler —
/// the same shape `skynet_gateway::app::AppState` wires its subsystems into.
pub struct AppState {
    pub config: MemohConfig,
    pub resolver: Arc<Resolver>,
    pub channels: ChannelManager,
    pub events: EventBroadcaster,
}

impl AppState {
    /// Builds the resolver and its storage collaborators from config. Model
    /// catalog, bot/chat settings, and skill loading use the bundled `fixed`
    /// implementations (§1 places real per-bot model/settings resolution out
    /// of scope) — an operator with a real catalog swaps `resolver.models`.
    pub fn build(config: MemohConfig, channels: ChannelManager) -> Result<Arc<Self>> {
        let store = Arc::new(SqliteMessageStore::open(&config.database.path)?);
        let memory_path = memory_db_path(&config.database.path);
        let memory = Arc::new(SqliteMemoryClient::open(&memory_path)?);
        let identities = Arc::new(IdentityDirectory::open(&config.database.path)?);

        let gateway = GatewayClient::new(config.agent_gateway.clone())?;
        let models = Arc::new(FixedModelCatalog { default: resolved_model_from_config(&config.default_model) });
        let settings = Arc::new(NoopSettingsProvider);
        let skills = Arc::new(StaticSkillLoader::default());

        let resolver = Arc::new(Resolver { gateway, settings, models, skills, store, memory, identities });

        Ok(Arc::new(Self {
            config,
            resolver,
            channels,
            events: EventBroadcaster::new(),
        }))
    }
}

fn memory_db_path(database_path: &str) -> String {
    if database_path == ":memory:" {
        return database_path.to_string();
    }
    format!("{database_path}.memory")
}

fn resolved_model_from_config(cfg: &ModelConfig) -> ResolvedModel {
    ResolvedModel {
        model_id: cfg.model_id.clone(),
        client_type: cfg.client_type.clone(),
        input_modalities: cfg.input_modalities.iter().filter_map(|m| parse_modality(m)).collect(),
        api_key: cfg.api_key.clone(),
        base_url: cfg.base_url.clone(),
    }
}

fn parse_modality(name: &str) -> Option<Modality> {
    match name {
        "text" => Some(Modality::Text),
        "image" => Some(Modality::Image),
        "audio" => Some(Modality::Audio),
        "video" => Some(Modality::Video),
        "file" => Some(Modality::File),
        _ => None,
    }
}

/// Assembles the full inbound HTTP surface (§6.4, §6.5, §6.6).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http::health::health_handler))
        .route(
            "/bots/{bot_id}/messages",
            post(http::chat::send_message).get(http::chat::list_messages).delete(http::chat::clear_messages),
        )
        .route("/bots/{bot_id}/messages/stream", post(http::chat::stream_message))
        .route("/bots/{bot_id}/messages/events", get(http::chat::message_events))
        .route("/webhooks/{source}", post(http::webhooks::webhook_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
