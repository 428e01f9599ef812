pub mod event;
pub mod gateway_client;
pub mod gateway_types;
pub mod memory_context;
pub mod resolve;
pub mod store_round;
pub mod traits;

use std::sync::Arc;

use memoh_core::error::Result;
use memoh_core::{ChatRequest, ModelMessage, StreamEvent};
use memoh_memory::SqliteMemoryClient;
use memoh_store::{PersistedMessage, SqliteMessageStore};
use memoh_users::IdentityDirectory;
use tokio::sync::mpsc;

pub use gateway_client::GatewayClient;
pub use gateway_types::{GatewayChatPayload, SchedulePayload};
pub use resolve::{resolve, ResolveDeps};
pub use store_round::{store_round, StoreRoundDeps};
pub use traits::{BotSettings, ChatSettings, ModelCatalog, ResolvedModel, SettingsProvider, SkillLoader};

const SCHEDULER_DISPLAY_NAME: &str = "Scheduler";

/// Wires C4's collaborators into the three public operations (§4.4 "Public
/// operations"): `Chat`, `StreamChat`, `TriggerSchedule`.
pub struct Resolver {
    pub gateway: GatewayClient,
    pub settings: Arc<dyn SettingsProvider>,
    pub models: Arc<dyn ModelCatalog>,
    pub skills: Arc<dyn SkillLoader>,
    pub store: Arc<SqliteMessageStore>,
    pub memory: Arc<SqliteMemoryClient>,
    pub identities: Arc<IdentityDirectory>,
}

impl Resolver {
    fn store_round_deps(&self) -> StoreRoundDeps {
        StoreRoundDeps {
            store: Arc::clone(&self.store),
            memory: Arc::clone(&self.memory),
            identities: Arc::clone(&self.identities),
        }
    }

    fn resolve_deps(&self) -> ResolveDeps<'_> {
        ResolveDeps {
            settings: self.settings.as_ref(),
            models: self.models.as_ref(),
            skills: self.skills.as_ref(),
            store: &self.store,
            memory: &self.memory,
        }
    }

    /// Non-streaming chat turn: resolve, invoke the blocking gateway
    /// endpoint, persist the round, return the final messages.
    pub async fn chat(&self, req: &ChatRequest) -> Result<Vec<PersistedMessage>> {
        let payload = resolve(req, &self.resolve_deps(), Some(req.query.clone())).await?;
        let response = self.gateway.chat(&payload).await?;
        store_round(req, response.messages, &self.store_round_deps())
    }

    /// Streaming chat turn. Events are forwarded to the caller as they
    /// arrive; persistence runs against the terminal event's messages and
    /// completes strictly before that terminal event is forwarded (the
    /// happens-before persistence guarantee of §4.4).
    pub async fn stream_chat(&self, req: ChatRequest) -> Result<mpsc::Receiver<Result<StreamEvent>>> {
        let payload = resolve(&req, &self.resolve_deps(), Some(req.query.clone())).await?;
        let mut upstream = self.gateway.chat_stream(&payload).await?;

        let (tx, rx) = mpsc::channel(32);
        let store_deps = self.store_round_deps();
        tokio::spawn(async move {
            while let Some(event) = upstream.recv().await {
                match event {
                    Ok(StreamEvent::AgentEnd { messages, reasoning, usage, skills }) => {
                        let persist_messages: Vec<ModelMessage> = messages.clone();
                        let persist_result = store_round(&req, persist_messages, &store_deps);
                        if let Err(e) = persist_result {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                        let _ = tx
                            .send(Ok(StreamEvent::AgentEnd { messages, reasoning, usage, skills }))
                            .await;
                        return;
                    }
                    Ok(other) => {
                        if tx.send(Ok(other)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    /// Scheduled-trigger invocation: same resolve pipeline, no user query,
    /// identity display name fixed to `"Scheduler"`, and the schedule
    /// sub-object attached to the payload.
    pub async fn trigger_schedule(&self, mut req: ChatRequest, schedule: SchedulePayload) -> Result<Vec<PersistedMessage>> {
        req.display_name = Some(SCHEDULER_DISPLAY_NAME.to_string());
        req.user_message_persisted = true;
        let mut payload = resolve(&req, &self.resolve_deps(), None).await?;
        payload.schedule = Some(schedule);
        let response = self.gateway.trigger_schedule(&payload).await?;
        store_round(&req, response.messages, &self.store_round_deps())
    }
}
