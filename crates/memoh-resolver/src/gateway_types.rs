use memoh_core::{Attachment, ModelMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The client types accepted by the gateway per §4.4 step 4. Anything else
/// fails the request at resolve time.
pub const ALLOWED_CLIENT_TYPES: &[&str] = &[
    "openai",
    "openai-compat",
    "anthropic",
    "google",
    "azure",
    "bedrock",
    "mistral",
    "xai",
    "ollama",
    "dashscope",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayModelConfig {
    #[serde(rename = "modelId")]
    pub model_id: String,
    #[serde(rename = "clientType")]
    pub client_type: String,
    pub input: Vec<String>,
    #[serde(rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(rename = "baseUrl", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIdentity {
    #[serde(rename = "botId")]
    pub bot_id: String,
    #[serde(rename = "containerId", skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(rename = "channelIdentityId", skip_serializing_if = "Option::is_none")]
    pub channel_identity_id: Option<String>,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "currentPlatform", skip_serializing_if = "Option::is_none")]
    pub current_platform: Option<String>,
    #[serde(rename = "conversationType", skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(rename = "sessionToken", skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsableSkill {
    pub name: String,
    pub description: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulePayload {
    pub id: String,
    pub name: String,
    pub description: String,
    pub pattern: String,
    #[serde(rename = "maxCalls", skip_serializing_if = "Option::is_none")]
    pub max_calls: Option<u32>,
    pub command: String,
}

/// Body of `POST /chat/`, `POST /chat/stream`, `POST /chat/trigger-schedule`
/// (§6.1). `query` is omitted (via `skip_serializing_if`) for the schedule
/// endpoint per spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayChatPayload {
    pub model: GatewayModelConfig,
    #[serde(rename = "activeContextTime")]
    pub active_context_time: i64,
    pub channels: Vec<String>,
    #[serde(rename = "currentChannel", skip_serializing_if = "Option::is_none")]
    pub current_channel: Option<String>,
    #[serde(rename = "allowedActions", skip_serializing_if = "Option::is_none")]
    pub allowed_actions: Option<Vec<String>>,
    pub messages: Vec<ModelMessage>,
    pub skills: Vec<String>,
    #[serde(rename = "usableSkills")]
    pub usable_skills: Vec<UsableSkill>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub identity: GatewayIdentity,
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<SchedulePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayChatResponse {
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub skills: Vec<String>,
}
