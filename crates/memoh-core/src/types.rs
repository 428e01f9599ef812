use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minutes of history to load when a request does not override it.
pub const DEFAULT_MAX_CONTEXT_LOAD_MINUTES: i64 = 24 * 60;

/// Conversation kind — affects how the gateway scopes tool permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Direct,
    Group,
}

impl Default for ConversationType {
    fn default() -> Self {
        ConversationType::Direct
    }
}

/// Attachment media kind. Unknown wire values are rejected at deserialize time
/// by the channel adapter, not silently accepted — the router treats anything
/// it sees here as a known type and only "fallback" is reachable via modality
/// mismatch, never via an unrecognized `Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Image,
    Audio,
    Video,
    File,
}

/// A single attachment on a `ChatRequest`.
///
/// Exactly one of `base64`, `path`, `url`, `content_hash` is expected to be
/// set by well-formed callers; the router and resolver tolerate more than one
/// being set by preferring `base64` > `url` > `path` > `content_hash` when a
/// native encoding must be chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Attachment {
    /// True when this attachment carries no retrievable payload at all
    /// (neither inline data nor a container path nor a public URL).
    pub fn is_bare_reference(&self) -> bool {
        self.path.is_none() && self.url.is_none() && self.base64.is_none()
    }
}

/// One entry of `ModelMessage.tool_calls` — OpenAI-style function-call shape,
/// the form the pruner and the gateway wire protocol both expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEntry {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded arguments string (not a parsed `Value`) — this is the
    /// field the pruner bounds at `TOOL_ARGS_MAX`.
    pub arguments: String,
}

/// A single transcript message.
///
/// `content` is left as a raw `Value` rather than a typed enum: both the
/// pruner (§4.3) and the gateway wire protocol operate on message content as
/// an opaque JSON tree (string, or an ordered array of typed parts), and
/// preserving arbitrary/unknown part shapes byte-for-byte is part of the
/// contract (§8 property 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "toolCallId")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "toolCalls")]
    pub tool_calls: Option<Vec<ToolCallEntry>>,
    /// Stale prompt-cache accounting; cleared by the pruner's cache-coherence
    /// rule whenever an earlier message in the same history was altered.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "usageInputTokens")]
    pub usage_input_tokens: Option<u64>,
}

impl ModelMessage {
    pub fn is_blank(&self) -> bool {
        let blank_content = match &self.content {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        };
        self.role.trim().is_empty() && blank_content && self.tool_call_id.is_none()
    }
}

/// The declared input modalities a model can accept, the only capability
/// field the attachment router consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub input_modalities: Vec<Modality>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
    File,
}

impl ModelCapabilities {
    pub fn supports(&self, modality: Modality) -> bool {
        self.input_modalities.contains(&modality)
    }
}

impl AttachmentType {
    /// The modality an attachment type maps to when checking model capability.
    pub fn modality(&self) -> Modality {
        match self {
            AttachmentType::Image => Modality::Image,
            AttachmentType::Audio => Modality::Audio,
            AttachmentType::Video => Modality::Video,
            AttachmentType::File => Modality::File,
        }
    }
}

/// Inbound request to the flow resolver — the normalized shape every channel
/// adapter translates its platform payload into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub bot_id: String,
    pub chat_id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub messages: Vec<ModelMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_channel: Option<String>,
    #[serde(default)]
    pub conversation_type: ConversationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_channel_identity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Minutes of history to include. `< 0` skips history entirely; `0` (the
    /// default) means "use the bot/chat setting".
    #[serde(default)]
    pub max_context_load_time: i64,
    #[serde(default)]
    pub user_message_persisted: bool,
}

impl ChatRequest {
    pub fn is_valid(&self) -> bool {
        !self.bot_id.trim().is_empty()
            && !self.chat_id.trim().is_empty()
            && !(self.query.trim().is_empty() && self.attachments.is_empty())
    }
}

/// A retrieved memory snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub memory: String,
    pub score: f64,
    pub namespace: String,
    pub scope_id: String,
}

/// Shared memory namespace — historical private/chat/public scopes are
/// intentionally collapsed into this single value.
pub const MEMORY_NAMESPACE: &str = "bot";

/// Tagged union of events the resolver forwards to a channel's outbound
/// stream. Field names use the gateway's wire casing (`camelCase`) because
/// these are also what a client of `/messages/stream` deserializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "agent_start")]
    AgentStart { echo: Value },

    #[serde(rename = "reasoning_start")]
    ReasoningStart,
    #[serde(rename = "reasoning_delta")]
    ReasoningDelta { delta: String },
    #[serde(rename = "reasoning_end")]
    ReasoningEnd,

    #[serde(rename = "text_start")]
    TextStart,
    #[serde(rename = "text_delta")]
    TextDelta { delta: String },
    #[serde(rename = "text_end")]
    TextEnd,

    #[serde(rename = "tool_call_start")]
    ToolCallStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    #[serde(rename = "tool_call_end")]
    ToolCallEnd {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        result: Value,
    },

    #[serde(rename = "attachment_delta")]
    AttachmentDelta { attachments: Vec<Attachment> },

    #[serde(rename = "agent_end")]
    AgentEnd {
        messages: Vec<ModelMessage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Value>,
        #[serde(default)]
        skills: Vec<String>,
    },

    #[serde(rename = "error")]
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::AgentEnd { .. } | StreamEvent::Error { .. })
    }
}
