use memoh_core::ModelMessage;
use serde::{Deserialize, Serialize};

/// A message as recorded by the store: the `ModelMessage` plus the routing
/// and identity metadata StoreRound attaches to it (§4.4 step 2).
///
/// Grounded in the row shape of `skynet_memory::types::ConversationMessage`,
/// trimmed of cost/token-usage accounting fields this system doesn't bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub id: i64,
    pub bot_id: String,
    pub chat_id: String,
    pub message: ModelMessage,
    pub route_id: Option<String>,
    pub platform: Option<String>,
    pub sender_channel_identity_id: Option<String>,
    pub sender_user_id: Option<String>,
    pub display_name: Option<String>,
    pub external_message_id: Option<String>,
    pub source_reply_to_message_id: Option<String>,
    pub asset_content_hashes: Vec<String>,
    pub created_at: String,
}

/// Everything StoreRound needs to write one message, before it has an id.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub bot_id: String,
    pub chat_id: String,
    pub message: ModelMessage,
    pub route_id: Option<String>,
    pub platform: Option<String>,
    pub sender_channel_identity_id: Option<String>,
    pub sender_user_id: Option<String>,
    pub display_name: Option<String>,
    pub external_message_id: Option<String>,
    pub source_reply_to_message_id: Option<String>,
    pub asset_content_hashes: Vec<String>,
}
