use serde::{Deserialize, Serialize};

/// Where an outbound stream's output is delivered: the channel name plus a
/// platform-native recipient (chat ID, room ID, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamTarget {
    pub channel: String,
    pub recipient: String,
    /// Set when this turn replies to a specific inbound platform message.
    pub reply_to_external_message_id: Option<String>,
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}
