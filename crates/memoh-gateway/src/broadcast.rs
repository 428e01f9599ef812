//! Fan-out of `message_created` notifications to `GET /bots/{bot_id}/messages/events`
//! subscribers — grounded in the teacher's WS event broadcaster, generalized
//! from raw WS frames to the inbound HTTP SSE surface (§6.4).

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 256;

pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Publishes one `message_created` notification. Silently drops if no
    /// subscriber is currently listening.
    pub fn publish(&self, bot_id: &str, chat_id: &str) {
        let payload = json!({
            "type": "message_created",
            "bot_id": bot_id,
            "chat_id": chat_id,
            "at": Utc::now().to_rfc3339(),
        })
        .to_string();
        let _ = self.tx.send(payload);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
