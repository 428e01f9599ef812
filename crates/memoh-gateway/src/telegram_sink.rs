//! Bridges Telegram's inbound `MessageSink` seam into the resolver and the
//! channel orchestrator, the composition `memoh-telegram` and
//! `memoh-channels` deliberately avoid depending on each other to reach.

use std::sync::Arc;

use async_trait::async_trait;
use memoh_channels::{drive_stream, ChannelAdapter, StreamTarget};
use memoh_core::ChatRequest;
use memoh_telegram::MessageSink;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::app::AppState;

pub struct GatewaySink {
    pub state: Arc<AppState>,
}

#[async_trait]
impl MessageSink for GatewaySink {
    async fn handle(&self, req: ChatRequest) {
        let bot_id = req.bot_id.clone();
        let chat_id = req.chat_id.clone();
        let target = StreamTarget {
            channel: "telegram".to_string(),
            recipient: chat_id.clone(),
            reply_to_external_message_id: req.external_message_id.clone(),
        };

        let adapter = match self.state.channels.get("telegram") {
            Some(a) => a,
            None => {
                warn!("telegram message arrived but no telegram adapter is registered");
                return;
            }
        };

        match self.state.resolver.stream_chat(req).await {
            Ok(rx) => {
                drive_stream(adapter, target, ReceiverStream::new(rx)).await;
                self.state.events.publish(&bot_id, &chat_id);
            }
            Err(e) => {
                warn!(error = %e, "stream_chat failed before streaming began");
                let _ = adapter.processing_failed(&target, &e).await;
            }
        }
    }
}
