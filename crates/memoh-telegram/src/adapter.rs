//! Telegram channel adapter: long-polling dispatcher + `ChannelAdapter` impl.

use std::sync::Arc;

use async_trait::async_trait;
use memoh_channels::{ChannelAdapter, ChannelStatus, OutboundStream, StreamTarget};
use memoh_core::config::TelegramConfig;
use memoh_core::error::{MemohError, Result};
use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tracing::info;

use crate::handler::{handle_message, MessageSink};
use crate::outbound::TelegramOutboundStream;

/// Drives a teloxide `Bot` + `Dispatcher` against long polling, and exposes
/// it through `memoh_channels::ChannelAdapter` so `drive_stream` can treat
/// it like any other channel.
#[derive(Clone)]
pub struct TelegramAdapter {
    bot: Bot,
    config: TelegramConfig,
}

impl TelegramAdapter {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let token = config.bot_token.clone().ok_or_else(|| MemohError::Config("telegram.bot_token is required".into()))?;
        let bot = Bot::new(token);
        Ok(Self { bot, config })
    }

    /// Connect to Telegram and drive the long-polling loop. Never returns —
    /// runs for the lifetime of the process. Each inbound message is handed
    /// to `sink`, which is expected to translate it into a `ChatRequest` and
    /// drive the orchestrator.
    pub async fn run(self, sink: Arc<dyn MessageSink>) {
        info!("telegram: starting long-polling dispatcher");
        let bot = self.bot.clone();
        let config = self.config.clone();
        let handler = Update::filter_message().endpoint(handle_message);

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![sink, config])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<()> {
        self.bot.get_me().await.map_err(|e| MemohError::Platform(e.to_string()))?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        ChannelStatus::Connected
    }

    async fn processing_started(&self, target: &StreamTarget) -> Result<()> {
        let chat_id = parse_chat_id(&target.recipient)?;
        let _ = self.bot.send_chat_action(chat_id, ChatAction::Typing).await;
        Ok(())
    }

    async fn open_stream(&self, target: StreamTarget) -> Result<Box<dyn OutboundStream>> {
        let chat_id = parse_chat_id(&target.recipient)?;
        Ok(Box::new(TelegramOutboundStream::new(self.bot.clone(), chat_id)))
    }

    async fn processing_completed(&self, _target: &StreamTarget) -> Result<()> {
        Ok(())
    }

    async fn processing_failed(&self, target: &StreamTarget, error: &MemohError) -> Result<()> {
        let chat_id = parse_chat_id(&target.recipient)?;
        let _ = self.bot.send_message(chat_id, format!("Error: {error}")).await;
        Ok(())
    }
}

fn parse_chat_id(recipient: &str) -> Result<ChatId> {
    recipient.parse::<i64>().map(ChatId).map_err(|_| MemohError::Validation(format!("invalid telegram chat id: {recipient}")))
}
