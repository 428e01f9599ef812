use async_trait::async_trait;
use memoh_core::error::Result;
use memoh_core::StreamEvent;

use crate::types::StreamTarget;

/// A single outbound stream, open for the lifetime of one chat turn.
///
/// Implementations own whatever platform-native state is needed to turn a
/// sequence of `StreamEvent`s into edits/sends (§4.5's Telegram-form state
/// machine is one implementation of this trait).
#[async_trait]
pub trait OutboundStream: Send {
    async fn forward(&mut self, event: &StreamEvent) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Common interface implemented by every channel adapter (Telegram, ...).
///
/// Implementations must be `Send + Sync` so they can be stored in a
/// `ChannelManager` and driven from multiple Tokio tasks.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"telegram"`).
    fn name(&self) -> &str;

    /// Establish the connection to the external service.
    async fn connect(&mut self) -> Result<()>;

    /// Gracefully close the connection.
    async fn disconnect(&mut self) -> Result<()>;

    /// Current runtime status without blocking.
    fn status(&self) -> crate::types::ChannelStatus;

    /// Platform-dependent "processing started" hint (e.g. typing indicator).
    async fn processing_started(&self, target: &StreamTarget) -> Result<()>;

    /// Open a new outbound stream for one chat turn.
    async fn open_stream(&self, target: StreamTarget) -> Result<Box<dyn OutboundStream>>;

    /// Platform-dependent "processing completed" hint.
    async fn processing_completed(&self, target: &StreamTarget) -> Result<()>;

    /// Platform-dependent "processing failed" hint.
    async fn processing_failed(&self, target: &StreamTarget, error: &memoh_core::error::MemohError) -> Result<()>;
}
