use std::collections::HashMap;

use memoh_core::error::{MemohError, Result};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::channel::ChannelAdapter;
use crate::types::ChannelStatus;

const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;
const MAX_ATTEMPTS: u32 = 10;
const JITTER_FRACTION: f64 = 0.10;

/// Registry of connected channel adapters (the `token -> platform client`
/// map of §5's "shared resources"). Reads and writes go through `&mut self`
/// here; callers that need concurrent access wrap this in a `RwLock`.
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn ChannelAdapter>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self { channels: HashMap::new() }
    }

    pub fn register(&mut self, channel: Box<dyn ChannelAdapter>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registering channel adapter");
        self.channels.insert(name, channel);
    }

    /// Connect all registered channels, applying exponential backoff with
    /// jitter per channel on failure.
    pub async fn connect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "connecting channel");
            if let Err(e) = connect_with_backoff(name, channel.as_mut()).await {
                error!(channel = %name, error = %e, "failed to connect channel after retries");
            }
        }
    }

    pub async fn disconnect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "disconnecting channel");
            if let Err(e) = channel.disconnect().await {
                warn!(channel = %name, error = %e, "error while disconnecting channel");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn ChannelAdapter> {
        self.channels.get(name).map(|b| b.as_ref())
    }

    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let mut result: Vec<(String, ChannelStatus)> = self.channels.iter().map(|(name, ch)| (name.clone(), ch.status())).collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect_with_backoff(name: &str, channel: &mut dyn ChannelAdapter) -> Result<()> {
    let mut delay_secs = BACKOFF_BASE_SECS;

    for attempt in 1..=MAX_ATTEMPTS {
        match channel.connect().await {
            Ok(()) => {
                info!(channel = %name, attempt, "channel connected successfully");
                return Ok(());
            }
            Err(e) if attempt == MAX_ATTEMPTS => {
                return Err(e);
            }
            Err(e) => {
                let jitter = jitter_secs(delay_secs);
                let total = delay_secs + jitter;
                warn!(channel = %name, attempt, max = MAX_ATTEMPTS, error = %e, retry_after_secs = total, "channel connect failed, retrying with backoff");
                sleep(Duration::from_secs(total)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
            }
        }
    }

    Err(MemohError::Internal("backoff loop exited without returning".into()))
}

fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::OutboundStream;
    use crate::types::StreamTarget;
    use async_trait::async_trait;

    struct AlwaysConnects;

    #[async_trait]
    impl ChannelAdapter for AlwaysConnects {
        fn name(&self) -> &str {
            "ok"
        }
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
        fn status(&self) -> ChannelStatus {
            ChannelStatus::Connected
        }
        async fn processing_started(&self, _target: &StreamTarget) -> Result<()> {
            Ok(())
        }
        async fn open_stream(&self, _target: StreamTarget) -> Result<Box<dyn OutboundStream>> {
            unimplemented!()
        }
        async fn processing_completed(&self, _target: &StreamTarget) -> Result<()> {
            Ok(())
        }
        async fn processing_failed(&self, _target: &StreamTarget, _error: &MemohError) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn registers_and_connects() {
        let mut manager = ChannelManager::new();
        manager.register(Box::new(AlwaysConnects));
        manager.connect_all().await;
        assert!(manager.get("ok").is_some());
        assert_eq!(manager.statuses().len(), 1);
    }
}
