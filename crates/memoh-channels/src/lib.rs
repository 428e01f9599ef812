pub mod channel;
pub mod manager;
pub mod orchestrator;
pub mod types;

pub use channel::{ChannelAdapter, OutboundStream};
pub use manager::ChannelManager;
pub use orchestrator::drive_stream;
pub use types::{ChannelStatus, StreamTarget};
