pub mod adapter;
pub mod allow;
pub mod attach;
pub mod handler;
pub mod outbound;

pub use adapter::TelegramAdapter;
pub use handler::MessageSink;
pub use outbound::TelegramOutboundStream;
