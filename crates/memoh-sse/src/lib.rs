pub mod chunk;
pub mod decode;
pub mod frame;

pub use chunk::chunk_utf16;
pub use decode::{SseDecoder, SseEvent, MAX_LINE_BYTES};
pub use frame::{frame_event, CHUNK};
