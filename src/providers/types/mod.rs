pub mod messages;
pub mod stream_chunk;

pub use messages::ChatMessage;
pub use stream_chunk::StreamChunk;
