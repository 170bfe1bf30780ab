pub mod llm;
pub mod openai;
pub mod types;

pub use llm::{ChatRequest, ChunkStream, LLMProvider};
pub use openai::OpenAIProvider;
pub use types::messages::ChatMessage;
pub use types::stream_chunk::StreamChunk;
