pub mod cli;
pub mod core;
pub mod providers;
pub mod tools;

pub use crate::core::{normalize, Config, Dispatcher, LLMError, NormalizedError};
pub use providers::{ChatMessage, ChatRequest, LLMProvider, OpenAIProvider, StreamChunk};
pub use tools::{ToolCall, ToolDefinition};
