pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod message;
pub mod shared;

pub use chat_completion_chunk::{ChatCompletionChunk, StreamPayload};
pub use chat_completion_request::ChatCompletionRequest;
pub use message::{FinishReason, Message, Tool};
pub use shared::{ApiErrorBody, ModelInfo, ModelList, Usage};
