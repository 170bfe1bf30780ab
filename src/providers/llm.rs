use crate::core::{ConnectionOptions, LLMError};
use crate::providers::{ChatMessage, StreamChunk};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// A single-use stream of response chunks. Errors, including cancellation,
/// arrive as the final `Err` item.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LLMError>> + Send + 'static>>;

/// Everything needed to ask a model for one streamed response.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub cancel: Option<CancellationToken>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Configure credentials and endpoint. Identical options keep the current
    /// connection; any change rebuilds it.
    fn initialize(&mut self, options: &ConnectionOptions) -> Result<(), LLMError>;

    /// Probe the endpoint. Never fails: any problem reads as `false`.
    async fn check_connection(&self) -> bool;

    /// Start a streamed response. Nothing is sent until the stream is polled.
    fn stream_response(&self, request: ChatRequest) -> Result<ChunkStream, LLMError>;
}
