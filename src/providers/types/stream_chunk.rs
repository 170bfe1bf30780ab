use crate::tools::ToolCall;

/// One unit of a streamed model response, independent of the provider's wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// A text fragment, emitted as soon as it arrives
    Text(String),
    /// A tool call whose id, name and arguments are complete
    ToolCall(ToolCall),
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::ToolCall(_) => None,
        }
    }
}

impl From<ToolCall> for StreamChunk {
    fn from(tool_call: ToolCall) -> Self {
        Self::ToolCall(tool_call)
    }
}
