use super::message::{Message, Tool};
use crate::providers::llm::ChatRequest;
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool<'a>>>,
    pub stream: bool,
}

impl<'a> From<&'a ChatRequest> for ChatCompletionRequest<'a> {
    fn from(request: &'a ChatRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(Message::from).collect(),
            tools: request
                .tools
                .as_ref()
                .map(|tools| tools.iter().map(Tool::from).collect()),
            stream: true,
        }
    }
}
