use std::borrow::Cow;

use crate::providers::types::messages::ChatMessage;
use crate::tools::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conversation entry in the chat-completions request shape. Only tool
/// messages carry anything besides `role` and `content`.
#[derive(Debug, Serialize)]
#[serde(tag = "role")]
#[serde(rename_all = "lowercase")]
pub enum Message<'a> {
    System {
        content: Cow<'a, str>,
    },
    User {
        content: Cow<'a, str>,
    },
    Assistant {
        content: Cow<'a, str>,
    },
    Tool {
        content: Cow<'a, str>,
        tool_call_id: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<&'a str>,
    },
}

impl<'a> From<&'a ChatMessage> for Message<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        match msg {
            ChatMessage::System { content } => Self::System {
                content: content.into(),
            },
            ChatMessage::User { content } => Self::User {
                content: content.into(),
            },
            ChatMessage::Assistant { content } => Self::Assistant {
                content: content.into(),
            },
            ChatMessage::Tool {
                content,
                tool_call_id,
                name,
            } => Self::Tool {
                content: content.into(),
                tool_call_id: tool_call_id.as_str(),
                name: name.as_deref(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Tool<'a> {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: Function<'a>,
}

#[derive(Debug, Serialize)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

#[derive(Debug, Serialize)]
pub struct Function<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<&'a Value>,
}

impl<'a> From<&'a ToolDefinition> for Tool<'a> {
    fn from(tool_definition: &'a ToolDefinition) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: Function {
                name: &tool_definition.function.name,
                description: tool_definition.function.description.as_deref(),
                parameters: tool_definition.function.parameters.as_ref(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    /// Legacy `function_call` and vendor-specific reasons
    #[serde(other)]
    Other,
}
