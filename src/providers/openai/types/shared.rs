use serde::Deserialize;
use serde_json::Value;

use crate::core::LLMError;

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorField {
    Details(ErrorDetails),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

impl ErrorField {
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Details(details) => details.message.as_deref(),
            Self::Text(text) => Some(text),
        }
    }

    /// The numeric `code`, which OpenRouter fills with an HTTP status.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Details(ErrorDetails {
                code: Some(code), ..
            }) => code.as_u64().and_then(|code| u16::try_from(code).ok()),
            _ => None,
        }
    }

    pub fn into_error(self) -> LLMError {
        let message = self.message().map(str::to_string);
        match self.status() {
            Some(status) => LLMError::api(status, message),
            None => LLMError::Provider(message.unwrap_or_else(|| "unspecified provider error".to_string())),
        }
    }
}

/// Body of a non-success response, `{"error": {...}}` or `{"message": ...}`.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<ErrorField>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Nested `error.message` first, then top-level `message`, then the raw body text.
    pub fn message_from(body: &str) -> Option<String> {
        let parsed: Self = serde_json::from_str(body).unwrap_or_default();
        parsed
            .error
            .as_ref()
            .and_then(ErrorField::message)
            .map(str::to_string)
            .or(parsed.message)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
    }
}
