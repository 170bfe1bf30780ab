use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use futures::StreamExt;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::normalize::{normalize, NormalizedError};
use super::{Config, LLMError};
use crate::providers::{ChatMessage, ChatRequest, LLMProvider, StreamChunk};
use crate::tools::{ToolCall, ToolDefinition};

const MAX_TEXT_CHARS: usize = 10_000;

/// What the character on screen is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Thinking,
    Speaking,
    Error,
}

/// Notifications for the UI layer, in the order they happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DispatchEvent {
    StateUpdate {
        state: AgentState,
    },
    AssistantChunk {
        assistant_id: String,
        chunk: String,
    },
    ToolCall {
        assistant_id: String,
        tool_call: ToolCall,
    },
    AssistantMessage {
        assistant_id: String,
        content: String,
        model: String,
    },
    Error {
        assistant_id: String,
        error: NormalizedError,
    },
}

/// A user message submitted from the chat window.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub text: String,
    #[serde(default)]
    pub model: Option<String>,
    pub assistant_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl SendMessage {
    pub fn new(text: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            assistant_id: assistant_id.into(),
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Length is counted in UTF-16 code units, like the renderer's schema.
    fn validate(&self) -> Result<(), LLMError> {
        let length = self.text.encode_utf16().count();
        if length == 0 || length > MAX_TEXT_CHARS {
            return Err(LLMError::Validation(format!(
                "message must be between 1 and {MAX_TEXT_CHARS} characters, got {length}"
            )));
        }
        if self.assistant_id.is_empty() {
            return Err(LLMError::Validation("assistant id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Prepends the system prompt, when there is one, to the user's message.
pub fn build_conversation(system_prompt: Option<&str>, text: &str) -> Vec<ChatMessage> {
    system_prompt
        .map(ChatMessage::system)
        .into_iter()
        .chain(std::iter::once(ChatMessage::user(text)))
        .collect()
}

/// Runs chat requests against a provider and reports progress as
/// [`DispatchEvent`]s. Each in-flight request is cancellable by its assistant id.
pub struct Dispatcher<P: LLMProvider> {
    provider: Mutex<P>,
    config: RwLock<Config>,
    tools: Option<Vec<ToolDefinition>>,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
    events: UnboundedSender<DispatchEvent>,
}

impl<P: LLMProvider> Dispatcher<P> {
    pub fn new(provider: P, config: Config, events: UnboundedSender<DispatchEvent>) -> Self {
        Self {
            provider: Mutex::new(provider),
            config: RwLock::new(config),
            tools: None,
            in_flight: Mutex::new(HashMap::new()),
            events,
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }

    /// Settings saved while running apply from the next request on.
    pub fn update_config(&self, config: Config) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Cancels the request for `assistant_id`. Returns false if none is running.
    pub fn cancel(&self, assistant_id: &str) -> bool {
        let token = self.requests().get(assistant_id).cloned();
        match token {
            Some(token) => {
                debug!("[Dispatch] cancelling {assistant_id}");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.requests().len()
    }

    /// Streams a reply to `message`, returning the full text on success.
    pub async fn send_message(&self, message: SendMessage) -> Result<String, NormalizedError> {
        message.validate().map_err(|e| normalize(&e))?;
        let assistant_id = message.assistant_id.clone();
        let registration = self.register(&assistant_id).map_err(|e| normalize(&e))?;

        self.emit(DispatchEvent::StateUpdate {
            state: AgentState::Thinking,
        });
        let result = self.run(&message, registration.token.clone()).await;
        drop(registration);

        result.map_err(|e| {
            let normalized = normalize(&e);
            let state = if normalized.is_aborted() {
                info!("[Dispatch] {assistant_id} cancelled");
                AgentState::Idle
            } else {
                error!("[Dispatch] {assistant_id} failed ({}): {e}", normalized.code);
                AgentState::Error
            };
            self.emit(DispatchEvent::Error {
                assistant_id: assistant_id.clone(),
                error: normalized.clone(),
            });
            self.emit(DispatchEvent::StateUpdate { state });
            normalized
        })
    }

    async fn run(&self, message: &SendMessage, cancel: CancellationToken) -> Result<String, LLMError> {
        let (request, options) = {
            let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
            let model = message
                .model
                .clone()
                .unwrap_or_else(|| config.get_model().to_string());
            let mut request =
                ChatRequest::new(model, build_conversation(config.system_prompt(), &message.text))
                    .with_cancellation(cancel);
            if let Some(tools) = &self.tools {
                request = request.with_tools(tools.clone());
            }
            (request, config.connection_options())
        };
        let model = request.model.clone();

        let mut stream = {
            let mut provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
            provider.initialize(&options)?;
            provider.stream_response(request)?
        };

        let assistant_id = &message.assistant_id;
        let mut content = String::new();
        let mut speaking = false;

        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::Text(text) => {
                    content.push_str(&text);
                    self.emit(DispatchEvent::AssistantChunk {
                        assistant_id: assistant_id.clone(),
                        chunk: text,
                    });
                    if !speaking {
                        speaking = true;
                        self.emit(DispatchEvent::StateUpdate {
                            state: AgentState::Speaking,
                        });
                    }
                }
                StreamChunk::ToolCall(tool_call) => {
                    debug!("[Dispatch] {assistant_id} requested tool {tool_call}");
                    self.emit(DispatchEvent::ToolCall {
                        assistant_id: assistant_id.clone(),
                        tool_call,
                    });
                }
            }
        }

        self.emit(DispatchEvent::AssistantMessage {
            assistant_id: assistant_id.clone(),
            content: content.clone(),
            model,
        });
        self.emit(DispatchEvent::StateUpdate {
            state: AgentState::Idle,
        });
        Ok(content)
    }

    fn register(&self, assistant_id: &str) -> Result<Registration<'_>, LLMError> {
        let mut requests = self.requests();
        if requests.contains_key(assistant_id) {
            return Err(LLMError::Validation(format!(
                "a reply for {assistant_id} is already streaming"
            )));
        }
        let token = CancellationToken::new();
        requests.insert(assistant_id.to_string(), token.clone());
        Ok(Registration {
            requests: &self.in_flight,
            assistant_id: assistant_id.to_string(),
            token,
        })
    }

    fn requests(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DispatchEvent) {
        // A closed receiver only means nobody is watching any more.
        let _ = self.events.send(event);
    }
}

/// An assistant id's slot in the in-flight registry. Dropping it, including
/// when the `send_message` future itself is dropped, frees the slot and
/// cancels the request.
struct Registration<'a> {
    requests: &'a Mutex<HashMap<String, CancellationToken>>,
    assistant_id: String,
    token: CancellationToken,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.assistant_id);
    }
}
